// error.rs
// Error type shared by setup, stepping and the runner

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SimError {
    #[error("out of memory: {what} would exceed the hard cap of {cap}")]
    OutOfMemory { what: &'static str, cap: usize },

    #[error("degenerate geometry in panel '{panel}': {reason}")]
    GeometryDegenerate { panel: String, reason: String },

    #[error("consistency violation: {0}")]
    ConsistencyViolation(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("unknown {kind} '{name}'")]
    UnknownName { kind: &'static str, name: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type SimResult<T> = Result<T, SimError>;

impl SimError {
    pub fn config(msg: impl Into<String>) -> Self {
        SimError::Config(msg.into())
    }

    pub fn unknown(kind: &'static str, name: impl Into<String>) -> Self {
        SimError::UnknownName { kind, name: name.into() }
    }

    pub fn degenerate(panel: impl Into<String>, reason: impl Into<String>) -> Self {
        SimError::GeometryDegenerate { panel: panel.into(), reason: reason.into() }
    }
}
