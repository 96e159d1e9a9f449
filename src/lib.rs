pub mod app;
pub mod boxes;
pub mod compartment;
pub mod config;
pub mod diffusion;
pub mod error;
pub mod molecule;
pub mod profiler;
pub mod reaction;
pub mod simulation;
pub mod species;
pub mod surface;
pub mod utils;
pub mod walls;

pub use config::{ModelConfig, SimConfig};
pub use error::{SimError, SimResult};
pub use simulation::{Placement, SimBuilder, Simulation, Snapshot};

#[cfg(feature = "profiling")]
use once_cell::sync::Lazy;
#[cfg(feature = "profiling")]
use parking_lot::Mutex;

#[cfg(feature = "profiling")]
pub static PROFILER: Lazy<Mutex<profiler::Profiler>> =
    Lazy::new(|| Mutex::new(profiler::Profiler::new()));
