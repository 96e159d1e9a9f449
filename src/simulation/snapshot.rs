// simulation/snapshot.rs
// Serializable view of the simulation state for external consumers

use super::events::{EventCounters, WarningCounters};
use crate::error::SimResult;
use crate::molecule::MolecState;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Clone, Debug, Serialize)]
pub struct MoleculeView {
    pub serno: u64,
    pub species: String,
    pub state: MolecState,
    pub pos: [f64; 3],
    /// Display color as sRGB components in [0, 1].
    pub color: [f32; 3],
    pub size: f64,
}

#[derive(Clone, Debug, Serialize)]
pub struct Snapshot {
    pub time: f64,
    pub iteration: u64,
    pub elapsed_secs: f64,
    pub molecules: Vec<MoleculeView>,
    /// Live molecule count per species name.
    pub counts: BTreeMap<String, usize>,
    pub events: EventCounters,
    pub warnings: WarningCounters,
}

impl Snapshot {
    pub fn to_json(&self) -> SimResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write_json(&self, path: &Path) -> SimResult<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}
