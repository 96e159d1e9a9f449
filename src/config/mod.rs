// config/mod.rs
// Centralized configuration constants and runtime engine parameters

use serde::{Deserialize, Serialize};

mod model;
pub use model::*;

// ====================
// Molecule storage
// ====================
/// Hard cap on molecule slots; growth beyond this fails with OutOfMemory.
pub const DEFAULT_MAX_MOLECULES: usize = 10_000_000;
/// Initial number of molecule slots reserved before any growth.
pub const DEFAULT_INITIAL_MOLECULES: usize = 64;
/// Name of the live list created when none are declared.
pub const DEFAULT_LIST_NAME: &str = "system";

// ====================
// Spatial boxes
// ====================
/// Target molecules per box when no explicit box size is given.
pub const DEFAULT_MOLS_PER_BOX: f64 = 4.0;
/// Upper bound on the total number of boxes.
pub const MAX_BOXES: usize = 1_000_000;
/// Accuracy at or above which neighbor boxes are scanned for bimolecular pairs.
pub const ACCURACY_NEIGHBORS: f64 = 3.0;
/// Accuracy at or above which neighbor scans wrap across periodic walls.
pub const ACCURACY_WRAP: f64 = 6.0;
pub const DEFAULT_ACCURACY: f64 = 10.0;

// ====================
// Diffusion
// ====================
pub const GAUSS_TABLE_SIZE: usize = 4096;
/// Steps between regenerations of the Gaussian table.
pub const GAUSS_REFRESH_INTERVAL: u64 = 1000;

// ====================
// Surfaces
// ====================
/// Maximum collisions resolved for one molecule in one timestep.
pub const MAX_SURFACE_ITERATIONS: usize = 50;
/// Distance a molecule is kept off a surface after an interaction.
pub const SURFACE_EPSILON: f64 = 1e-9;

// ====================
// Compartments
// ====================
/// Sample points per box when estimating compartment volume fractions.
pub const COMPARTMENT_SAMPLES_PER_BOX: usize = 64;
/// Rejection attempts when drawing a random point inside a compartment.
pub const RANDOM_ATTEMPTS: usize = 1000;

// ====================
// Binding radius solver
// ====================
/// Radial grid spacing (in rms step units) of the steady-state RDF solver.
pub const RDF_GRID_SPACING: f64 = 0.2;
/// Extent of the tracked RDF region beyond the binding radius (rms step units).
pub const RDF_GRID_EXTENT: f64 = 8.0;
pub const RDF_MAX_ITERATIONS: usize = 4000;
pub const RDF_TOLERANCE: f64 = 1e-10;

// ====================
// Runner
// ====================
pub const MIN_THREADS: usize = 3;
pub const THREADS_LEAVE_FREE: usize = 2;
/// Steps between published snapshots while running.
pub const SNAPSHOT_INTERVAL: u64 = 100;
/// Steps between profiler reports when the `profiling` feature is on.
pub const PROFILE_REPORT_INTERVAL: u64 = 1000;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Spatial dimensionality (1, 2 or 3).
    pub dim: usize,
    pub dt: f64,
    pub time_start: f64,
    pub time_stop: f64,
    pub seed: u64,
    pub accuracy: f64,
    /// Explicit box width; overrides `mols_per_box` when present.
    pub boxsize: Option<f64>,
    pub mols_per_box: f64,
    pub max_molecules: usize,
    pub gauss_table_size: usize,
    pub gauss_refresh_interval: u64,
    pub max_surface_iterations: usize,
    pub surface_epsilon: f64,
    pub compartment_samples: usize,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            dim: 3,
            dt: 1e-3,
            time_start: 0.0,
            time_stop: 1.0,
            seed: 0,
            accuracy: DEFAULT_ACCURACY,
            boxsize: None,
            mols_per_box: DEFAULT_MOLS_PER_BOX,
            max_molecules: DEFAULT_MAX_MOLECULES,
            gauss_table_size: GAUSS_TABLE_SIZE,
            gauss_refresh_interval: GAUSS_REFRESH_INTERVAL,
            max_surface_iterations: MAX_SURFACE_ITERATIONS,
            surface_epsilon: SURFACE_EPSILON,
            compartment_samples: COMPARTMENT_SAMPLES_PER_BOX,
        }
    }
}

impl SimConfig {
    pub fn validate(&self) -> crate::error::SimResult<()> {
        use crate::error::SimError;
        if !(1..=3).contains(&self.dim) {
            return Err(SimError::config(format!("dim must be 1, 2 or 3, got {}", self.dim)));
        }
        if !(self.dt > 0.0) || !self.dt.is_finite() {
            return Err(SimError::config(format!("dt must be positive, got {}", self.dt)));
        }
        if self.time_stop < self.time_start {
            return Err(SimError::config("time_stop precedes time_start"));
        }
        if let Some(b) = self.boxsize {
            if !(b > 0.0) {
                return Err(SimError::config(format!("boxsize must be positive, got {b}")));
            }
        }
        if !(self.mols_per_box > 0.0) {
            return Err(SimError::config("mols_per_box must be positive"));
        }
        if self.gauss_table_size < 2 {
            return Err(SimError::config("gauss_table_size must be at least 2"));
        }
        if self.max_surface_iterations == 0 {
            return Err(SimError::config("max_surface_iterations must be at least 1"));
        }
        Ok(())
    }
}
