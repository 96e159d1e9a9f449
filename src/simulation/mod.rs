// simulation/mod.rs
// Re-exports and module declarations for simulation submodules

pub mod builder;
pub mod events;
pub mod snapshot;
pub mod simulation;

pub use builder::*;
pub use events::*;
pub use simulation::*;
pub use snapshot::*;

#[cfg(test)]
mod tests;
