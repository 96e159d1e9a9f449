// app/command_loop.rs
// Applies queued commands to the loop state between timesteps

use super::{SharedState, SimCommand};
use crate::profile_scope;
use crate::simulation::Simulation;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoopState {
    pub paused: bool,
    /// Steps left from a `Step(n)` request.
    pub pending_steps: u64,
    pub stop: bool,
}

impl LoopState {
    pub fn paused() -> Self {
        Self { paused: true, ..Default::default() }
    }

    /// Whether the next iteration should advance the simulation.
    pub fn wants_step(&self) -> bool {
        !self.stop && (!self.paused || self.pending_steps > 0)
    }
}

pub fn handle_command(cmd: SimCommand, state: &mut LoopState, simulation: &Simulation, shared: &SharedState) {
    profile_scope!("command_handling");
    match cmd {
        SimCommand::Run => {
            state.paused = false;
            state.pending_steps = 0;
        }
        SimCommand::Pause => {
            state.paused = true;
            state.pending_steps = 0;
            shared.publish(simulation);
        }
        SimCommand::Step(n) => {
            state.paused = true;
            state.pending_steps += n;
        }
        SimCommand::Stop => state.stop = true,
        SimCommand::RequestSnapshot => shared.publish(simulation),
    }
    log::debug!("command {:?} at step {}", cmd, simulation.iteration);
}
