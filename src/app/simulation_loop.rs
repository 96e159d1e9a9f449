// app/simulation_loop.rs
// Runs timesteps while handling commands between them

use super::command_loop::{handle_command, LoopState};
use super::{RunStatus, SharedState, SimCommand};
use crate::config::SNAPSHOT_INTERVAL;
use crate::error::SimResult;
use crate::profile_scope;
use crate::simulation::Simulation;
use crossbeam::channel::{Receiver, TryRecvError};

pub fn run_simulation_loop(
    rx: Receiver<SimCommand>,
    simulation: &mut Simulation,
    shared: &SharedState,
) -> SimResult<RunStatus> {
    let mut state = LoopState::paused();
    let mut connected = true;
    loop {
        if !state.wants_step() && !state.stop && connected {
            // idle: block until something arrives
            match rx.recv() {
                Ok(cmd) => handle_command(cmd, &mut state, simulation, shared),
                Err(_) => connected = false,
            }
        }
        while connected {
            match rx.try_recv() {
                Ok(cmd) => handle_command(cmd, &mut state, simulation, shared),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => connected = false,
            }
        }

        if state.stop || shared.stop_requested() {
            log::info!("stopped at t = {} after {} steps", simulation.time, simulation.iteration);
            shared.publish(simulation);
            return Ok(RunStatus::Stopped);
        }
        if simulation.is_finished() {
            log::info!(
                "finished at t = {} after {} steps ({:.3?})",
                simulation.time,
                simulation.iteration,
                simulation.elapsed()
            );
            shared.publish(simulation);
            return Ok(RunStatus::Finished);
        }
        if !state.wants_step() {
            if !connected {
                shared.publish(simulation);
                return Ok(RunStatus::Disconnected);
            }
            continue;
        }

        {
            profile_scope!("simulation_loop");
            if let Err(e) = simulation.step() {
                shared.publish(simulation);
                return Err(e);
            }
        }
        if state.pending_steps > 0 {
            state.pending_steps -= 1;
            if state.pending_steps == 0 {
                shared.publish(simulation);
            }
        }
        if simulation.iteration % SNAPSHOT_INTERVAL == 0 {
            shared.publish(simulation);
        }

        #[cfg(feature = "profiling")]
        {
            if simulation.iteration % crate::config::PROFILE_REPORT_INTERVAL == 0 {
                crate::PROFILER.lock().log_and_clear();
            }
        }
    }
}
