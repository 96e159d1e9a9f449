// app/mod.rs
// Background runner: a command queue drives timesteps on a worker thread
// and the latest snapshot is published for readers

use crate::error::{SimError, SimResult};
use crate::simulation::{Simulation, Snapshot};
use crossbeam::channel::{unbounded, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

pub mod command_loop;
pub mod simulation_loop;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SimCommand {
    Run,
    Pause,
    /// Advance this many steps, then pause.
    Step(u64),
    Stop,
    RequestSnapshot,
}

/// Why the loop returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunStatus {
    /// Simulated time reached `time_stop`.
    Finished,
    /// A stop command or the stop flag was seen between steps.
    Stopped,
    /// Paused with no sender left to resume it.
    Disconnected,
}

/// State shared between the loop and its controllers.
#[derive(Default)]
pub struct SharedState {
    pub snapshot: Mutex<Option<Snapshot>>,
    pub stop: AtomicBool,
}

impl SharedState {
    pub fn publish(&self, sim: &Simulation) {
        *self.snapshot.lock() = Some(sim.snapshot());
    }

    pub fn latest(&self) -> Option<Snapshot> {
        self.snapshot.lock().clone()
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }
}

pub struct RunnerHandle {
    tx: Sender<SimCommand>,
    shared: Arc<SharedState>,
    thread: JoinHandle<(Simulation, SimResult<RunStatus>)>,
}

impl RunnerHandle {
    /// Queue a command. Returns false once the loop has exited.
    pub fn send(&self, cmd: SimCommand) -> bool {
        self.tx.send(cmd).is_ok()
    }

    /// Ask the loop to stop before its next timestep.
    pub fn stop(&self) {
        self.shared.request_stop();
        let _ = self.tx.send(SimCommand::Stop);
    }

    pub fn latest_snapshot(&self) -> Option<Snapshot> {
        self.shared.latest()
    }

    pub fn shared(&self) -> &Arc<SharedState> {
        &self.shared
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the loop to exit and take the simulation back.
    pub fn join(self) -> SimResult<(Simulation, RunStatus)> {
        let RunnerHandle { tx, thread, .. } = self;
        drop(tx);
        let (sim, status) = thread
            .join()
            .map_err(|_| SimError::ConsistencyViolation("simulation thread panicked".to_string()))?;
        Ok((sim, status?))
    }
}

/// Move the simulation to a worker thread. The loop starts paused and
/// waits for `Run` or `Step`.
pub fn spawn(mut simulation: Simulation) -> RunnerHandle {
    let (tx, rx) = unbounded();
    let shared = Arc::new(SharedState::default());
    let loop_shared = Arc::clone(&shared);
    let thread = std::thread::spawn(move || {
        let status = simulation_loop::run_simulation_loop(rx, &mut simulation, &loop_shared);
        if let Err(e) = &status {
            log::error!("simulation stopped at t = {}: {e}", simulation.time);
        }
        (simulation, status)
    });
    RunnerHandle { tx, shared, thread }
}

/// Global rayon pool with threads = max(MIN_THREADS, cores) - THREADS_LEAVE_FREE.
pub fn init_thread_pool() {
    let cores = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
    let threads = cores.max(crate::config::MIN_THREADS) - crate::config::THREADS_LEAVE_FREE;
    if let Err(e) = rayon::ThreadPoolBuilder::new().num_threads(threads).build_global() {
        log::warn!("rayon pool already initialized: {e}");
    }
}

#[cfg(test)]
mod tests;
