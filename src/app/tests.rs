use super::command_loop::LoopState;
use super::simulation_loop::run_simulation_loop;
use super::*;
use crate::config::SimConfig;
use crate::molecule::MolecState;
use crate::simulation::{Placement, SimBuilder};
use crate::utils::Vec3;
use crate::walls::WallType;
use crossbeam::channel::unbounded;

fn small_sim(time_stop: f64) -> Simulation {
    let config = SimConfig { seed: 3, dt: 0.01, time_stop, ..Default::default() };
    let mut b = SimBuilder::new(config).unwrap();
    b.set_boundaries(Vec3::zero(), Vec3::new(5.0, 5.0, 5.0), [[WallType::Reflect; 2]; 3]).unwrap();
    let a = b.add_species("A").unwrap();
    b.species_mut().unwrap().set_difc(a, MolecState::Soln, 1.0).unwrap();
    b.add_molecules(a, MolecState::Soln, 50, Placement::Uniform).unwrap();
    b.build().unwrap()
}

#[test]
fn loop_state_transitions() {
    let sim = small_sim(1.0);
    let shared = SharedState::default();
    let mut state = LoopState::paused();
    assert!(!state.wants_step());
    command_loop::handle_command(SimCommand::Step(2), &mut state, &sim, &shared);
    assert!(state.wants_step());
    assert_eq!(state.pending_steps, 2);
    command_loop::handle_command(SimCommand::Run, &mut state, &sim, &shared);
    assert!(!state.paused);
    command_loop::handle_command(SimCommand::Pause, &mut state, &sim, &shared);
    assert!(!state.wants_step());
    assert!(shared.latest().is_some());
    command_loop::handle_command(SimCommand::Stop, &mut state, &sim, &shared);
    assert!(state.stop);
}

#[test]
fn stop_is_applied_before_the_next_step() {
    let mut sim = small_sim(1.0);
    let shared = SharedState::default();
    let (tx, rx) = unbounded();
    tx.send(SimCommand::Step(5)).unwrap();
    tx.send(SimCommand::RequestSnapshot).unwrap();
    tx.send(SimCommand::Stop).unwrap();
    let status = run_simulation_loop(rx, &mut sim, &shared).unwrap();
    assert_eq!(status, RunStatus::Stopped);
    assert_eq!(sim.iteration, 0);
    assert_eq!(shared.latest().unwrap().iteration, 0);
}

#[test]
fn stop_flag_ends_a_running_loop() {
    let mut sim = small_sim(1.0);
    let shared = SharedState::default();
    shared.request_stop();
    let (tx, rx) = unbounded();
    tx.send(SimCommand::Run).unwrap();
    assert_eq!(run_simulation_loop(rx, &mut sim, &shared).unwrap(), RunStatus::Stopped);
    assert_eq!(sim.iteration, 0);
}

#[test]
fn running_loop_finishes_at_time_stop() {
    let mut sim = small_sim(0.1);
    let shared = SharedState::default();
    let (tx, rx) = unbounded();
    tx.send(SimCommand::Run).unwrap();
    drop(tx);
    assert_eq!(run_simulation_loop(rx, &mut sim, &shared).unwrap(), RunStatus::Finished);
    assert_eq!(sim.iteration, 10);
    let snap = shared.latest().unwrap();
    assert_eq!(snap.iteration, 10);
    assert_eq!(snap.counts["A"], 50);
}

#[test]
fn spawned_runner_steps_on_request() {
    let handle = spawn(small_sim(1.0));
    assert!(handle.send(SimCommand::Step(4)));
    assert!(handle.send(SimCommand::Stop));
    let (sim, status) = handle.join().unwrap();
    assert_eq!(status, RunStatus::Stopped);
    // commands are drained before stepping, so the stop wins
    assert!(sim.iteration <= 4);
    assert_eq!(sim.count(1, MolecState::Soln), 50);
}

#[test]
fn paused_runner_without_senders_disconnects() {
    let handle = spawn(small_sim(1.0));
    let (sim, status) = handle.join().unwrap();
    assert_eq!(status, RunStatus::Disconnected);
    assert_eq!(sim.iteration, 0);
}

#[test]
fn spawned_runner_publishes_after_steps() {
    let handle = spawn(small_sim(1.0));
    handle.send(SimCommand::Step(3));
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(10);
    let mut seen = None;
    while std::time::Instant::now() < deadline {
        if let Some(s) = handle.latest_snapshot() {
            seen = Some(s);
            break;
        }
        std::thread::sleep(std::time::Duration::from_millis(1));
    }
    assert_eq!(seen.unwrap().iteration, 3);
    handle.stop();
    let (sim, status) = handle.join().unwrap();
    assert_eq!(status, RunStatus::Stopped);
    assert_eq!(sim.iteration, 3);
}
