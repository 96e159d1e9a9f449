use clap::Parser;
use particle_rd::app::{self, RunStatus, SimCommand};
use particle_rd::{ModelConfig, SimResult};
use std::path::PathBuf;

/// Headless particle reaction-diffusion runner.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// TOML model file
    model: PathBuf,

    /// Run this many steps instead of stopping at the model's time_stop
    #[arg(long)]
    steps: Option<u64>,

    /// Override the model's random seed
    #[arg(long)]
    seed: Option<u64>,

    /// Override the model's stop time
    #[arg(long)]
    until: Option<f64>,

    /// Write the final snapshot as JSON
    #[arg(long)]
    snapshot: Option<PathBuf>,
}

fn run(args: Args) -> SimResult<()> {
    let mut model = ModelConfig::load_from_file(&args.model)?;
    if let Some(seed) = args.seed {
        model.sim.seed = seed;
    }
    if let Some(t) = args.until {
        model.sim.time_stop = t;
    }
    let sim = model.build()?;

    let runner = app::spawn(sim);
    match args.steps {
        Some(n) => runner.send(SimCommand::Step(n)),
        None => runner.send(SimCommand::Run),
    };
    let (sim, status) = runner.join()?;
    if status == RunStatus::Stopped {
        log::warn!("run stopped before completion");
    }

    let snapshot = sim.snapshot();
    println!("t = {} after {} steps ({:.3?})", snapshot.time, snapshot.iteration, sim.elapsed());
    for (species, count) in &snapshot.counts {
        println!("{:<16} {}", species, count);
    }
    for (event, n) in sim.events.iter().filter(|(_, n)| *n > 0) {
        println!("{:<16} {}", event.name(), n);
    }
    if let Some(path) = &args.snapshot {
        snapshot.write_json(path)?;
        log::info!("snapshot written to {}", path.display());
    }
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    app::init_thread_pool();
    if let Err(e) = run(Args::parse()) {
        log::error!("{e}");
        std::process::exit(1);
    }
}
