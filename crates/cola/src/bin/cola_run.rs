//! Runs a COLA simulation described by a JSON configuration file.
//!
//! Usage: `cola-run --config <file> [--workers N] [--steps N] [--seed S]`

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use cola::{Communicator, LocalCluster, SerialComm, Simulation, SimulationConfig};

#[derive(Parser, Debug)]
#[command(name = "cola-run")]
#[command(about = "Run a 2LPT + COLA particle-mesh simulation")]
struct Args {
    /// Path to the JSON configuration
    #[arg(long)]
    config: PathBuf,

    /// Override the number of in-process workers
    #[arg(long)]
    workers: Option<usize>,

    /// Override the number of time steps
    #[arg(long)]
    steps: Option<usize>,

    /// Override the random seed
    #[arg(long)]
    seed: Option<u64>,
}

fn main() {
    let args = Args::parse();

    let loaded = SimulationConfig::from_path(&args.config);
    cola::init_logging(loaded.as_ref().ok().and_then(|c| c.log_level.as_deref()));

    let mut config = match loaded {
        Ok(c) => c,
        Err(e) => {
            error!("failed to load '{}': {}", args.config.display(), e);
            process::exit(1);
        }
    };
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    if let Some(steps) = args.steps {
        config.n_steps = steps;
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if let Err(e) = config.validate() {
        error!("{}", e);
        process::exit(1);
    }

    info!(config = %args.config.display(), workers = config.workers, "starting run");
    if config.workers == 1 {
        run_worker(SerialComm::new(), &config);
    } else {
        let comms = LocalCluster::new(config.workers);
        std::thread::scope(|s| {
            for comm in comms {
                let config = &config;
                s.spawn(move || run_worker(comm, config));
            }
        });
    }
}

fn run_worker<C: Communicator>(comm: C, config: &SimulationConfig) {
    let comm = Arc::new(comm);
    let result =
        Simulation::new(config.clone(), Arc::clone(&comm)).and_then(|mut sim| sim.run());

    match result {
        Ok(summary) => {
            if comm.rank() == 0 {
                info!(
                    np_total = summary.np_total,
                    rms_displacement = summary.rms_displacement,
                    rms_velocity = summary.rms_velocity,
                    a = summary.a_x,
                    "done"
                );
            }
        }
        Err(e) => comm.abort(&e.to_string()),
    }
}
