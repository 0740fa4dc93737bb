//! cola — cosmological N-body simulation with the COLA method.
//!
//! This is the umbrella crate: it re-exports the solver crates, loads a
//! [`SimulationConfig`], and drives a [`Simulation`] from 2LPT initial
//! conditions through the kick-drift-kick steps of the COLA integrator.

pub mod config;
pub mod error;
pub mod simulation;

pub use config::{PowerSpectrumConfig, SimulationConfig};
pub use error::{Error, Result};
pub use simulation::{RunSummary, Simulation};

pub use cola_comm::{self, Communicator, LocalCluster, SerialComm};
pub use cola_cosmology::{
    self, ConstantSpectrum, Cosmology, FlatLcdm, PowerSpectrum, TabulatedSpectrum,
};
pub use cola_fft::{self, FftGrid, Slab, SlabFft};
pub use cola_integrator::{self, ColaIntegrator, StepSchedule};
pub use cola_lpt::{self, DisplacementSummary, LptGenerator};
pub use cola_math::{self, Vec3};
pub use cola_particle::{self, Particle, ParticleSet};
pub use cola_pm::{self, PmSolver};

use tracing_subscriber::{EnvFilter, fmt};

/// Filter used when neither `RUST_LOG` nor the configuration sets one.
pub const DEFAULT_LOG_FILTER: &str = "cola=info";

fn filter_directive(configured: Option<&str>) -> &str {
    configured.unwrap_or(DEFAULT_LOG_FILTER)
}

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` takes precedence over `directive`; without either,
/// [`DEFAULT_LOG_FILTER`].
pub fn init_logging(directive: Option<&str>) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(directive)));

    fmt().with_env_filter(filter).with_target(false).init();
}
