use thiserror::Error;

/// Any failure of a cola run. Every variant is fatal to the run.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("simulation stepped before initial conditions were generated")]
    NotInitialized,

    #[error(transparent)]
    Comm(#[from] cola_comm::CommError),

    #[error(transparent)]
    Fft(#[from] cola_fft::FftError),

    #[error(transparent)]
    Cosmology(#[from] cola_cosmology::CosmologyError),

    #[error(transparent)]
    Particle(#[from] cola_particle::ParticleError),

    #[error(transparent)]
    Lpt(#[from] cola_lpt::LptError),

    #[error(transparent)]
    Pm(#[from] cola_pm::PmError),

    #[error(transparent)]
    Integrator(#[from] cola_integrator::IntegratorError),
}

pub type Result<T> = std::result::Result<T, Error>;
