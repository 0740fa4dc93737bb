//! 2LPT initial conditions.
//!
//! [`LptGenerator`] draws a Gaussian random field on an `nc³` grid, derives
//! the first-order (Zel'dovich) and second-order Lagrangian displacement
//! fields from it, and places one particle per grid cell on the displaced
//! lattice.
//!
//! The random modes are keyed by the transverse indices `(ix, iy)` through
//! a [`SeedTable`], so the realization does not depend on how the grid is
//! split among workers.

pub mod generator;
pub mod seed;

pub use generator::{DisplacementSummary, LptGenerator};
pub use seed::SeedTable;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LptError {
    #[error(transparent)]
    Fft(#[from] cola_fft::FftError),

    #[error(transparent)]
    Comm(#[from] cola_comm::CommError),

    #[error(transparent)]
    Particle(#[from] cola_particle::ParticleError),

    #[error(transparent)]
    Cosmology(#[from] cola_cosmology::CosmologyError),
}

pub type Result<T> = std::result::Result<T, LptError>;
