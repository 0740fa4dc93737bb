//! Particle-mesh gravity on a slab-decomposed periodic mesh.
//!
//! Particles are assigned to the mesh with cloud-in-cell weights, the
//! Poisson equation is solved with the distributed FFT, and the force is
//! interpolated back with the same weights. Particles whose stencil
//! reaches a neighbouring slab are exchanged as ghosts.

pub mod cic;
pub mod ghost;
pub mod solver;

pub use cic::{AtomicGrid, CicStencil};
pub use solver::PmSolver;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PmError {
    #[error("total CIC density error is large: {sum:e} > {tolerance:e}")]
    DensityIntegrity { sum: f64, tolerance: f64 },

    #[error(transparent)]
    Particle(#[from] cola_particle::ParticleError),

    #[error(transparent)]
    Fft(#[from] cola_fft::FftError),

    #[error(transparent)]
    Comm(#[from] cola_comm::CommError),
}

pub type Result<T> = std::result::Result<T, PmError>;
