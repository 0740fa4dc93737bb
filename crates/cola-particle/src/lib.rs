//! Particle state shared by the field generator, PM solver and integrator.

pub mod particle;

pub use particle::{GhostForce, GhostParticle, Particle, ParticleSet};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParticleError {
    #[error("particle buffer too small: {required} particles required, {available} allocated")]
    Capacity { required: usize, available: usize },
}

pub type Result<T> = std::result::Result<T, ParticleError>;
