//! Simulation particles and their set.

use cola_math::Vec3;
use rayon::prelude::*;

use crate::{ParticleError, Result};

/// A dark-matter particle in comoving coordinates.
#[derive(Clone, Debug, PartialEq)]
pub struct Particle {
    /// Globally unique id, starting at 1.
    pub id: u64,
    /// Position in [0, boxsize).
    pub x: Vec3,
    /// Comoving velocity.
    pub v: Vec3,
    /// First-order (Zel'dovich) displacement at unit growth.
    pub dx1: Vec3,
    /// Second-order displacement at unit growth.
    pub dx2: Vec3,
}

impl Particle {
    /// A particle at rest with no displacement.
    pub fn new(id: u64, x: Vec3) -> Self {
        Self {
            id,
            x,
            v: Vec3::zeros(),
            dx1: Vec3::zeros(),
            dx2: Vec3::zeros(),
        }
    }
}

/// Position sent to a neighbouring worker for its boundary stencils.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GhostParticle {
    pub id: u64,
    pub x: Vec3,
}

/// Force computed for a ghost, returned to the worker that owns it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GhostForce {
    pub id: u64,
    pub force: Vec3,
}

/// The particles owned by one worker.
///
/// Capacity is fixed at construction and covers the local particles plus
/// the ghosts received from neighbours during a force computation.
#[derive(Clone, Debug)]
pub struct ParticleSet {
    /// Locally owned particles.
    pub particles: Vec<Particle>,
    /// PM force per local particle, from the last force computation.
    pub force: Vec<Vec3>,
    /// Scale factor at which positions are valid.
    pub a_x: f64,
    /// Scale factor at which velocities are valid.
    pub a_v: f64,
    /// Matter density parameter.
    pub omega_m: f64,
    np_allocated: usize,
}

impl ParticleSet {
    /// An empty set able to hold `np_allocated` particles and ghosts.
    pub fn with_capacity(np_allocated: usize, omega_m: f64) -> Self {
        Self {
            particles: Vec::with_capacity(np_allocated),
            force: Vec::with_capacity(np_allocated),
            a_x: 0.0,
            a_v: 0.0,
            omega_m,
            np_allocated,
        }
    }

    /// Particles owned by this worker.
    pub fn np_local(&self) -> usize {
        self.particles.len()
    }

    pub fn np_allocated(&self) -> usize {
        self.np_allocated
    }

    /// Fail unless `required` particles fit in the allocation.
    pub fn ensure_capacity(&self, required: usize) -> Result<()> {
        if required > self.np_allocated {
            return Err(ParticleError::Capacity {
                required,
                available: self.np_allocated,
            });
        }
        Ok(())
    }

    /// Replace the local particles, keeping the allocation.
    pub fn replace(&mut self, particles: Vec<Particle>) -> Result<()> {
        self.ensure_capacity(particles.len())?;
        self.particles = particles;
        self.force.clear();
        self.force.resize(self.particles.len(), Vec3::zeros());
        Ok(())
    }

    /// Σ |v|² over the local particles.
    pub fn sum_squared_velocity(&self) -> f64 {
        self.particles.par_iter().map(|p| p.v.norm_squared()).sum()
    }

    /// Σ |D1·dx1 + D2·dx2|² over the local particles.
    pub fn sum_squared_displacement(&self, d1: f64, d2: f64) -> f64 {
        self.particles
            .par_iter()
            .map(|p| (p.dx1 * d1 + p.dx2 * d2).norm_squared())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_particle_at_rest() {
        let p = Particle::new(7, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(p.id, 7);
        assert_eq!(p.v, Vec3::zeros());
        assert_eq!(p.dx1, Vec3::zeros());
    }

    #[test]
    fn test_capacity() {
        let mut set = ParticleSet::with_capacity(2, 0.3);
        assert!(set.ensure_capacity(2).is_ok());

        let three = (1..=3).map(|id| Particle::new(id, Vec3::zeros())).collect();
        match set.replace(three) {
            Err(ParticleError::Capacity {
                required,
                available,
            }) => {
                assert_eq!(required, 3);
                assert_eq!(available, 2);
            }
            other => panic!("expected capacity error, got {other:?}"),
        }
        assert_eq!(set.np_local(), 0);
    }

    #[test]
    fn test_replace_sizes_force() {
        let mut set = ParticleSet::with_capacity(4, 0.3);
        let two = (1..=2).map(|id| Particle::new(id, Vec3::zeros())).collect();
        set.replace(two).unwrap();
        assert_eq!(set.np_local(), 2);
        assert_eq!(set.force.len(), 2);
    }

    #[test]
    fn test_sums() {
        let mut set = ParticleSet::with_capacity(2, 1.0);
        let mut a = Particle::new(1, Vec3::zeros());
        a.v = Vec3::new(3.0, 4.0, 0.0);
        a.dx1 = Vec3::new(1.0, 0.0, 0.0);
        a.dx2 = Vec3::new(0.0, 1.0, 0.0);
        set.replace(vec![a]).unwrap();

        assert_relative_eq!(set.sum_squared_velocity(), 25.0);
        // |2·x̂ + 3·ŷ|² = 13
        assert_relative_eq!(set.sum_squared_displacement(2.0, 3.0), 13.0);
    }
}
