//! Kick and drift operators.

use std::sync::Arc;

use cola_cosmology::{Cosmology, CosmologyError};
use cola_math::{QuadratureOptions, integrate};
use cola_particle::ParticleSet;
use rayon::prelude::*;

use crate::{IntegratorError, Result};

/// Power-law exponent of the COLA time variable.
pub const NLPT: f64 = -2.5;

/// Relative accuracy of the drift integral.
const DRIFT_TOLERANCE: f64 = 1e-5;

/// Velocity factor for a kick of `a_v` from `ai` to `af` with forces
/// evaluated at `a`.
///
/// (af^n − ai^n) / (n · a^n · a H(a)), which is zero when `ai == af`.
pub fn kick_factor(cosmology: &dyn Cosmology, ai: f64, a: f64, af: f64) -> f64 {
    (af.powf(NLPT) - ai.powf(NLPT)) / (NLPT * a.powf(NLPT) * a * cosmology.hubble_rate(a))
}

/// Position factor for a drift of `a_x` from `ai` to `af` with
/// velocities labelled at `a_v`:
///
///   ∫_ai^af a^n / (a³ H(a)) da / a_v^n
pub fn drift_factor(cosmology: &dyn Cosmology, ai: f64, af: f64, a_v: f64) -> Result<f64> {
    let integral = integrate(
        |a| a.powf(NLPT) / (cosmology.hubble_rate(a) * a * a * a),
        ai,
        af,
        QuadratureOptions::relative(DRIFT_TOLERANCE),
    )
    .map_err(CosmologyError::from)?;
    Ok(integral / a_v.powf(NLPT))
}

fn check_monotonic(label: &'static str, current: f64, target: f64) -> Result<()> {
    if target < current {
        return Err(IntegratorError::NonMonotonic {
            label,
            current,
            target,
        });
    }
    Ok(())
}

/// Advances a [`ParticleSet`] along the COLA scheme.
#[derive(Clone)]
pub struct ColaIntegrator {
    cosmology: Arc<dyn Cosmology>,
}

impl ColaIntegrator {
    pub fn new(cosmology: Arc<dyn Cosmology>) -> Self {
        Self { cosmology }
    }

    pub fn cosmology(&self) -> &dyn Cosmology {
        self.cosmology.as_ref()
    }

    /// Advance velocities from `a_v` to `a_target` using the PM forces in
    /// `particles.force`, which must be valid at `a_x`.
    ///
    /// The acceleration is −1.5 Ωm (F + D1·dx1 + (D2 − D1²)·dx2), the
    /// difference between the PM force and the LPT force.
    pub fn kick(&self, particles: &mut ParticleSet, a_target: f64) -> Result<()> {
        let ai = particles.a_v;
        let a = particles.a_x;
        let af = a_target;
        check_monotonic("a_v", ai, af)?;
        if ai == af {
            return Ok(());
        }
        assert_eq!(
            particles.force.len(),
            particles.particles.len(),
            "forces are not computed for every particle"
        );

        let cosmology = self.cosmology();
        let factor = kick_factor(cosmology, ai, a, af);
        let (q1, d2) = cosmology.growth_factors(a)?;
        let q2 = cosmology.second_order_growth_rate(q1, d2);
        let scale = -1.5 * particles.omega_m * factor;
        tracing::trace!(ai, a, af, factor, growth = q1, "kick");

        particles
            .particles
            .par_iter_mut()
            .zip(particles.force.par_iter())
            .for_each(|(p, f)| {
                p.v += (f + p.dx1 * q1 + p.dx2 * q2) * scale;
            });

        particles.a_v = af;
        Ok(())
    }

    /// Advance positions from `a_x` to `a_target`: the velocity term plus
    /// the change in the LPT displacement between the two scale factors.
    pub fn drift(&self, particles: &mut ParticleSet, a_target: f64) -> Result<()> {
        let ai = particles.a_x;
        let af = a_target;
        check_monotonic("a_x", ai, af)?;
        if ai == af {
            return Ok(());
        }

        let cosmology = self.cosmology();
        let dt = drift_factor(cosmology, ai, af, particles.a_v)?;
        let (d1_i, d2_i) = cosmology.growth_factors(ai)?;
        let (d1_f, d2_f) = cosmology.growth_factors(af)?;
        let da1 = d1_f - d1_i;
        let da2 = d2_f - d2_i;
        tracing::trace!(ai, af, dt, da1, da2, "drift");

        particles.particles.par_iter_mut().for_each(|p| {
            p.x += p.v * dt + p.dx1 * da1 + p.dx2 * da2;
        });

        particles.a_x = af;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use cola_cosmology::FlatLcdm;
    use cola_math::Vec3;
    use cola_particle::Particle;

    fn integrator(omega_m: f64) -> ColaIntegrator {
        ColaIntegrator::new(Arc::new(FlatLcdm::new(omega_m).unwrap()))
    }

    fn moving_set(a: f64, omega_m: f64) -> ParticleSet {
        let mut set = ParticleSet::with_capacity(8, omega_m);
        let ps = (0..4)
            .map(|i| {
                let mut p = Particle::new(i + 1, Vec3::new(1.0 + i as f64, 2.0, 3.0));
                p.v = Vec3::new(0.1, -0.2, 0.3 * i as f64);
                p.dx1 = Vec3::new(0.5, 0.25, -1.0);
                p.dx2 = Vec3::new(-0.1, 0.0, 0.2);
                p
            })
            .collect();
        set.replace(ps).unwrap();
        set.force.iter_mut().for_each(|f| *f = Vec3::new(-0.3, 0.4, 0.1));
        set.a_x = a;
        set.a_v = a;
        set
    }

    #[test]
    fn test_equal_endpoints_are_no_ops() {
        let cola = integrator(0.3);
        let mut set = moving_set(0.5, 0.3);
        let before = set.particles.clone();

        cola.kick(&mut set, 0.5).unwrap();
        cola.drift(&mut set, 0.5).unwrap();
        assert_eq!(set.particles, before);
        assert_eq!((set.a_x, set.a_v), (0.5, 0.5));

        assert_eq!(kick_factor(cola.cosmology(), 0.5, 0.5, 0.5), 0.0);
        assert_eq!(drift_factor(cola.cosmology(), 0.5, 0.5, 0.5).unwrap(), 0.0);
    }

    #[test]
    fn test_backwards_step_rejected() {
        let cola = integrator(0.3);
        let mut set = moving_set(0.5, 0.3);

        let err = cola.kick(&mut set, 0.4).unwrap_err();
        assert!(matches!(err, IntegratorError::NonMonotonic { label: "a_v", .. }));
        let err = cola.drift(&mut set, 0.4).unwrap_err();
        assert!(matches!(err, IntegratorError::NonMonotonic { label: "a_x", .. }));
        assert_eq!((set.a_x, set.a_v), (0.5, 0.5));
    }

    #[test]
    fn test_short_kick_is_da_over_a_squared_h() {
        let lcdm = FlatLcdm::new(0.3).unwrap();
        let (a, da) = (0.5, 1e-4);
        let factor = kick_factor(&lcdm, a - 0.5 * da, a, a + 0.5 * da);
        assert_relative_eq!(factor, da / (a * a * lcdm.hubble_rate(a)), max_relative = 1e-6);
    }

    #[test]
    fn test_drift_factor_matter_only() {
        // With Ωm = 1 the integrand is a^-4
        let eds = FlatLcdm::new(1.0).unwrap();
        let (ai, af, av): (f64, f64, f64) = (0.5, 1.0, 0.75);
        let exact = (ai.powi(-3) - af.powi(-3)) / 3.0 / av.powf(NLPT);
        assert_relative_eq!(drift_factor(&eds, ai, af, av).unwrap(), exact, max_relative = 1e-8);
    }

    #[test]
    fn test_kick_applies_residual_acceleration() {
        let cola = integrator(0.3);
        let mut set = moving_set(0.5, 0.3);
        let before = set.particles.clone();
        cola.kick(&mut set, 0.6).unwrap();

        let lcdm = FlatLcdm::new(0.3).unwrap();
        let d1 = lcdm.linear_growth(0.5).unwrap();
        let d2 = lcdm.second_order_growth(0.5, d1);
        let factor = kick_factor(&lcdm, 0.5, 0.5, 0.6);
        for ((p, q), f) in set.particles.iter().zip(&before).zip(&set.force) {
            let accel = -1.5 * 0.3 * (f + q.dx1 * d1 + q.dx2 * (d2 - d1 * d1));
            let expected = q.v + accel * factor;
            assert_abs_diff_eq!(p.v, expected, epsilon = 1e-12);
            assert_eq!(p.x, q.x);
        }
        assert_eq!((set.a_x, set.a_v), (0.5, 0.6));
    }

    #[test]
    fn test_drift_follows_velocity_and_growth() {
        let cola = integrator(0.3);
        let mut set = moving_set(0.5, 0.3);
        let before = set.particles.clone();
        cola.drift(&mut set, 0.6).unwrap();

        let lcdm = FlatLcdm::new(0.3).unwrap();
        let (d1_i, d2_i) = lcdm.growth_factors(0.5).unwrap();
        let (d1_f, d2_f) = lcdm.growth_factors(0.6).unwrap();
        let dt = drift_factor(&lcdm, 0.5, 0.6, 0.5).unwrap();
        assert!(dt > 0.0);
        for (p, q) in set.particles.iter().zip(&before) {
            let expected = q.x + q.v * dt + q.dx1 * (d1_f - d1_i) + q.dx2 * (d2_f - d2_i);
            assert_abs_diff_eq!(p.x, expected, epsilon = 1e-12);
            assert_eq!(p.v, q.v);
        }
        assert_eq!((set.a_x, set.a_v), (0.6, 0.5));
    }

    #[test]
    fn test_pure_lpt_particle_keeps_zero_velocity() {
        // A PM force equal to minus the LPT term leaves nothing to integrate
        let cola = integrator(0.3);
        let mut set = moving_set(0.5, 0.3);
        let lcdm = FlatLcdm::new(0.3).unwrap();
        let (d1, d2) = lcdm.growth_factors(0.5).unwrap();
        let q2 = d2 - d1 * d1;
        for (p, f) in set.particles.iter_mut().zip(set.force.iter_mut()) {
            p.v = Vec3::zeros();
            *f = -(p.dx1 * d1 + p.dx2 * q2);
        }
        cola.kick(&mut set, 0.55).unwrap();
        for p in &set.particles {
            assert_abs_diff_eq!(p.v, Vec3::zeros(), epsilon = 1e-14);
        }
    }
}
