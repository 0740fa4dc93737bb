//! Flat ΛCDM background.

use cola_math::{QuadratureOptions, integrate};

use crate::{Cosmology, CosmologyError, Result};

/// Flat universe of matter and a cosmological constant, Ωm + ΩΛ = 1.
#[derive(Debug, Clone, Copy)]
pub struct FlatLcdm {
    omega_m: f64,
    /// Unnormalized growth at a = 1.
    growth_today: f64,
}

impl FlatLcdm {
    /// Background with matter density `omega_m` in (0, 1].
    pub fn new(omega_m: f64) -> Result<Self> {
        if !(omega_m > 0.0 && omega_m <= 1.0) {
            return Err(CosmologyError::InvalidParameter {
                name: "omega_m",
                value: omega_m,
            });
        }
        let mut model = Self {
            omega_m,
            growth_today: 1.0,
        };
        model.growth_today = model.unnormalized_growth(1.0)?;
        tracing::debug!(omega_m, growth_today = model.growth_today, "flat LCDM background");
        Ok(model)
    }

    /// Matter fraction of the total density at `a`.
    pub fn omega_m_at(&self, a: f64) -> f64 {
        self.omega_m / (self.omega_m + (1.0 - self.omega_m) * a * a * a)
    }

    /// D(a) = 5/2 Ωm H(a) ∫₀ᵃ da' / (a' H(a'))³, which equals `a` in the
    /// matter-only limit.
    fn unnormalized_growth(&self, a: f64) -> Result<f64> {
        if a <= 0.0 {
            return Ok(0.0);
        }
        let om = self.omega_m;
        let integral = integrate(
            |x: f64| {
                let ah = (om / x + (1.0 - om) * x * x).sqrt();
                1.0 / (ah * ah * ah)
            },
            0.0,
            a,
            QuadratureOptions::relative(1e-8),
        )?;
        Ok(2.5 * om * self.hubble_rate(a) * integral)
    }
}

impl Cosmology for FlatLcdm {
    fn omega_m(&self) -> f64 {
        self.omega_m
    }

    fn hubble_rate(&self, a: f64) -> f64 {
        (self.omega_m / (a * a * a) + 1.0 - self.omega_m).sqrt()
    }

    fn linear_growth(&self, a: f64) -> Result<f64> {
        Ok(self.unnormalized_growth(a)? / self.growth_today)
    }

    /// Bouchet et al. fit, D2 = −3/7 D1² Ωm(a)^(−1/143).
    fn second_order_growth(&self, a: f64, d1: f64) -> f64 {
        -3.0 / 7.0 * d1 * d1 * self.omega_m_at(a).powf(-1.0 / 143.0)
    }
}
