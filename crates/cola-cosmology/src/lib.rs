//! Background cosmology and power spectra consumed by the cola solvers.
//!
//! The solvers only see the [`Cosmology`] and [`PowerSpectrum`] traits.
//! [`FlatLcdm`] is the flat matter + Λ background; spectra come from a
//! constant amplitude, a tabulated file, or any closure.

pub mod lcdm;
pub mod spectrum;

pub use lcdm::FlatLcdm;
pub use spectrum::{ConstantSpectrum, PowerSpectrum, TabulatedSpectrum};

use cola_math::QuadratureError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CosmologyError {
    #[error("growth integral failed: {0}")]
    NotConverged(#[from] QuadratureError),

    #[error("invalid cosmological parameter {name} = {value}")]
    InvalidParameter { name: &'static str, value: f64 },

    #[error("power spectrum table line {line}: {message}")]
    Table { line: usize, message: String },

    #[error("power spectrum table has no entries")]
    EmptyTable,

    #[error("failed to read power spectrum table: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CosmologyError>;

/// Background expansion and perturbation growth as functions of the scale
/// factor `a`.
pub trait Cosmology: Send + Sync {
    /// Present-day matter density parameter Ωm.
    fn omega_m(&self) -> f64;

    /// Hubble rate in units of its present value, H(a)/H0.
    fn hubble_rate(&self, a: f64) -> f64;

    /// Linear growth factor D1, normalized to D1(1) = 1.
    fn linear_growth(&self, a: f64) -> Result<f64>;

    /// Second-order growth factor D2 given `d1 = D1(a)`.
    fn second_order_growth(&self, a: f64, d1: f64) -> f64;

    /// Coefficient of the second-order LPT acceleration, D2 − D1².
    fn second_order_growth_rate(&self, d1: f64, d2: f64) -> f64 {
        d2 - d1 * d1
    }

    /// `(D1(a), D2(a))` in one call.
    fn growth_factors(&self, a: f64) -> Result<(f64, f64)> {
        let d1 = self.linear_growth(a)?;
        Ok((d1, self.second_order_growth(a, d1)))
    }
}
