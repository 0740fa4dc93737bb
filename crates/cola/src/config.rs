//! Run parameters, loaded from JSON.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use cola_cosmology::{ConstantSpectrum, PowerSpectrum, TabulatedSpectrum};
use cola_fft::Slab;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Source of the linear power spectrum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerSpectrumConfig {
    /// `{"constant": {"amplitude": 1.0}}`
    Constant { amplitude: f64 },
    /// `{"table": {"path": "pk.txt"}}`, two columns `k P(k)`.
    Table { path: PathBuf },
}

impl Default for PowerSpectrumConfig {
    fn default() -> Self {
        Self::Constant { amplitude: 1.0 }
    }
}

impl PowerSpectrumConfig {
    pub fn load(&self) -> Result<Arc<dyn PowerSpectrum>> {
        Ok(match self {
            Self::Constant { amplitude } => Arc::new(ConstantSpectrum::new(*amplitude)),
            Self::Table { path } => Arc::new(TabulatedSpectrum::from_path(path)?),
        })
    }
}

/// Parameters of one simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    /// Particles per dimension.
    pub nc: usize,
    /// Box side length.
    pub boxsize: f64,
    /// PM mesh points per particle spacing.
    pub pm_nc_factor: usize,
    pub omega_m: f64,
    pub seed: u64,
    pub a_init: f64,
    pub a_final: f64,
    pub n_steps: usize,
    /// Particle buffer size relative to the mean particles per worker,
    /// leaving room for ghosts and migration.
    pub np_alloc_factor: f64,
    pub workers: usize,
    pub power_spectrum: PowerSpectrumConfig,
    /// `tracing` filter directive, used when `RUST_LOG` is unset.
    pub log_level: Option<String>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            nc: 32,
            boxsize: 256.0,
            pm_nc_factor: 2,
            omega_m: 0.3,
            seed: 100,
            a_init: 0.1,
            a_final: 1.0,
            n_steps: 10,
            np_alloc_factor: 1.5,
            workers: 1,
            power_spectrum: PowerSpectrumConfig::default(),
            log_level: None,
        }
    }
}

impl SimulationConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    /// PM mesh points per dimension.
    pub fn nc_pm(&self) -> usize {
        self.pm_nc_factor * self.nc
    }

    /// Particle buffer length per worker.
    pub fn np_alloc(&self) -> usize {
        let per_worker = (self.nc * self.nc * self.nc) as f64 / self.workers.max(1) as f64;
        (self.np_alloc_factor * per_worker).ceil() as usize
    }

    /// Reject parameters the solvers cannot run with.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(Error::Config(msg));

        if self.nc == 0 || self.nc % 2 != 0 {
            return invalid(format!("nc must be even and positive, got {}", self.nc));
        }
        if !(self.boxsize > 0.0 && self.boxsize.is_finite()) {
            return invalid(format!("boxsize must be positive, got {}", self.boxsize));
        }
        if self.pm_nc_factor == 0 {
            return invalid("pm_nc_factor must be at least 1".into());
        }
        if !(self.omega_m > 0.0 && self.omega_m <= 1.0) {
            return invalid(format!("omega_m must lie in (0, 1], got {}", self.omega_m));
        }
        if !(self.a_init > 0.0) || !(self.a_final >= self.a_init) {
            return invalid(format!(
                "need 0 < a_init <= a_final, got a_init = {} and a_final = {}",
                self.a_init, self.a_final
            ));
        }
        if self.n_steps == 0 {
            return invalid("n_steps must be at least 1".into());
        }
        if !(self.np_alloc_factor > 1.0) {
            return invalid(format!(
                "np_alloc_factor must exceed 1, got {}",
                self.np_alloc_factor
            ));
        }
        if self.workers == 0 {
            return invalid("workers must be at least 1".into());
        }
        for nc in [self.nc, self.nc_pm()] {
            if Slab::partition(nc, self.workers, 0).is_err() {
                return invalid(format!(
                    "{} workers leave an empty slab of a {nc}³ grid",
                    self.workers
                ));
            }
        }
        Ok(())
    }
}
