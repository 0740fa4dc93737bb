//! COmoving Lagrangian Acceleration (COLA) time stepping.
//!
//! Particles move in the frame defined by their 2LPT trajectory, so only
//! the residual between the PM force and the LPT acceleration is
//! integrated numerically. Velocities and positions carry separate scale
//! factor labels (`a_v`, `a_x`) and are advanced by [`ColaIntegrator::kick`]
//! and [`ColaIntegrator::drift`] in the order a [`StepSchedule`] gives.

pub mod integrator;
pub mod schedule;

pub use integrator::{ColaIntegrator, NLPT, drift_factor, kick_factor};
pub use schedule::{Step, StepSchedule};

use cola_cosmology::CosmologyError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IntegratorError {
    #[error("{label} cannot move backwards: {current} -> {target}")]
    NonMonotonic {
        label: &'static str,
        current: f64,
        target: f64,
    },

    #[error("invalid step schedule: {0}")]
    Schedule(String),

    #[error(transparent)]
    Cosmology(#[from] CosmologyError),
}

pub type Result<T> = std::result::Result<T, IntegratorError>;
