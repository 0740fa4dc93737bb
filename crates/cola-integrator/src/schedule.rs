//! Leapfrog step sequences in the scale factor.

use crate::{IntegratorError, Result};

/// One leapfrog step: forces at the current `a_x`, then a kick and a drift.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Step {
    pub kick_to: f64,
    pub drift_to: f64,
}

/// Kick-drift-kick schedule from `a_init` to `a_final`.
///
/// Velocities are offset by half a step from positions; a closing kick to
/// [`StepSchedule::a_final`] brings them back in sync.
#[derive(Debug, Clone)]
pub struct StepSchedule {
    a_init: f64,
    a_final: f64,
    steps: Vec<Step>,
}

impl StepSchedule {
    /// `n_steps` equal steps in `a`.
    pub fn uniform(a_init: f64, a_final: f64, n_steps: usize) -> Result<Self> {
        if !(a_init > 0.0) || !(a_final >= a_init) {
            return Err(IntegratorError::Schedule(format!(
                "scale factors must satisfy 0 < a_init <= a_final, got {a_init} and {a_final}"
            )));
        }
        if n_steps == 0 {
            return Err(IntegratorError::Schedule("at least one step is required".into()));
        }

        let da = (a_final - a_init) / n_steps as f64;
        let steps = (0..n_steps)
            .map(|j| Step {
                kick_to: a_init + (j as f64 + 0.5) * da,
                drift_to: if j + 1 == n_steps {
                    a_final
                } else {
                    a_init + (j + 1) as f64 * da
                },
            })
            .collect();

        Ok(Self {
            a_init,
            a_final,
            steps,
        })
    }

    pub fn a_init(&self) -> f64 {
        self.a_init
    }

    /// Target of the closing kick.
    pub fn a_final(&self) -> f64 {
        self.a_final
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_uniform_schedule() {
        let schedule = StepSchedule::uniform(0.1, 1.0, 3).unwrap();
        assert_eq!(schedule.len(), 3);
        let kicks: Vec<f64> = schedule.steps().iter().map(|s| s.kick_to).collect();
        let drifts: Vec<f64> = schedule.steps().iter().map(|s| s.drift_to).collect();

        for (k, e) in kicks.iter().zip([0.25, 0.55, 0.85]) {
            assert_relative_eq!(*k, e, epsilon = 1e-12);
        }
        for (d, e) in drifts.iter().zip([0.4, 0.7]) {
            assert_relative_eq!(*d, e, epsilon = 1e-12);
        }
        assert_eq!(drifts[2], 1.0);
        assert_eq!(schedule.a_final(), 1.0);
    }

    #[test]
    fn test_schedule_is_monotonic() {
        let schedule = StepSchedule::uniform(0.02, 1.0, 17).unwrap();
        let mut a_x = schedule.a_init();
        let mut a_v = schedule.a_init();
        for step in schedule.steps() {
            assert!(step.kick_to >= a_v && step.drift_to > a_x);
            assert!(step.kick_to > a_x && step.kick_to < step.drift_to);
            a_v = step.kick_to;
            a_x = step.drift_to;
        }
        assert_eq!(a_x, 1.0);
    }

    #[test]
    fn test_invalid_schedules() {
        assert!(StepSchedule::uniform(0.1, 1.0, 0).is_err());
        assert!(StepSchedule::uniform(0.0, 1.0, 4).is_err());
        assert!(StepSchedule::uniform(0.5, 0.1, 4).is_err());
        assert!(StepSchedule::uniform(f64::NAN, 1.0, 4).is_err());
        assert!(StepSchedule::uniform(0.5, 0.5, 2).is_ok());
    }
}
