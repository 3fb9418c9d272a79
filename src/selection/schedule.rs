//! Adaptive elimination step scheduler
//!
//! Produces the ordered per-round elimination sizes before any fitting
//! happens. The schedule has two regimes: a coarse `step` applied while many
//! features remain, and an optional fine `tuning_step` that takes over once
//! the remaining count reaches `tune_step_at`. The step before the
//! transition is capped so the schedule lands exactly on `tune_step_at`
//! rather than stepping over it.

use crate::error::{Result, RfeError};
use serde::{Deserialize, Serialize};

/// A step size, either an absolute feature count or a fraction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum StepSize {
    /// Remove this many features per round
    Count(usize),
    /// Remove this fraction of features per round, must be within (0, 1)
    Fraction(f64),
}

/// Scheduler configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepConfig {
    /// Coarse step applied until `tune_step_at` is reached
    pub step: StepSize,
    /// Remaining-feature count at which `tuning_step` takes over
    pub tune_step_at: Option<StepSize>,
    /// Fine step applied once `tune_step_at` features remain
    pub tuning_step: StepSize,
    /// When true, fractional steps recompute against the current remaining
    /// count each round; when false they are constant, computed once against
    /// the original count (`step`) or against `tune_step_at` (`tuning_step`)
    pub reducing_step: bool,
}

impl Default for StepConfig {
    fn default() -> Self {
        Self {
            step: StepSize::Count(1),
            tune_step_at: None,
            tuning_step: StepSize::Count(1),
            reducing_step: false,
        }
    }
}

impl StepConfig {
    /// Resolve `tune_step_at` to an absolute remaining-feature count.
    ///
    /// Fractions are taken of the original eliminable count. Returns `None`
    /// when no transition is configured.
    pub fn resolve_tune_step_at(&self, n_features: usize) -> Option<usize> {
        match self.tune_step_at {
            None => None,
            Some(StepSize::Count(c)) => Some(c),
            Some(StepSize::Fraction(f)) => {
                Some(((f * n_features as f64).floor() as usize).max(1))
            }
        }
    }
}

/// The resolved elimination schedule for one fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSchedule {
    steps: Vec<usize>,
    n_remaining: Vec<usize>,
}

impl StepSchedule {
    /// Build the schedule for `n_features` eliminable features, stepping
    /// down toward `n_features_to_select`.
    ///
    /// Every step is at least 1 and at most `remaining - 1`, so the last
    /// feature is never eliminated. The final step is not capped against the
    /// target: a coarse step may overshoot it, which the selection logic
    /// resolves later with a rollback and a partial elimination.
    pub fn build(
        n_features: usize,
        n_features_to_select: usize,
        config: &StepConfig,
    ) -> Result<Self> {
        let coarse_base = match config.step {
            StepSize::Count(c) => {
                if c < 1 {
                    return Err(RfeError::ValidationError("step must be > 0".to_string()));
                }
                Some(c)
            }
            StepSize::Fraction(f) => {
                if f <= 0.0 || f >= 1.0 {
                    return Err(RfeError::ValidationError(
                        "fractional step must be within (0, 1)".to_string(),
                    ));
                }
                if config.reducing_step {
                    None
                } else {
                    Some(((f * n_features as f64).floor() as usize).max(1))
                }
            }
        };

        let tune_step_at = config.resolve_tune_step_at(n_features);
        let mut tuning_base = None;
        if let Some(at) = tune_step_at {
            if at <= n_features_to_select || at >= n_features {
                return Err(RfeError::ValidationError(format!(
                    "tune_step_at ({}) must be greater than n_features_to_select ({}) \
                     and less than the initial number of features ({})",
                    at, n_features_to_select, n_features
                )));
            }
            tuning_base = match config.tuning_step {
                StepSize::Count(c) => {
                    if c < 1 {
                        return Err(RfeError::ValidationError(
                            "tuning_step must be > 0".to_string(),
                        ));
                    }
                    Some(c)
                }
                StepSize::Fraction(f) => {
                    if f <= 0.0 || f >= 1.0 {
                        return Err(RfeError::ValidationError(
                            "fractional tuning_step must be within (0, 1)".to_string(),
                        ));
                    }
                    if config.reducing_step {
                        None
                    } else {
                        Some(((f * at as f64).floor() as usize).max(1))
                    }
                }
            };
        }

        let floor = n_features_to_select.max(1);
        let mut steps = Vec::new();
        let mut remaining = n_features;
        let mut n_remaining = vec![remaining];

        while remaining > floor {
            let step = match tune_step_at {
                Some(at) if remaining > at => match (config.step, config.reducing_step) {
                    // Land exactly on the transition point, never step over it
                    (StepSize::Fraction(f), true) => {
                        fractional_step(f, remaining, remaining - at)
                    }
                    _ => coarse_base.unwrap_or(1).min(remaining - at),
                },
                Some(_) => match (config.tuning_step, config.reducing_step) {
                    (StepSize::Fraction(f), true) => {
                        fractional_step(f, remaining, remaining - 1)
                    }
                    _ => tuning_base.unwrap_or(1).min(remaining - 1),
                },
                None => match (config.step, config.reducing_step) {
                    (StepSize::Fraction(f), true) => {
                        fractional_step(f, remaining, remaining - 1)
                    }
                    _ => coarse_base.unwrap_or(1).min(remaining - 1),
                },
            };
            remaining -= step;
            steps.push(step);
            n_remaining.push(remaining);
        }

        Ok(Self { steps, n_remaining })
    }

    /// Per-round elimination sizes
    pub fn steps(&self) -> &[usize] {
        &self.steps
    }

    /// Remaining eliminable feature count before round 0 and after each
    /// round; `n_remaining()[0]` is the initial count
    pub fn n_remaining(&self) -> &[usize] {
        &self.n_remaining
    }

    /// Number of elimination rounds
    pub fn n_rounds(&self) -> usize {
        self.steps.len()
    }
}

/// A reducing fractional step: fraction of the current remaining count,
/// floored, at least 1 and at most `cap`.
fn fractional_step(fraction: f64, remaining: usize, cap: usize) -> usize {
    let raw = (fraction * remaining as f64).min(cap as f64);
    (raw.max(1.0).floor()) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_steps_to_target() {
        let schedule = StepSchedule::build(10, 5, &StepConfig::default()).unwrap();
        assert_eq!(schedule.steps(), &[1, 1, 1, 1, 1]);
        assert_eq!(schedule.n_remaining(), &[10, 9, 8, 7, 6, 5]);
        assert_eq!(schedule.steps().iter().sum::<usize>(), 5);
    }

    #[test]
    fn test_constant_fractional_step() {
        let config = StepConfig {
            step: StepSize::Fraction(0.5),
            ..StepConfig::default()
        };
        let schedule = StepSchedule::build(20, 1, &config).unwrap();
        // Constant 10 until fewer than 10 remain, then capped to remaining-1
        assert_eq!(schedule.steps(), &[10, 9]);
        assert_eq!(schedule.n_remaining(), &[20, 10, 1]);
    }

    #[test]
    fn test_reducing_fractional_step() {
        let config = StepConfig {
            step: StepSize::Fraction(0.5),
            reducing_step: true,
            ..StepConfig::default()
        };
        let schedule = StepSchedule::build(16, 1, &config).unwrap();
        assert_eq!(schedule.steps(), &[8, 4, 2, 1]);
        assert_eq!(schedule.n_remaining(), &[16, 8, 4, 2, 1]);
    }

    #[test]
    fn test_tuning_transition_lands_exactly() {
        let config = StepConfig {
            step: StepSize::Count(3),
            tune_step_at: Some(StepSize::Count(5)),
            tuning_step: StepSize::Count(1),
            reducing_step: false,
        };
        let schedule = StepSchedule::build(20, 1, &config).unwrap();
        assert_eq!(schedule.steps(), &[3, 3, 3, 3, 3, 1, 1, 1, 1]);
        // The coarse phase lands exactly at 5, never undershooting it
        assert!(schedule.n_remaining().contains(&5));
        assert_eq!(
            schedule.n_remaining(),
            &[20, 17, 14, 11, 8, 5, 4, 3, 2, 1]
        );
    }

    #[test]
    fn test_step_bounds_hold_for_all_rounds() {
        let config = StepConfig {
            step: StepSize::Fraction(0.3),
            reducing_step: true,
            ..StepConfig::default()
        };
        let schedule = StepSchedule::build(50, 1, &config).unwrap();
        let mut remaining = 50;
        for &step in schedule.steps() {
            assert!(step >= 1);
            assert!(step <= remaining - 1);
            remaining -= step;
        }
        assert_eq!(remaining, 1);
        assert_eq!(schedule.steps().iter().sum::<usize>(), 49);
    }

    #[test]
    fn test_invalid_step_rejected() {
        let config = StepConfig {
            step: StepSize::Count(0),
            ..StepConfig::default()
        };
        assert!(matches!(
            StepSchedule::build(10, 1, &config),
            Err(RfeError::ValidationError(_))
        ));

        let config = StepConfig {
            step: StepSize::Fraction(1.5),
            ..StepConfig::default()
        };
        assert!(matches!(
            StepSchedule::build(10, 1, &config),
            Err(RfeError::ValidationError(_))
        ));
    }

    #[test]
    fn test_invalid_tune_step_at_rejected() {
        let config = StepConfig {
            step: StepSize::Count(1),
            tune_step_at: Some(StepSize::Count(5)),
            tuning_step: StepSize::Count(1),
            reducing_step: false,
        };
        // Not strictly between target and n_features
        assert!(StepSchedule::build(10, 5, &config).is_err());
        assert!(StepSchedule::build(5, 1, &config).is_err());
        assert!(StepSchedule::build(10, 1, &config).is_ok());
    }

    #[test]
    fn test_fractional_tune_step_at() {
        let config = StepConfig {
            step: StepSize::Count(4),
            tune_step_at: Some(StepSize::Fraction(0.25)),
            tuning_step: StepSize::Count(1),
            reducing_step: false,
        };
        // tune_step_at resolves to floor(0.25 * 20) = 5
        let schedule = StepSchedule::build(20, 1, &config).unwrap();
        assert!(schedule.n_remaining().contains(&5));
    }

    #[test]
    fn test_overshoot_is_allowed_past_target() {
        let config = StepConfig {
            step: StepSize::Count(3),
            ..StepConfig::default()
        };
        // 10 -> 7 -> 4: the last step overshoots the target of 6
        let schedule = StepSchedule::build(10, 6, &config).unwrap();
        assert_eq!(schedule.n_remaining(), &[10, 7, 4]);
    }
}
