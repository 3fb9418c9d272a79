//! Estimator and scorer contracts
//!
//! Selectors in this crate wrap an external supervised estimator. The
//! estimator must expose a fresh-state clone (a new unfitted instance with
//! the same configuration) and, after fitting, an importance signal: either
//! a coefficient matrix or a per-feature importance vector. Prediction-side
//! capabilities are optional and reported through [`Estimator::supports`];
//! calling an absent capability yields a typed
//! [`RfeError::DelegateUnavailable`] error rather than a panic.

pub mod linear;

use crate::error::{Result, RfeError};
use ndarray::{Array1, Array2, Axis};

pub use linear::LinearEstimator;

/// Optional prediction-side capabilities an estimator may provide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Predict,
    Score,
    DecisionFunction,
    PredictProba,
    PredictLogProba,
}

/// Importance signal obtained from a fitted estimator.
///
/// Coefficients are preferred when an estimator exposes both.
#[derive(Debug, Clone)]
pub enum ImportanceSignal {
    /// Linear coefficients, shape `(n_outputs, n_features)`
    Coefficients(Array2<f64>),
    /// One importance per feature
    Importances(Array1<f64>),
}

impl ImportanceSignal {
    /// Reduce to one non-negative score per feature.
    ///
    /// Multi-output coefficients collapse by sum of squares across outputs;
    /// importance vectors are squared. `n_features` is the width of the
    /// subset the estimator was fit on.
    pub fn reduce(&self, n_features: usize) -> Result<Array1<f64>> {
        let scores = match self {
            ImportanceSignal::Coefficients(coefs) => {
                if coefs.ncols() != n_features {
                    return Err(RfeError::ShapeError(format!(
                        "coefficient matrix has {} columns, expected {}",
                        coefs.ncols(),
                        n_features
                    )));
                }
                coefs.mapv(|v| v * v).sum_axis(Axis(0))
            }
            ImportanceSignal::Importances(imp) => {
                if imp.len() != n_features {
                    return Err(RfeError::ShapeError(format!(
                        "importance vector has {} entries, expected {}",
                        imp.len(),
                        n_features
                    )));
                }
                imp.mapv(|v| v * v)
            }
        };
        Ok(scores)
    }
}

/// A supervised estimator usable for recursive feature elimination.
pub trait Estimator: Send + Sync {
    /// A new unfitted instance with the same configuration.
    ///
    /// Selectors never mutate the template they wrap; every fit happens on
    /// a fresh clone.
    fn fresh(&self) -> Box<dyn Estimator>;

    /// Fit on a feature subset
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()>;

    /// Importance signal after a successful fit, `None` before fitting or
    /// when the estimator has nothing to report
    fn importance(&self) -> Option<ImportanceSignal>;

    /// Stable description of the estimator configuration, used when
    /// building memoization keys. Must change whenever a parameter that
    /// affects fitting changes.
    fn cache_token(&self) -> String;

    /// Whether a prediction-side capability is available
    fn supports(&self, _capability: Capability) -> bool {
        false
    }

    /// Predict target values
    fn predict(&self, _x: &Array2<f64>) -> Result<Array1<f64>> {
        Err(RfeError::DelegateUnavailable("predict".to_string()))
    }

    /// Score the fitted estimator on held-out data, higher is better
    fn score(&self, _x: &Array2<f64>, _y: &Array1<f64>) -> Result<f64> {
        Err(RfeError::DelegateUnavailable("score".to_string()))
    }

    /// Signed distance to the decision boundary
    fn decision_function(&self, _x: &Array2<f64>) -> Result<Array1<f64>> {
        Err(RfeError::DelegateUnavailable("decision_function".to_string()))
    }

    /// Class probabilities, shape `(n_samples, n_classes)`
    fn predict_proba(&self, _x: &Array2<f64>) -> Result<Array2<f64>> {
        Err(RfeError::DelegateUnavailable("predict_proba".to_string()))
    }

    /// Class log-probabilities, shape `(n_samples, n_classes)`
    fn predict_log_proba(&self, _x: &Array2<f64>) -> Result<Array2<f64>> {
        Err(RfeError::DelegateUnavailable("predict_log_proba".to_string()))
    }
}

/// Scoring contract used during cross-validated tuning.
pub trait Scorer: Send + Sync {
    /// Score a fitted estimator against held-out data, higher is better
    fn score(&self, estimator: &dyn Estimator, x: &Array2<f64>, y: &Array1<f64>) -> Result<f64>;
}

/// Default scorer delegating to the estimator's own `score` capability.
#[derive(Debug, Clone, Copy, Default)]
pub struct EstimatorScorer;

impl Scorer for EstimatorScorer {
    fn score(&self, estimator: &dyn Estimator, x: &Array2<f64>, y: &Array1<f64>) -> Result<f64> {
        estimator.score(x, y)
    }
}
