//! Error types for the crate

use thiserror::Error;

/// Errors produced by selectors, schedulers and collaborators.
#[derive(Debug, Error)]
pub enum RfeError {
    /// Invalid configuration, detected before any fitting happens
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Dataset, target or metadata dimensions do not agree
    #[error("Shape error: {0}")]
    ShapeError(String),

    /// The wrapped estimator exposes neither coefficients nor importances
    #[error("Unsupported estimator: {0}")]
    UnsupportedEstimator(String),

    /// A delegated estimator capability is not provided
    #[error("Estimator does not provide '{0}'")]
    DelegateUnavailable(String),

    /// A cross-validation fold task failed during tuning
    #[error("Fold {fold} failed: {source}")]
    FoldError {
        fold: usize,
        #[source]
        source: Box<RfeError>,
    },

    /// Memoization backend I/O failure, distinct from computation errors
    #[error("Cache error: {0}")]
    CacheError(String),

    /// The fold worker pool could not be brought up
    #[error("Worker pool error: {0}")]
    ThreadPoolError(String),

    /// A post-fit attribute was accessed before `fit`
    #[error("Not fitted: {0}")]
    NotFitted(String),
}

/// Result type alias for the crate
pub type Result<T> = std::result::Result<T, RfeError>;
