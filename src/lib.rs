//! rfe-select - Recursive feature elimination for supervised models
//!
//! Selects features by recursively fitting an external estimator, ranking
//! features by its importance signal and discarding the least informative
//! block each round. The feature count can be fixed up front or tuned
//! automatically by scoring every intermediate subset size across
//! cross-validation folds.
//!
//! # Modules
//!
//! ## Core
//! - [`selection`] - Step scheduling, the elimination engine, the `Rfe`
//!   selector and the cross-validated `RfeTuner`
//! - [`estimator`] - Estimator and scorer contracts, plus a linear default
//!
//! ## Collaborators
//! - [`cross_validation`] - Deterministic K-Fold splitters
//! - [`memo`] - Memoization of elimination histories
//! - [`meta`] - Feature metadata and kept-feature derivation

// Core error handling
pub mod error;

// Core selection pipeline
pub mod estimator;
pub mod selection;

// Collaborators
pub mod cross_validation;
pub mod memo;
pub mod meta;

pub use error::{Result, RfeError};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{Result, RfeError};

    // Selection
    pub use crate::selection::{
        EliminationHistory, Rfe, RfeTuner, StepConfig, StepSchedule, StepSize,
    };

    // Estimators and scoring
    pub use crate::estimator::{
        Capability, Estimator, EstimatorScorer, ImportanceSignal, LinearEstimator, Scorer,
    };

    // Cross-validation
    pub use crate::cross_validation::{CrossValidator, CvSplit, CvStrategy};

    // Memoization
    pub use crate::memo::{FitMemo, InMemoryMemo, NoMemo};

    // Feature metadata
    pub use crate::meta::FeatureMeta;
}
