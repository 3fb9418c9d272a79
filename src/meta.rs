//! Feature metadata side table
//!
//! A small named-column table keyed by feature index. Its only role in this
//! crate is deriving the kept-feature set: features whose penalty factor is
//! zero are excluded from elimination for the lifetime of one fit.

use crate::error::{Result, RfeError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-feature metadata with named numeric columns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureMeta {
    n_features: usize,
    columns: HashMap<String, Vec<f64>>,
}

impl FeatureMeta {
    /// Create an empty metadata table for `n_features` features
    pub fn new(n_features: usize) -> Self {
        Self {
            n_features,
            columns: HashMap::new(),
        }
    }

    /// Add a named column; its length must match the feature count
    pub fn with_column(mut self, name: impl Into<String>, values: Vec<f64>) -> Result<Self> {
        if values.len() != self.n_features {
            return Err(RfeError::ShapeError(format!(
                "metadata column has {} entries but table holds {} features",
                values.len(),
                self.n_features
            )));
        }
        self.columns.insert(name.into(), values);
        Ok(self)
    }

    /// Number of features this table describes
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Look up a column by name
    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns.get(name).map(Vec::as_slice)
    }

    /// Indices of features whose value in `column` is exactly zero.
    ///
    /// These features are kept for the whole fit: never ranked, never
    /// eliminated. Returned sorted ascending.
    pub fn kept_features(&self, column: &str) -> Result<Vec<usize>> {
        let values = self.columns.get(column).ok_or_else(|| {
            RfeError::ValidationError(format!("metadata column '{}' does not exist", column))
        })?;
        Ok(values
            .iter()
            .enumerate()
            .filter(|(_, &v)| v == 0.0)
            .map(|(i, _)| i)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kept_features_from_penalty_factor() {
        let meta = FeatureMeta::new(5)
            .with_column("penalty_factor", vec![1.0, 0.0, 1.0, 0.0, 1.0])
            .unwrap();
        assert_eq!(meta.kept_features("penalty_factor").unwrap(), vec![1, 3]);
    }

    #[test]
    fn test_missing_column_is_validation_error() {
        let meta = FeatureMeta::new(3);
        let err = meta.kept_features("penalty_factor").unwrap_err();
        assert!(matches!(err, RfeError::ValidationError(_)));
    }

    #[test]
    fn test_column_length_mismatch() {
        let err = FeatureMeta::new(3)
            .with_column("penalty_factor", vec![0.0, 1.0])
            .unwrap_err();
        assert!(matches!(err, RfeError::ShapeError(_)));
    }
}
