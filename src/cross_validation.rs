//! Deterministic cross-validation splitters
//!
//! The tuner only needs ordered train/test index pairs that every fold task
//! can re-derive from the same inputs, so splits are fully determined by
//! the strategy and an optional seed.

use crate::error::{Result, RfeError};
use ndarray::Array1;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Cross-validation strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CvStrategy {
    /// Plain K-Fold
    KFold { n_splits: usize, shuffle: bool },
    /// K-Fold preserving the class distribution of `y` per fold
    StratifiedKFold { n_splits: usize, shuffle: bool },
    /// K-Fold keeping all samples of a group in the same fold
    GroupKFold { n_splits: usize },
}

impl Default for CvStrategy {
    fn default() -> Self {
        CvStrategy::KFold {
            n_splits: 5,
            shuffle: false,
        }
    }
}

/// A single train/test split.
#[derive(Debug, Clone)]
pub struct CvSplit {
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
    pub fold_idx: usize,
}

/// Deterministic splitter over sample indices.
#[derive(Debug, Clone)]
pub struct CrossValidator {
    strategy: CvStrategy,
    random_state: Option<u64>,
}

impl Default for CrossValidator {
    fn default() -> Self {
        Self::new(CvStrategy::default())
    }
}

impl CrossValidator {
    /// Create a splitter for a strategy
    pub fn new(strategy: CvStrategy) -> Self {
        Self {
            strategy,
            random_state: None,
        }
    }

    /// Seed the shuffling so splits reproduce exactly
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    /// Number of folds this splitter produces
    pub fn n_splits(&self) -> usize {
        match self.strategy {
            CvStrategy::KFold { n_splits, .. }
            | CvStrategy::StratifiedKFold { n_splits, .. }
            | CvStrategy::GroupKFold { n_splits } => n_splits,
        }
    }

    /// Produce the ordered train/test index pairs
    pub fn split(
        &self,
        n_samples: usize,
        y: Option<&Array1<f64>>,
        groups: Option<&Array1<i64>>,
    ) -> Result<Vec<CvSplit>> {
        match &self.strategy {
            CvStrategy::KFold { n_splits, shuffle } => {
                self.k_fold(n_samples, *n_splits, *shuffle)
            }
            CvStrategy::StratifiedKFold { n_splits, shuffle } => {
                let y = y.ok_or_else(|| {
                    RfeError::ValidationError(
                        "StratifiedKFold requires the target array".to_string(),
                    )
                })?;
                self.stratified_k_fold(y, *n_splits, *shuffle)
            }
            CvStrategy::GroupKFold { n_splits } => {
                let groups = groups.ok_or_else(|| {
                    RfeError::ValidationError(
                        "GroupKFold requires a groups array".to_string(),
                    )
                })?;
                self.group_k_fold(groups, *n_splits)
            }
        }
    }

    fn rng(&self) -> ChaCha8Rng {
        match self.random_state {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        }
    }

    fn k_fold(&self, n_samples: usize, n_splits: usize, shuffle: bool) -> Result<Vec<CvSplit>> {
        if n_splits < 2 {
            return Err(RfeError::ValidationError(
                "n_splits must be at least 2".to_string(),
            ));
        }
        if n_samples < n_splits {
            return Err(RfeError::ValidationError(format!(
                "n_samples ({}) must be >= n_splits ({})",
                n_samples, n_splits
            )));
        }

        let mut indices: Vec<usize> = (0..n_samples).collect();
        if shuffle {
            indices.shuffle(&mut self.rng());
        }

        let mut splits = Vec::with_capacity(n_splits);
        let mut current = 0;
        for fold_idx in 0..n_splits {
            let base = n_samples / n_splits;
            let fold_size = if fold_idx < n_samples % n_splits {
                base + 1
            } else {
                base
            };
            let test_indices = indices[current..current + fold_size].to_vec();
            let train_indices: Vec<usize> = indices[..current]
                .iter()
                .chain(indices[current + fold_size..].iter())
                .copied()
                .collect();
            splits.push(CvSplit {
                train_indices,
                test_indices,
                fold_idx,
            });
            current += fold_size;
        }
        Ok(splits)
    }

    fn stratified_k_fold(
        &self,
        y: &Array1<f64>,
        n_splits: usize,
        shuffle: bool,
    ) -> Result<Vec<CvSplit>> {
        if n_splits < 2 {
            return Err(RfeError::ValidationError(
                "n_splits must be at least 2".to_string(),
            ));
        }

        let mut class_indices: HashMap<i64, Vec<usize>> = HashMap::new();
        for (idx, &value) in y.iter().enumerate() {
            class_indices.entry(value.round() as i64).or_default().push(idx);
        }

        let mut rng = self.rng();
        // Deterministic iteration order over classes
        let mut classes: Vec<i64> = class_indices.keys().copied().collect();
        classes.sort_unstable();

        let mut folds: Vec<Vec<usize>> = vec![Vec::new(); n_splits];
        for class in classes {
            let mut indices = class_indices.remove(&class).unwrap_or_default();
            if shuffle {
                indices.shuffle(&mut rng);
            }
            for (i, &idx) in indices.iter().enumerate() {
                folds[i % n_splits].push(idx);
            }
        }

        let mut splits = Vec::with_capacity(n_splits);
        for fold_idx in 0..n_splits {
            let test_indices = folds[fold_idx].clone();
            let train_indices: Vec<usize> = folds
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != fold_idx)
                .flat_map(|(_, fold)| fold.iter().copied())
                .collect();
            splits.push(CvSplit {
                train_indices,
                test_indices,
                fold_idx,
            });
        }
        Ok(splits)
    }

    fn group_k_fold(&self, groups: &Array1<i64>, n_splits: usize) -> Result<Vec<CvSplit>> {
        if n_splits < 2 {
            return Err(RfeError::ValidationError(
                "n_splits must be at least 2".to_string(),
            ));
        }

        let mut unique_groups: Vec<i64> = groups.iter().copied().collect();
        unique_groups.sort_unstable();
        unique_groups.dedup();

        if unique_groups.len() < n_splits {
            return Err(RfeError::ValidationError(format!(
                "number of groups ({}) must be >= n_splits ({})",
                unique_groups.len(),
                n_splits
            )));
        }

        let mut group_to_fold: HashMap<i64, usize> = HashMap::new();
        for (i, &group) in unique_groups.iter().enumerate() {
            group_to_fold.insert(group, i % n_splits);
        }

        let mut splits = Vec::with_capacity(n_splits);
        for fold_idx in 0..n_splits {
            let test_indices: Vec<usize> = groups
                .iter()
                .enumerate()
                .filter(|(_, g)| group_to_fold.get(g) == Some(&fold_idx))
                .map(|(i, _)| i)
                .collect();
            let train_indices: Vec<usize> = groups
                .iter()
                .enumerate()
                .filter(|(_, g)| group_to_fold.get(g) != Some(&fold_idx))
                .map(|(i, _)| i)
                .collect();
            splits.push(CvSplit {
                train_indices,
                test_indices,
                fold_idx,
            });
        }
        Ok(splits)
    }
}
