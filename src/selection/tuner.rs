//! Cross-validated feature-count tuning
//!
//! Runs one elimination per cross-validation fold over the training
//! partition, scoring every intermediate subset size against the held-out
//! partition through the step-score hook. Per-size scores are summed across
//! folds and the count maximizing the aggregate wins, with ties broken
//! toward fewer features. A final elimination at the winning count then
//! runs over the complete dataset.

use crate::cross_validation::{CrossValidator, CvSplit};
use crate::error::{Result, RfeError};
use crate::estimator::{Capability, Estimator, EstimatorScorer, Scorer};
use crate::memo::{FitMemo, NoMemo};
use crate::meta::FeatureMeta;
use crate::selection::elimination::{run_elimination, select_columns};
use crate::selection::rfe::Rfe;
use crate::selection::schedule::{StepConfig, StepSchedule};
use ndarray::{Array1, Array2, Axis};
use std::sync::Arc;
use tracing::debug;

/// One fold's contribution: a score per subset size and the size axis.
type FoldCurve = (Vec<f64>, Vec<usize>);

struct FittedState {
    selector: Rfe,
    grid_scores: Vec<f64>,
    n_remaining_steps: Vec<usize>,
}

/// Recursive feature elimination with cross-validated selection of the
/// feature count.
pub struct RfeTuner {
    estimator: Box<dyn Estimator>,
    step_config: StepConfig,
    min_features_to_select: usize,
    cv: CrossValidator,
    scorer: Arc<dyn Scorer>,
    n_jobs: usize,
    penalty_factor_column: Option<String>,
    memo: Arc<dyn FitMemo>,
    fitted: Option<FittedState>,
}

impl RfeTuner {
    /// Create a tuner around an estimator template
    pub fn new(estimator: Box<dyn Estimator>) -> Self {
        Self {
            estimator,
            step_config: StepConfig::default(),
            min_features_to_select: 1,
            cv: CrossValidator::default(),
            scorer: Arc::new(EstimatorScorer),
            n_jobs: 1,
            penalty_factor_column: None,
            memo: Arc::new(NoMemo),
            fitted: None,
        }
    }

    /// Step scheduling policy
    pub fn with_step_config(mut self, config: StepConfig) -> Self {
        self.step_config = config;
        self
    }

    /// Smallest feature count to score; the winner never falls below it
    pub fn with_min_features_to_select(mut self, n: usize) -> Self {
        self.min_features_to_select = n;
        self
    }

    /// Cross-validation splitter
    pub fn with_cv(mut self, cv: CrossValidator) -> Self {
        self.cv = cv;
        self
    }

    /// Scorer applied to held-out partitions
    pub fn with_scorer(mut self, scorer: Arc<dyn Scorer>) -> Self {
        self.scorer = scorer;
        self
    }

    /// Worker count for fold tasks; 1 runs fully sequential
    pub fn with_n_jobs(mut self, n_jobs: usize) -> Self {
        self.n_jobs = n_jobs.max(1);
        self
    }

    /// Metadata column whose zero entries mark permanently kept features
    pub fn with_penalty_factor_column(mut self, column: impl Into<String>) -> Self {
        self.penalty_factor_column = Some(column.into());
        self
    }

    /// Memoization store passed through to the final full-data elimination
    pub fn with_memo(mut self, memo: Arc<dyn FitMemo>) -> Self {
        self.memo = memo;
        self
    }

    /// Fit the tuner: trace every fold, pick the best feature count, then
    /// refit on the complete dataset at that count.
    pub fn fit(
        &mut self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        groups: Option<&Array1<i64>>,
        feature_meta: Option<&FeatureMeta>,
    ) -> Result<()> {
        if x.nrows() != y.len() {
            return Err(RfeError::ShapeError(format!(
                "X has {} rows but y has {} entries",
                x.nrows(),
                y.len()
            )));
        }
        if x.ncols() < 2 {
            return Err(RfeError::ValidationError(
                "at least 2 features are required".to_string(),
            ));
        }
        if self.min_features_to_select < 1 {
            return Err(RfeError::ValidationError(
                "min_features_to_select must be >= 1".to_string(),
            ));
        }

        let kept = match (&self.penalty_factor_column, feature_meta) {
            (Some(column), Some(meta)) => {
                if meta.n_features() != x.ncols() {
                    return Err(RfeError::ShapeError(format!(
                        "X has {} features but feature_meta describes {}",
                        x.ncols(),
                        meta.n_features()
                    )));
                }
                meta.kept_features(column)?
            }
            (Some(_), None) => {
                return Err(RfeError::ValidationError(
                    "penalty_factor_column specified but feature_meta not passed".to_string(),
                ))
            }
            _ => Vec::new(),
        };
        let n_eliminable = x.ncols() - kept.len();

        // One schedule shared by every fold: the structural invariant that
        // all folds trace the same remaining-count sequence follows from it
        let schedule = StepSchedule::build(n_eliminable, 1, &self.step_config)?;
        let splits = self.cv.split(x.nrows(), Some(y), groups)?;
        let n_folds = splits.len();

        let curves: Vec<FoldCurve> = if self.n_jobs > 1 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.n_jobs)
                .build()
                .map_err(|e| RfeError::ThreadPoolError(e.to_string()))?;
            pool.install(|| {
                use rayon::prelude::*;
                splits
                    .par_iter()
                    .map(|split| self.run_fold(x, y, split, &schedule, &kept))
                    .collect::<Result<Vec<_>>>()
            })?
        } else {
            splits
                .iter()
                .map(|split| self.run_fold(x, y, split, &schedule, &kept))
                .collect::<Result<Vec<_>>>()?
        };

        // Every fold must agree on the size axis before aggregation
        let n_remaining_steps = curves[0].1.clone();
        for (scores, steps) in &curves {
            if *steps != n_remaining_steps || scores.len() != n_remaining_steps.len() {
                return Err(RfeError::ValidationError(
                    "folds produced mismatched remaining-feature-count sequences".to_string(),
                ));
            }
        }

        let mut aggregate = vec![0.0f64; n_remaining_steps.len()];
        for (scores, _) in &curves {
            for (total, &score) in aggregate.iter_mut().zip(scores.iter()) {
                *total += score;
            }
        }

        // Counts are strictly decreasing along the axis, so keeping >= maxima
        // while scanning forward settles ties on the smallest count
        let mut winner = None;
        let mut best = f64::NEG_INFINITY;
        for (idx, &count) in n_remaining_steps.iter().enumerate() {
            if count < self.min_features_to_select {
                continue;
            }
            if aggregate[idx] >= best {
                best = aggregate[idx];
                winner = Some(count);
            }
        }
        let n_features_to_select = winner.ok_or_else(|| {
            RfeError::ValidationError(
                "min_features_to_select leaves no feature count to score".to_string(),
            )
        })?;
        debug!(n_features_to_select, best, "selected feature count");

        // A transition at or below the winner would be an invalid range on
        // the final run
        let mut final_config = self.step_config.clone();
        if let Some(at) = final_config.resolve_tune_step_at(n_eliminable) {
            if at <= n_features_to_select {
                final_config.tune_step_at = None;
            }
        }

        let mut selector = Rfe::new(self.estimator.fresh())
            .with_n_features_to_select(n_features_to_select)
            .with_step_config(final_config)
            .with_memo(Arc::clone(&self.memo));
        if let Some(column) = &self.penalty_factor_column {
            selector = selector.with_penalty_factor_column(column.clone());
        }
        selector.fit(x, y, feature_meta)?;

        self.fitted = Some(FittedState {
            selector,
            grid_scores: aggregate.iter().map(|s| s / n_folds as f64).collect(),
            n_remaining_steps,
        });
        Ok(())
    }

    fn run_fold(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        split: &CvSplit,
        schedule: &StepSchedule,
        kept: &[usize],
    ) -> Result<FoldCurve> {
        let run = || -> Result<FoldCurve> {
            let x_train = x.select(Axis(0), &split.train_indices);
            let y_train = y.select(Axis(0), &split.train_indices);
            let x_test = x.select(Axis(0), &split.test_indices);
            let y_test = y.select(Axis(0), &split.test_indices);

            let scorer = Arc::clone(&self.scorer);
            let mut hook = |estimator: &dyn Estimator, features: &[usize]| {
                scorer.score(estimator, &select_columns(&x_test, features), &y_test)
            };
            let history = run_elimination(
                self.estimator.as_ref(),
                &x_train,
                &y_train,
                schedule,
                kept,
                Some(&mut hook),
            )?;
            Ok((history.scores().to_vec(), history.n_remaining().to_vec()))
        };
        run().map_err(|e| RfeError::FoldError {
            fold: split.fold_idx,
            source: Box::new(e),
        })
    }

    fn fitted(&self) -> Result<&FittedState> {
        self.fitted
            .as_ref()
            .ok_or_else(|| RfeError::NotFitted("RfeTuner".to_string()))
    }

    /// Aggregate score per subset size, normalized by the fold count;
    /// index-aligned with [`RfeTuner::n_remaining_steps`]
    pub fn grid_scores(&self) -> Result<&[f64]> {
        Ok(&self.fitted()?.grid_scores)
    }

    /// The remaining-feature-count axis of the aggregate score curve
    pub fn n_remaining_steps(&self) -> Result<&[usize]> {
        Ok(&self.fitted()?.n_remaining_steps)
    }

    /// Final support mask
    pub fn support(&self) -> Result<&Array1<bool>> {
        self.fitted()?.selector.support()
    }

    /// Final ranking vector, rank 1 = retained
    pub fn ranking(&self) -> Result<&Array1<u32>> {
        self.fitted()?.selector.ranking()
    }

    /// Number of retained features, kept features included
    pub fn n_features(&self) -> Result<usize> {
        self.fitted()?.selector.n_features()
    }

    /// The estimator refit on the winning subset of the complete dataset
    pub fn estimator(&self) -> Result<&dyn Estimator> {
        self.fitted()?.selector.estimator()
    }

    /// Whether the refit estimator provides a capability
    pub fn supports(&self, capability: Capability) -> Result<bool> {
        self.fitted()?.selector.supports(capability)
    }

    /// Reduce `x` to the selected features
    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.fitted()?.selector.transform(x)
    }

    /// Reduce `x` to the selected features, then predict
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.fitted()?.selector.predict(x)
    }

    /// Reduce `x` to the selected features, then score
    pub fn score(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<f64> {
        self.fitted()?.selector.score(x, y)
    }

    /// Reduce `x` to the selected features, then compute the decision function
    pub fn decision_function(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.fitted()?.selector.decision_function(x)
    }

    /// Reduce `x` to the selected features, then predict class probabilities
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.fitted()?.selector.predict_proba(x)
    }

    /// Reduce `x` to the selected features, then predict log-probabilities
    pub fn predict_log_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.fitted()?.selector.predict_log_proba(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cross_validation::CvStrategy;
    use crate::estimator::{ImportanceSignal, LinearEstimator};

    /// Scorer keyed purely on subset width, for exercising tie-breaking.
    struct WidthScorer {
        scores: fn(usize) -> f64,
    }

    impl Scorer for WidthScorer {
        fn score(&self, _e: &dyn Estimator, x: &Array2<f64>, _y: &Array1<f64>) -> Result<f64> {
            Ok((self.scores)(x.ncols()))
        }
    }

    /// Importance = column mean; deterministic elimination order.
    struct ColumnMeanEstimator {
        means: Option<Array1<f64>>,
    }

    impl Estimator for ColumnMeanEstimator {
        fn fresh(&self) -> Box<dyn Estimator> {
            Box::new(Self { means: None })
        }
        fn fit(&mut self, x: &Array2<f64>, _y: &Array1<f64>) -> Result<()> {
            self.means = x.mean_axis(Axis(0));
            Ok(())
        }
        fn importance(&self) -> Option<ImportanceSignal> {
            self.means.clone().map(ImportanceSignal::Importances)
        }
        fn cache_token(&self) -> String {
            "ColumnMeanEstimator".to_string()
        }
    }

    fn graded_data(n_samples: usize, n_features: usize) -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((n_samples, n_features), |(_, j)| (j + 1) as f64);
        let y = Array1::from_shape_fn(n_samples, |i| (i % 2) as f64);
        (x, y)
    }

    #[test]
    fn test_tie_breaks_toward_fewer_features() {
        let (x, y) = graded_data(20, 6);
        // Counts 2 and 4 tie at the maximum aggregate score
        let scorer = WidthScorer {
            scores: |width| match width {
                2 | 4 => 1.0,
                _ => 0.0,
            },
        };
        let mut tuner = RfeTuner::new(Box::new(ColumnMeanEstimator { means: None }))
            .with_cv(CrossValidator::new(CvStrategy::KFold {
                n_splits: 5,
                shuffle: false,
            }))
            .with_scorer(Arc::new(scorer));
        tuner.fit(&x, &y, None, None).unwrap();
        assert_eq!(tuner.n_features().unwrap(), 2);
    }

    #[test]
    fn test_grid_scores_normalized_and_aligned() {
        let (x, y) = graded_data(20, 5);
        let scorer = WidthScorer {
            scores: |width| width as f64,
        };
        let mut tuner = RfeTuner::new(Box::new(ColumnMeanEstimator { means: None }))
            .with_cv(CrossValidator::new(CvStrategy::KFold {
                n_splits: 4,
                shuffle: false,
            }))
            .with_scorer(Arc::new(scorer));
        tuner.fit(&x, &y, None, None).unwrap();

        let steps = tuner.n_remaining_steps().unwrap();
        let scores = tuner.grid_scores().unwrap();
        assert_eq!(steps, &[5, 4, 3, 2, 1]);
        assert_eq!(scores.len(), steps.len());
        // Mean across folds of a width-valued score is the width itself
        for (&score, &count) in scores.iter().zip(steps.iter()) {
            assert!((score - count as f64).abs() < 1e-12);
        }
    }

    #[test]
    fn test_min_features_floor_respected() {
        let (x, y) = graded_data(20, 6);
        // Smaller is always better, but the floor stops the winner at 3
        let scorer = WidthScorer {
            scores: |width| -(width as f64),
        };
        let mut tuner = RfeTuner::new(Box::new(ColumnMeanEstimator { means: None }))
            .with_cv(CrossValidator::new(CvStrategy::KFold {
                n_splits: 4,
                shuffle: false,
            }))
            .with_scorer(Arc::new(scorer))
            .with_min_features_to_select(3);
        tuner.fit(&x, &y, None, None).unwrap();
        assert_eq!(tuner.n_features().unwrap(), 3);
    }

    #[test]
    fn test_fold_failure_aborts_fit() {
        struct FailingScorer;
        impl Scorer for FailingScorer {
            fn score(
                &self,
                _e: &dyn Estimator,
                _x: &Array2<f64>,
                _y: &Array1<f64>,
            ) -> Result<f64> {
                Err(RfeError::ValidationError("scorer blew up".to_string()))
            }
        }
        let (x, y) = graded_data(20, 4);
        let mut tuner = RfeTuner::new(Box::new(ColumnMeanEstimator { means: None }))
            .with_cv(CrossValidator::new(CvStrategy::KFold {
                n_splits: 4,
                shuffle: false,
            }))
            .with_scorer(Arc::new(FailingScorer));
        let err = tuner.fit(&x, &y, None, None).unwrap_err();
        assert!(matches!(err, RfeError::FoldError { .. }));
    }

    #[test]
    fn test_estimator_scorer_with_linear_model() {
        // y depends on columns 0 and 1 only; held-out R2 peaks once both
        // are retained. Rounding the score makes equal-quality subsets tie
        // exactly, so the smallest winning count is deterministic.
        struct RoundedR2;
        impl Scorer for RoundedR2 {
            fn score(
                &self,
                estimator: &dyn Estimator,
                x: &Array2<f64>,
                y: &Array1<f64>,
            ) -> Result<f64> {
                Ok((estimator.score(x, y)? * 1e6).round() / 1e6)
            }
        }

        let x = Array2::from_shape_fn((60, 5), |(i, j)| {
            let v = ((i * 13 + j * 29 + 3) % 19) as f64;
            (v - 9.0) / 9.0
        });
        let y = Array1::from_shape_fn(60, |i| 3.0 * x[[i, 0]] + 2.0 * x[[i, 1]]);

        let mut tuner = RfeTuner::new(Box::new(LinearEstimator::new(1e-9)))
            .with_cv(CrossValidator::new(CvStrategy::KFold {
                n_splits: 3,
                shuffle: false,
            }))
            .with_scorer(Arc::new(RoundedR2))
            .with_n_jobs(2);
        tuner.fit(&x, &y, None, None).unwrap();

        let support = tuner.support().unwrap();
        assert!(support[0] && support[1]);
        assert_eq!(tuner.n_features().unwrap(), 2);
        assert!(tuner.score(&x, &y).unwrap() > 0.99);
    }
}
