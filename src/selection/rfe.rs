//! Recursive feature elimination selector
//!
//! Wraps an estimator template, runs the scheduled elimination and lands on
//! the requested feature count. When the schedule's last step skips over
//! the target, the selector rolls back one round, refits to get a fresh
//! ranking over that round's subset and performs a single partial
//! elimination sized to land exactly on target.

use crate::error::{Result, RfeError};
use crate::estimator::{Capability, Estimator};
use crate::memo::{elimination_key, FitMemo, NoMemo};
use crate::meta::FeatureMeta;
use crate::selection::elimination::{rank_eliminable, run_elimination, select_columns};
use crate::selection::schedule::{StepConfig, StepSchedule};
use ndarray::{Array1, Array2};
use std::sync::Arc;
use tracing::debug;

/// Post-fit state; the only state outliving a `fit` call.
struct FittedState {
    support: Array1<bool>,
    ranking: Array1<u32>,
    n_features: usize,
    estimator: Box<dyn Estimator>,
}

/// Recursive feature elimination selector.
pub struct Rfe {
    estimator: Box<dyn Estimator>,
    n_features_to_select: Option<usize>,
    step_config: StepConfig,
    penalty_factor_column: Option<String>,
    memo: Arc<dyn FitMemo>,
    fitted: Option<FittedState>,
}

impl Rfe {
    /// Create a selector around an estimator template
    pub fn new(estimator: Box<dyn Estimator>) -> Self {
        Self {
            estimator,
            n_features_to_select: None,
            step_config: StepConfig::default(),
            penalty_factor_column: None,
            memo: Arc::new(NoMemo),
            fitted: None,
        }
    }

    /// Target feature count; defaults to half the eliminable features
    pub fn with_n_features_to_select(mut self, n: usize) -> Self {
        self.n_features_to_select = Some(n);
        self
    }

    /// Step scheduling policy
    pub fn with_step_config(mut self, config: StepConfig) -> Self {
        self.step_config = config;
        self
    }

    /// Metadata column whose zero entries mark permanently kept features
    pub fn with_penalty_factor_column(mut self, column: impl Into<String>) -> Self {
        self.penalty_factor_column = Some(column.into());
        self
    }

    /// Memoization store for the elimination history
    pub fn with_memo(mut self, memo: Arc<dyn FitMemo>) -> Self {
        self.memo = memo;
        self
    }

    fn check_inputs(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
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
        if let Some(n) = self.n_features_to_select {
            if n < 1 {
                return Err(RfeError::ValidationError(
                    "n_features_to_select must be >= 1".to_string(),
                ));
            }
        }
        if self.penalty_factor_column.is_some() {
            let meta = feature_meta.ok_or_else(|| {
                RfeError::ValidationError(
                    "penalty_factor_column specified but feature_meta not passed".to_string(),
                )
            })?;
            if meta.n_features() != x.ncols() {
                return Err(RfeError::ShapeError(format!(
                    "X has {} features but feature_meta describes {}",
                    x.ncols(),
                    meta.n_features()
                )));
            }
        }
        Ok(())
    }

    fn kept_features(&self, feature_meta: Option<&FeatureMeta>) -> Result<Vec<usize>> {
        match (&self.penalty_factor_column, feature_meta) {
            (Some(column), Some(meta)) => meta.kept_features(column),
            _ => Ok(Vec::new()),
        }
    }

    /// Fit the selector, then refit the estimator on the selected subset.
    pub fn fit(
        &mut self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        feature_meta: Option<&FeatureMeta>,
    ) -> Result<()> {
        self.check_inputs(x, y, feature_meta)?;

        let kept = self.kept_features(feature_meta)?;
        let n_eliminable = x.ncols() - kept.len();
        let target = self
            .n_features_to_select
            .unwrap_or_else(|| (n_eliminable / 2).max(1));
        if target > n_eliminable {
            return Err(RfeError::ValidationError(format!(
                "n_features_to_select ({}) exceeds the {} eliminable features",
                target, n_eliminable
            )));
        }

        let schedule = StepSchedule::build(n_eliminable, target, &self.step_config)?;

        let key = elimination_key(
            &self.estimator.cache_token(),
            x,
            y,
            schedule.steps(),
            &kept,
        );
        let template = self.estimator.as_ref();
        let history = self.memo.get_or_compute(&key, &mut || {
            run_elimination(template, x, y, &schedule, &kept, None)
        })?;

        // Locate the first round at or below the target
        for round in 0..=history.n_rounds() {
            let retained = history.support(round).iter().filter(|&&s| s).count();
            let n_remaining = retained - kept.len();
            if n_remaining > target {
                continue;
            }

            let (support, ranking) = if n_remaining == target {
                (
                    history.support(round).to_owned(),
                    history.ranking(round).to_owned(),
                )
            } else {
                debug!(
                    round,
                    n_remaining, target, "schedule overshot target, rolling back one round"
                );
                self.partial_eliminate(x, y, &history, round - 1, &kept, target)?
            };

            let features: Vec<usize> = support
                .iter()
                .enumerate()
                .filter(|(_, &s)| s)
                .map(|(f, _)| f)
                .collect();
            let mut estimator = self.estimator.fresh();
            estimator.fit(&select_columns(x, &features), y)?;

            self.fitted = Some(FittedState {
                n_features: features.len(),
                support,
                ranking,
                estimator,
            });
            return Ok(());
        }

        // Round 0 retains everything, so the scan above always lands
        Err(RfeError::ValidationError(
            "elimination history contains no landing round".to_string(),
        ))
    }

    /// Roll back to `round` and eliminate just enough features to land on
    /// `target`, ranking them with a fresh fit on that round's subset.
    fn partial_eliminate(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        history: &crate::selection::elimination::EliminationHistory,
        round: usize,
        kept: &[usize],
        target: usize,
    ) -> Result<(Array1<bool>, Array1<u32>)> {
        let mut support = history.support(round).to_owned();
        let mut ranking = history.ranking(round).to_owned();

        let features: Vec<usize> = support
            .iter()
            .enumerate()
            .filter(|(_, &s)| s)
            .map(|(f, _)| f)
            .collect();
        let remaining: Vec<usize> = features
            .iter()
            .copied()
            .filter(|f| kept.binary_search(f).is_err())
            .collect();

        let mut estimator = self.estimator.fresh();
        estimator.fit(&select_columns(x, &features), y)?;
        let order = rank_eliminable(estimator.as_ref(), &features, &remaining)?;

        let step = remaining.len() - target;
        for &k in &order[..step] {
            support[remaining[k]] = false;
        }
        for f in 0..support.len() {
            if !support[f] {
                ranking[f] += 1;
            }
        }
        Ok((support, ranking))
    }

    fn fitted(&self) -> Result<&FittedState> {
        self.fitted
            .as_ref()
            .ok_or_else(|| RfeError::NotFitted("Rfe".to_string()))
    }

    /// Final support mask
    pub fn support(&self) -> Result<&Array1<bool>> {
        Ok(&self.fitted()?.support)
    }

    /// Final ranking vector, rank 1 = retained
    pub fn ranking(&self) -> Result<&Array1<u32>> {
        Ok(&self.fitted()?.ranking)
    }

    /// Number of retained features, kept features included
    pub fn n_features(&self) -> Result<usize> {
        Ok(self.fitted()?.n_features)
    }

    /// The estimator refit on the final subset
    pub fn estimator(&self) -> Result<&dyn Estimator> {
        Ok(self.fitted()?.estimator.as_ref())
    }

    /// Whether the refit estimator provides a capability
    pub fn supports(&self, capability: Capability) -> Result<bool> {
        Ok(self.fitted()?.estimator.supports(capability))
    }

    /// Reduce `x` to the selected features
    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let fitted = self.fitted()?;
        if x.ncols() != fitted.support.len() {
            return Err(RfeError::ShapeError(format!(
                "X has {} features but selector was fit on {}",
                x.ncols(),
                fitted.support.len()
            )));
        }
        let columns: Vec<usize> = fitted
            .support
            .iter()
            .enumerate()
            .filter(|(_, &s)| s)
            .map(|(f, _)| f)
            .collect();
        Ok(select_columns(x, &columns))
    }

    /// Reduce `x` to the selected features, then predict
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.fitted()?.estimator.predict(&self.transform(x)?)
    }

    /// Reduce `x` to the selected features, then score
    pub fn score(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<f64> {
        self.fitted()?.estimator.score(&self.transform(x)?, y)
    }

    /// Reduce `x` to the selected features, then compute the decision function
    pub fn decision_function(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.fitted()?
            .estimator
            .decision_function(&self.transform(x)?)
    }

    /// Reduce `x` to the selected features, then predict class probabilities
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.fitted()?.estimator.predict_proba(&self.transform(x)?)
    }

    /// Reduce `x` to the selected features, then predict log-probabilities
    pub fn predict_log_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.fitted()?
            .estimator
            .predict_log_proba(&self.transform(x)?)
    }
}
