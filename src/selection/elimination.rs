//! Recursive elimination engine
//!
//! Runs the elimination loop for one fit: clone the estimator template, fit
//! it on the currently retained features, rank the eliminable ones by
//! importance and drop the lowest-scoring block. The full history of
//! support masks and rankings is recorded so that any intermediate round
//! can be re-derived exactly, which the selection logic and the
//! cross-validated tuner both rely on.

use crate::error::{Result, RfeError};
use crate::estimator::Estimator;
use crate::selection::schedule::StepSchedule;
use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Per-round step-score hook.
///
/// Invoked once per round with the estimator fit on the round's feature
/// subset, before elimination. The cross-validated tuner uses this to score
/// every intermediate subset against a held-out partition without paying
/// the fit cost twice.
pub type StepScoreFn<'a> = &'a mut dyn FnMut(&dyn Estimator, &[usize]) -> Result<f64>;

/// Complete history of one elimination run.
///
/// Row 0 is the initial state with every feature retained; row `r` is the
/// state after `r` elimination rounds. The arena is pre-sized from the
/// schedule, so no row is ever resized or reordered after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EliminationHistory {
    pub(crate) supports: Array2<bool>,
    pub(crate) rankings: Array2<u32>,
    pub(crate) n_remaining: Vec<usize>,
    pub(crate) scores: Vec<f64>,
}

impl EliminationHistory {
    /// Number of elimination rounds (rows minus the initial state)
    pub fn n_rounds(&self) -> usize {
        self.supports.nrows() - 1
    }

    /// Total feature count, kept features included
    pub fn n_features(&self) -> usize {
        self.supports.ncols()
    }

    /// Support mask after `round` rounds
    pub fn support(&self, round: usize) -> ArrayView1<'_, bool> {
        self.supports.row(round)
    }

    /// Ranking vector after `round` rounds
    pub fn ranking(&self, round: usize) -> ArrayView1<'_, u32> {
        self.rankings.row(round)
    }

    /// Remaining eliminable feature count per round, starting with the
    /// initial count
    pub fn n_remaining(&self) -> &[usize] {
        &self.n_remaining
    }

    /// Step scores recorded by the hook, one per entry of `n_remaining`;
    /// empty when no hook was supplied
    pub fn scores(&self) -> &[f64] {
        &self.scores
    }
}

/// Reduce a matrix to the column subset `columns`, preserving their order.
pub(crate) fn select_columns(x: &Array2<f64>, columns: &[usize]) -> Array2<f64> {
    x.select(Axis(1), columns)
}

/// Sorted union of two sorted, disjoint index sets.
fn union_sorted(a: &[usize], b: &[usize]) -> Vec<usize> {
    let mut out = Vec::with_capacity(a.len() + b.len());
    out.extend_from_slice(a);
    out.extend_from_slice(b);
    out.sort_unstable();
    out
}

/// Ascending-importance order of the eliminable subset.
///
/// `features` is the sorted subset the estimator was fit on; the returned
/// indices are positions into `remaining`, lowest importance first.
pub(crate) fn rank_eliminable(
    estimator: &dyn Estimator,
    features: &[usize],
    remaining: &[usize],
) -> Result<Vec<usize>> {
    let signal = estimator.importance().ok_or_else(|| {
        RfeError::UnsupportedEstimator(
            "estimator exposes neither coefficients nor feature importances".to_string(),
        )
    })?;
    let scores = signal.reduce(features.len())?;

    // Positions of eliminable features within the fitted subset; kept
    // features never enter the ranking
    let eliminable_positions: Vec<usize> = features
        .iter()
        .enumerate()
        .filter(|(_, f)| remaining.binary_search(f).is_ok())
        .map(|(pos, _)| pos)
        .collect();
    debug_assert_eq!(eliminable_positions.len(), remaining.len());

    let importances: Vec<f64> = eliminable_positions.iter().map(|&p| scores[p]).collect();
    let mut order: Vec<usize> = (0..remaining.len()).collect();
    order.sort_by(|&a, &b| {
        importances[a]
            .partial_cmp(&importances[b])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    Ok(order)
}

/// Run the elimination loop over `schedule`, producing the full history.
///
/// `kept_features` must be sorted and disjoint from the eliminable set; its
/// entries stay retained in every round. The estimator template is cloned
/// before every fit and never mutated. When `step_score` is supplied, the
/// final subset gets one extra fit so the score sequence covers every entry
/// of the remaining-count trace.
pub fn run_elimination(
    template: &dyn Estimator,
    x: &Array2<f64>,
    y: &Array1<f64>,
    schedule: &StepSchedule,
    kept_features: &[usize],
    mut step_score: Option<StepScoreFn<'_>>,
) -> Result<EliminationHistory> {
    let n_features = x.ncols();
    let n_rounds = schedule.n_rounds();

    let mut supports = Array2::from_elem((n_rounds + 1, n_features), true);
    let mut rankings = Array2::from_elem((n_rounds + 1, n_features), 1u32);
    let mut scores = Vec::with_capacity(if step_score.is_some() { n_rounds + 1 } else { 0 });

    let mut remaining: Vec<usize> = (0..n_features)
        .filter(|i| kept_features.binary_search(i).is_err())
        .collect();

    for (round, &step) in schedule.steps().iter().enumerate() {
        let row = round + 1;
        let features = union_sorted(&remaining, kept_features);
        debug!(
            round = row,
            n_features = features.len(),
            step,
            "fitting estimator for elimination round"
        );

        let mut estimator = template.fresh();
        estimator.fit(&select_columns(x, &features), y)?;

        let order = rank_eliminable(estimator.as_ref(), &features, &remaining)?;

        if let Some(hook) = step_score.as_mut() {
            scores.push(hook(estimator.as_ref(), &features)?);
        }

        // Drop the lowest-scoring block of this round's size
        let eliminated: Vec<usize> = order[..step].iter().map(|&k| remaining[k]).collect();
        let mut survivors: Vec<usize> = order[step..].iter().map(|&k| remaining[k]).collect();
        survivors.sort_unstable();

        for f in 0..n_features {
            supports[[row, f]] = supports[[row - 1, f]];
            rankings[[row, f]] = rankings[[row - 1, f]];
        }
        for &f in &eliminated {
            supports[[row, f]] = false;
        }
        for f in 0..n_features {
            if !supports[[row, f]] {
                rankings[[row, f]] += 1;
            }
        }

        remaining = survivors;
    }

    // Score the final subset so the curve is complete
    if let Some(hook) = step_score.as_mut() {
        let features = union_sorted(&remaining, kept_features);
        let mut estimator = template.fresh();
        estimator.fit(&select_columns(x, &features), y)?;
        scores.push(hook(estimator.as_ref(), &features)?);
    }

    Ok(EliminationHistory {
        supports,
        rankings,
        n_remaining: schedule.n_remaining().to_vec(),
        scores,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimator::{Estimator, ImportanceSignal};
    use crate::selection::schedule::{StepConfig, StepSchedule};
    use ndarray::Array2;

    /// Test estimator whose importance for each fitted column is that
    /// column's mean, making the elimination order fully predictable.
    struct ColumnMeanEstimator {
        means: Option<Array1<f64>>,
    }

    impl ColumnMeanEstimator {
        fn new() -> Self {
            Self { means: None }
        }
    }

    impl Estimator for ColumnMeanEstimator {
        fn fresh(&self) -> Box<dyn Estimator> {
            Box::new(Self { means: None })
        }

        fn fit(&mut self, x: &Array2<f64>, _y: &Array1<f64>) -> Result<()> {
            self.means = Some(x.mean_axis(Axis(0)).expect("non-empty"));
            Ok(())
        }

        fn importance(&self) -> Option<ImportanceSignal> {
            self.means.clone().map(ImportanceSignal::Importances)
        }

        fn cache_token(&self) -> String {
            "ColumnMeanEstimator".to_string()
        }
    }

    /// Columns with means 1..=n so feature 0 is always least important.
    fn graded_data(n_samples: usize, n_features: usize) -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((n_samples, n_features), |(_, j)| (j + 1) as f64);
        let y = Array1::zeros(n_samples);
        (x, y)
    }

    #[test]
    fn test_history_invariants() {
        let (x, y) = graded_data(4, 8);
        let schedule = StepSchedule::build(8, 1, &StepConfig::default()).unwrap();
        let history =
            run_elimination(&ColumnMeanEstimator::new(), &x, &y, &schedule, &[], None).unwrap();

        assert_eq!(history.n_rounds(), 7);
        let mut previous_retained = usize::MAX;
        for round in 0..=history.n_rounds() {
            let support = history.support(round);
            let ranking = history.ranking(round);
            let retained = support.iter().filter(|&&s| s).count();
            // Monotonically non-increasing retention
            assert!(retained <= previous_retained);
            previous_retained = retained;
            // rank 1 exactly for retained features
            for (s, &r) in support.iter().zip(ranking.iter()) {
                assert_eq!(*s, r == 1);
            }
        }
    }

    #[test]
    fn test_lowest_importance_eliminated_first() {
        let (x, y) = graded_data(4, 5);
        let schedule = StepSchedule::build(5, 1, &StepConfig::default()).unwrap();
        let history =
            run_elimination(&ColumnMeanEstimator::new(), &x, &y, &schedule, &[], None).unwrap();

        // Feature 0 has the smallest mean and goes first; its rank grows by
        // one for every round it stays eliminated
        let final_ranking = history.ranking(history.n_rounds());
        assert_eq!(final_ranking[0], 5);
        assert_eq!(final_ranking[1], 4);
        assert_eq!(final_ranking[2], 3);
        assert_eq!(final_ranking[3], 2);
        assert_eq!(final_ranking[4], 1);
    }

    #[test]
    fn test_kept_features_never_eliminated() {
        let (x, y) = graded_data(4, 6);
        // Feature 0 has the lowest mean yet must survive as a kept feature
        let kept = vec![0];
        let schedule = StepSchedule::build(5, 1, &StepConfig::default()).unwrap();
        let history =
            run_elimination(&ColumnMeanEstimator::new(), &x, &y, &schedule, &kept, None).unwrap();

        for round in 0..=history.n_rounds() {
            assert!(history.support(round)[0]);
            assert_eq!(history.ranking(round)[0], 1);
        }
        // All eliminable features but one are gone at the end
        let final_retained = history
            .support(history.n_rounds())
            .iter()
            .filter(|&&s| s)
            .count();
        assert_eq!(final_retained, 2); // kept + 1 survivor
    }

    #[test]
    fn test_step_score_covers_every_count() {
        let (x, y) = graded_data(4, 6);
        let schedule = StepSchedule::build(6, 1, &StepConfig::default()).unwrap();
        let mut seen_widths = Vec::new();
        let mut hook = |_: &dyn Estimator, features: &[usize]| -> Result<f64> {
            seen_widths.push(features.len());
            Ok(features.len() as f64)
        };
        let history = run_elimination(
            &ColumnMeanEstimator::new(),
            &x,
            &y,
            &schedule,
            &[],
            Some(&mut hook),
        )
        .unwrap();

        assert_eq!(history.scores().len(), history.n_remaining().len());
        assert_eq!(seen_widths, vec![6, 5, 4, 3, 2, 1]);
    }

    #[test]
    fn test_unsupported_estimator_error() {
        struct NoSignal;
        impl Estimator for NoSignal {
            fn fresh(&self) -> Box<dyn Estimator> {
                Box::new(NoSignal)
            }
            fn fit(&mut self, _x: &Array2<f64>, _y: &Array1<f64>) -> Result<()> {
                Ok(())
            }
            fn importance(&self) -> Option<ImportanceSignal> {
                None
            }
            fn cache_token(&self) -> String {
                "NoSignal".to_string()
            }
        }

        let (x, y) = graded_data(3, 4);
        let schedule = StepSchedule::build(4, 1, &StepConfig::default()).unwrap();
        let err = run_elimination(&NoSignal, &x, &y, &schedule, &[], None).unwrap_err();
        assert!(matches!(err, RfeError::UnsupportedEstimator(_)));
    }
}
