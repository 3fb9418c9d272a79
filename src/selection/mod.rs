//! Recursive feature elimination
//!
//! The elimination pipeline, leaves first: the step [`schedule`] decides
//! how many features each round removes, the [`elimination`] engine runs
//! the rounds and records the full support/ranking history, [`rfe`] lands
//! on a requested feature count and [`tuner`] picks that count by
//! cross-validation.

pub mod elimination;
pub mod rfe;
pub mod schedule;
pub mod tuner;

pub use elimination::{run_elimination, EliminationHistory, StepScoreFn};
pub use rfe::Rfe;
pub use schedule::{StepConfig, StepSchedule, StepSize};
pub use tuner::RfeTuner;
