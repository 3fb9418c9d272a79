//! Memoization of elimination histories
//!
//! The elimination loop is a pure function of the estimator configuration,
//! the data, the step sequence and the kept-feature set, so identical calls
//! can reuse a previously computed history. The adapter here only builds
//! keys and delegates get-or-compute; storage policy belongs to the backend.
//! Verbosity and logging state never enter a key.

use crate::error::Result;
use crate::selection::elimination::EliminationHistory;
use ndarray::{Array1, Array2};
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Content-addressed store for elimination histories.
///
/// Implementations must be safe for concurrent reads, and for concurrent
/// writes when shared across fold tasks; recomputing a value on a key race
/// is acceptable, corrupting stored state is not. Backend I/O failures
/// surface as [`crate::RfeError::CacheError`], never as computation errors.
pub trait FitMemo: Send + Sync {
    /// Return the stored history for `key`, or run `compute` and store the
    /// result
    fn get_or_compute(
        &self,
        key: &str,
        compute: &mut dyn FnMut() -> Result<EliminationHistory>,
    ) -> Result<EliminationHistory>;
}

/// Build the call-signature key for one elimination run.
pub fn elimination_key(
    estimator_token: &str,
    x: &Array2<f64>,
    y: &Array1<f64>,
    steps: &[usize],
    kept_features: &[usize],
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(estimator_token.as_bytes());
    hasher.update((x.nrows() as u64).to_le_bytes());
    hasher.update((x.ncols() as u64).to_le_bytes());
    for v in x.iter() {
        hasher.update(v.to_le_bytes());
    }
    for v in y.iter() {
        hasher.update(v.to_le_bytes());
    }
    // Structured parts get a canonical serialization
    let structure =
        serde_json::to_vec(&(steps, kept_features)).unwrap_or_default();
    hasher.update(&structure);
    format!("{:x}", hasher.finalize())
}

/// Pass-through store: every call computes.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoMemo;

impl FitMemo for NoMemo {
    fn get_or_compute(
        &self,
        _key: &str,
        compute: &mut dyn FnMut() -> Result<EliminationHistory>,
    ) -> Result<EliminationHistory> {
        compute()
    }
}

/// In-process store backed by a read-write locked map.
///
/// Safe to share across parallel fold tasks; a racing miss computes twice
/// and the last write wins, which is harmless because the computation is
/// deterministic.
#[derive(Default)]
pub struct InMemoryMemo {
    entries: RwLock<HashMap<String, EliminationHistory>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl InMemoryMemo {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cache hits served
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Number of cache misses computed
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Number of stored histories
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl FitMemo for InMemoryMemo {
    fn get_or_compute(
        &self,
        key: &str,
        compute: &mut dyn FnMut() -> Result<EliminationHistory>,
    ) -> Result<EliminationHistory> {
        if let Some(history) = self.entries.read().get(key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(history.clone());
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        let history = compute()?;
        self.entries
            .write()
            .insert(key.to_string(), history.clone());
        Ok(history)
    }
}
