//! Best-trial tracking.

use tb_types::{BestTrial, TrialRecord};

/// Keeps the highest-metric trial seen so far.
///
/// A record replaces the current best only when its metric is strictly
/// greater, so on ties the earliest trial wins.
#[derive(Debug, Clone, Default)]
pub struct BestTracker {
    best: Option<BestTrial>,
    observed: usize,
}

impl BestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` when `record` became the new best.
    pub fn observe(&mut self, record: &TrialRecord) -> bool {
        self.observed += 1;
        let improved = match &self.best {
            None => true,
            Some(current) => record.metric > current.metric,
        };
        if improved {
            self.best = Some(BestTrial::from(record));
        }
        improved
    }

    pub fn current_best(&self) -> Option<&BestTrial> {
        self.best.as_ref()
    }

    pub fn observed(&self) -> usize {
        self.observed
    }

    pub fn into_best(self) -> Option<BestTrial> {
        self.best
    }
}
