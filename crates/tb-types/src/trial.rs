//! Trial records and the run summary that gets published.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::search::Configuration;

/// Unique search run identifier.
pub type RunId = Uuid;

/// Outcome of one trial. Field names are part of the published layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    /// 1-based trial index.
    pub trial: u32,
    pub metric: f64,
    pub params: Configuration,
}

/// The best trial observed so far.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestTrial {
    pub metric: f64,
    pub params: Configuration,
    pub trial: u32,
}

impl From<&TrialRecord> for BestTrial {
    fn from(record: &TrialRecord) -> Self {
        Self {
            metric: record.metric,
            params: record.params.clone(),
            trial: record.trial,
        }
    }
}

/// Run-level knobs recorded alongside the results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSettings {
    pub project: String,
    pub seed: u64,
    /// Number of trials the driver will run.
    pub trial_count: u32,
    /// Intra-trial parallelism hint forwarded to the trainer.
    pub n_jobs: usize,
    /// Recorded for downstream consumers; trials always run sequentially.
    pub concurrency: usize,
    /// Fraction of rows held out for validation.
    pub validation_fraction: f64,
}

impl RunSettings {
    pub fn new(project: impl Into<String>, seed: u64, trial_count: u32) -> Self {
        Self {
            project: project.into(),
            seed,
            trial_count,
            n_jobs: 1,
            concurrency: 1,
            validation_fraction: 0.2,
        }
    }

    pub fn with_n_jobs(mut self, n: usize) -> Self {
        self.n_jobs = n;
        self
    }

    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.concurrency = n;
        self
    }

    pub fn with_validation_fraction(mut self, fraction: f64) -> Self {
        self.validation_fraction = fraction;
        self
    }
}

/// Everything a finished run publishes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: RunId,
    pub project: String,
    pub seed: u64,
    pub n_jobs: usize,
    pub concurrency: usize,
    pub trial_count: u32,
    pub validation_fraction: f64,
    /// Name of the metric the scorer produces (e.g. "roc_auc").
    pub metric_name: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub trials: Vec<TrialRecord>,
    /// `null` when no trial ran.
    pub best: Option<BestTrial>,
}

impl RunSummary {
    pub fn new(
        settings: &RunSettings,
        metric_name: impl Into<String>,
        started_at: DateTime<Utc>,
        trials: Vec<TrialRecord>,
        best: Option<BestTrial>,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            project: settings.project.clone(),
            seed: settings.seed,
            n_jobs: settings.n_jobs,
            concurrency: settings.concurrency,
            trial_count: settings.trial_count,
            validation_fraction: settings.validation_fraction,
            metric_name: metric_name.into(),
            started_at,
            finished_at: Utc::now(),
            trials,
            best,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(trial: u32, metric: f64) -> TrialRecord {
        TrialRecord {
            trial,
            metric,
            params: Configuration::new().with("x", trial as i64),
        }
    }

    #[test]
    fn summary_layout_has_required_fields() {
        let settings = RunSettings::new("demo", 42, 2);
        let trials = vec![record(1, 0.7), record(2, 0.9)];
        let best = Some(BestTrial::from(&trials[1]));
        let summary = RunSummary::new(&settings, "roc_auc", Utc::now(), trials, best);

        let value = serde_json::to_value(&summary).unwrap();
        assert_eq!(value["seed"], 42);
        assert_eq!(value["trials"][0]["trial"], 1);
        assert_eq!(value["trials"][1]["params"]["x"], 2);
        assert_eq!(value["best"]["trial"], 2);
        assert_eq!(value["best"]["metric"], 0.9);
        assert_eq!(value["metric_name"], "roc_auc");
    }

    #[test]
    fn empty_best_serializes_as_null() {
        let settings = RunSettings::new("demo", 7, 0);
        let summary = RunSummary::new(&settings, "roc_auc", Utc::now(), Vec::new(), None);
        let value = serde_json::to_value(&summary).unwrap();
        assert!(value["best"].is_null());
        assert_eq!(value["trials"].as_array().map(|a| a.len()), Some(0));
    }

    #[test]
    fn summary_round_trips() {
        let settings = RunSettings::new("demo", 1, 1).with_n_jobs(4);
        let trials = vec![record(1, 0.5)];
        let best = Some(BestTrial::from(&trials[0]));
        let summary = RunSummary::new(&settings, "accuracy", Utc::now(), trials, best);

        let json = serde_json::to_string_pretty(&summary).unwrap();
        let back: RunSummary = serde_json::from_str(&json).unwrap();
        assert_eq!(back, summary);
    }
}
