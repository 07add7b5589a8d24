// TrialBench engine
// Reference trainer and scorers for the search loop, plus shared CLI plumbing.

pub mod gbdt;
pub mod metrics;

pub use gbdt::{default_space, GbdtError, GbdtModel, GbdtParams, GbdtTrainer};
pub use metrics::{
    accuracy, f1_score, log_loss, roc_auc, AccuracyScorer, F1Scorer, MetricError, NegLogLossScorer, RocAucScorer,
};

use std::path::Path;

use tb_artifacts::{ArtifactStager, StorageSettings};
use tb_data::{CsvDatasetLoader, Dataset, SyntheticClassification};
use tb_types::TbResult;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. `RUST_LOG` overrides the default `info` level.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // a subscriber may already be installed (tests, embedding)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// Labelled data for a run: a CSV file when given, otherwise the built-in
/// synthetic problem.
pub fn load_dataset(csv: Option<&Path>, target: &str) -> TbResult<Dataset> {
    match csv {
        Some(path) => CsvDatasetLoader::new(target).load(path),
        None => {
            tracing::info!("No dataset given, generating the synthetic classification problem");
            SyntheticClassification::default().generate()
        }
    }
}

/// Scratch staging for one run, under `TB_SCRATCH_DIR` when set. The object
/// store is attached only when something is published remotely.
pub fn open_stager(storage: &StorageSettings, remote: bool) -> TbResult<ArtifactStager> {
    let stager = match &storage.scratch_root {
        Some(root) => ArtifactStager::in_dir(root)?,
        None => ArtifactStager::new()?,
    };
    if remote {
        Ok(stager.with_store(Box::new(storage.remote_store()?)))
    } else {
        Ok(stager)
    }
}
