use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::Utc;
use tempfile::TempDir;

use tb_artifacts::{ArtifactStager, Destination, DirectoryStore, ObjectStore, Payload, StoreError};
use tb_types::{BestTrial, Configuration, PublicationError, RunSettings, RunSummary, TbError, TrialRecord};

/// Directory-backed store whose Nth `put` fails before writing anything.
struct FlakyStore {
    inner: DirectoryStore,
    fail_on: usize,
    calls: AtomicUsize,
}

impl FlakyStore {
    fn new(root: &Path, fail_on: usize) -> Self {
        Self {
            inner: DirectoryStore::new(root),
            fail_on,
            calls: AtomicUsize::new(0),
        }
    }
}

impl ObjectStore for FlakyStore {
    fn put(&self, local_path: &Path, key: &str) -> Result<(), StoreError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.fail_on {
            return Err(StoreError::CommandFailed {
                program: "flaky".into(),
                status: "exit status: 1".into(),
                stderr: "connection reset".into(),
            });
        }
        self.inner.put(local_path, key)
    }

    fn uri(&self, key: &str) -> String {
        self.inner.uri(key)
    }

    fn backend_type(&self) -> &'static str {
        "flaky"
    }
}

fn sample_summary() -> RunSummary {
    let settings = RunSettings::new("trialbench", 42, 1);
    let params = Configuration::new().with("x", 3);
    let record = TrialRecord {
        trial: 1,
        metric: 0.91,
        params,
    };
    let best = BestTrial::from(&record);
    RunSummary::new(&settings, "roc_auc", Utc::now(), vec![record], Some(best))
}

#[test]
fn second_remote_failure_keeps_first_and_cleans_scratch() {
    let bucket = TempDir::new().unwrap();
    let stager = ArtifactStager::new()
        .unwrap()
        .with_store(Box::new(FlakyStore::new(bucket.path(), 2)));
    let scratch = stager.scratch_path().to_path_buf();

    let summary = Payload::json("summary", &sample_summary()).unwrap();
    let expected = summary.contents().to_vec();

    let err = stager
        .publish(vec![
            (summary, Destination::remote("metrics/hpo_summary.json", Some("exp"))),
            (Payload::bytes("model", vec![7; 64]), Destination::remote("artifacts/model.json", Some("exp"))),
        ])
        .unwrap_err();

    match err {
        TbError::Publication(PublicationError::Remote { payload, uri, .. }) => {
            assert_eq!(payload, "model");
            assert!(uri.ends_with("exp/artifacts/model.json"));
        }
        other => panic!("expected remote publication error, got {other:?}"),
    }

    let first = std::fs::read(bucket.path().join("exp/metrics/hpo_summary.json")).unwrap();
    assert_eq!(first, expected);
    assert!(!bucket.path().join("exp/artifacts/model.json").exists());
    assert!(!scratch.exists());
}

#[test]
fn failed_local_rename_leaves_nothing_at_target() {
    let out = TempDir::new().unwrap();
    // an existing non-empty directory cannot be replaced by a file
    let target = out.path().join("hpo_summary.json");
    std::fs::create_dir_all(target.join("occupied")).unwrap();

    let stager = ArtifactStager::new().unwrap();
    let scratch = stager.scratch_path().to_path_buf();

    let err = stager
        .publish(vec![(Payload::bytes("summary", b"{\"partial\":".to_vec()), Destination::local(&target))])
        .unwrap_err();

    assert!(matches!(
        err,
        TbError::Publication(PublicationError::LocalRename { .. })
    ));
    assert!(target.is_dir());
    assert!(!target.is_file());
    assert_eq!(std::fs::read_dir(out.path()).unwrap().count(), 1);
    assert!(!scratch.exists());
}

#[test]
fn local_publication_creates_parents() {
    let out = TempDir::new().unwrap();
    let scratch_root = TempDir::new().unwrap();
    let stager = ArtifactStager::in_dir(scratch_root.path().join("nested")).unwrap();
    let scratch = stager.scratch_path().to_path_buf();

    let summary = sample_summary();
    let model_path = out.path().join("artifacts/model.json");
    let metrics_path = out.path().join("metrics/deep/hpo_summary.json");

    let published = stager
        .publish(vec![
            (Payload::bytes("model", b"{\"trees\":[]}".to_vec()), Destination::local(&model_path)),
            (Payload::json("summary", &summary).unwrap(), Destination::local(&metrics_path)),
        ])
        .unwrap();

    assert_eq!(published.len(), 2);
    assert_eq!(published[0].payload, "model");
    let decoded: RunSummary = serde_json::from_slice(&std::fs::read(&metrics_path).unwrap()).unwrap();
    assert_eq!(decoded, summary);
    assert!(model_path.is_file());
    assert!(!scratch.exists());
}
