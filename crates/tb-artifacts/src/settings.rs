//! Storage settings read from the environment at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tb_types::{config_error, TbResult};

use crate::destination::Destination;
use crate::store::AwsCliStore;

pub const REGION_VAR: &str = "AWS_REGION";
pub const BUCKET_VAR: &str = "BUCKET";
pub const PREFIX_VAR: &str = "S3_PREFIX";
pub const PROJECT_VAR: &str = "PROJECT";
pub const SCRATCH_VAR: &str = "TB_SCRATCH_DIR";

pub const DEFAULT_PROJECT: &str = "trialbench";

/// Where artifacts go, as configured by the environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageSettings {
    pub region: Option<String>,
    pub bucket: Option<String>,
    pub prefix: Option<String>,
    pub project: String,
    /// Parent directory for per-run scratch directories (system temp if unset).
    pub scratch_root: Option<PathBuf>,
}

impl StorageSettings {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build settings from an arbitrary variable lookup. Blank values count
    /// as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        Self {
            region: get(REGION_VAR),
            bucket: get(BUCKET_VAR),
            prefix: get(PREFIX_VAR),
            project: get(PROJECT_VAR).unwrap_or_else(|| DEFAULT_PROJECT.to_string()),
            scratch_root: get(SCRATCH_VAR).map(PathBuf::from),
        }
    }

    /// Object store for remote publication. Region and bucket are required.
    pub fn remote_store(&self) -> TbResult<AwsCliStore> {
        let region = self
            .region
            .as_deref()
            .ok_or_else(|| config_error!("{REGION_VAR} must be set for remote publication"))?;
        let bucket = self
            .bucket
            .as_deref()
            .ok_or_else(|| config_error!("{BUCKET_VAR} must be set for remote publication"))?;
        Ok(AwsCliStore::new(bucket, region))
    }

    /// Remote destination for `out` under the configured prefix.
    pub fn remote_destination(&self, out: &str) -> Destination {
        Destination::remote(out, self.prefix.as_deref())
    }

    /// Local destination for `out` relative to `base_dir`.
    pub fn local_destination(&self, base_dir: &Path, out: &str) -> Destination {
        Destination::local_under(base_dir, out)
    }

    /// Resolve `out` once, before any work is done. Remote resolution fails
    /// when the object store is not configured.
    pub fn resolve(&self, out: &str, upload: bool, base_dir: &Path) -> TbResult<Destination> {
        if upload {
            self.remote_store()?;
            Ok(self.remote_destination(out))
        } else {
            Ok(self.local_destination(base_dir, out))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn reads_all_variables() {
        let settings = StorageSettings::from_lookup(lookup(&[
            ("AWS_REGION", "eu-west-2"),
            ("BUCKET", "experiments"),
            ("S3_PREFIX", "mini-project2"),
            ("PROJECT", "hpo"),
            ("TB_SCRATCH_DIR", "/var/tmp/tb"),
        ]));
        assert_eq!(settings.region.as_deref(), Some("eu-west-2"));
        assert_eq!(settings.project, "hpo");
        assert_eq!(settings.scratch_root, Some(PathBuf::from("/var/tmp/tb")));

        let store = settings.remote_store().unwrap();
        assert_eq!(store.bucket(), "experiments");
        assert_eq!(
            settings.remote_destination("metrics/hpo_summary.json"),
            Destination::Remote {
                key: "mini-project2/metrics/hpo_summary.json".into()
            }
        );
    }

    #[test]
    fn defaults_when_unset() {
        let settings = StorageSettings::from_lookup(lookup(&[("PROJECT", "  ")]));
        assert_eq!(settings.project, DEFAULT_PROJECT);
        assert!(settings.prefix.is_none());
        assert!(settings.scratch_root.is_none());
    }

    #[test]
    fn remote_store_requires_bucket_and_region() {
        let missing_bucket = StorageSettings::from_lookup(lookup(&[("AWS_REGION", "us-east-1")]));
        let err = missing_bucket.remote_store().unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("BUCKET"));

        let missing_region = StorageSettings::from_lookup(lookup(&[("BUCKET", "b")]));
        assert!(missing_region.remote_store().unwrap_err().to_string().contains("AWS_REGION"));
    }

    #[test]
    fn local_destination_ignores_prefix() {
        let settings = StorageSettings::from_lookup(lookup(&[("S3_PREFIX", "exp")]));
        let dest = settings.local_destination(Path::new("/work"), "metrics/a.json");
        assert_eq!(dest, Destination::local("/work/metrics/a.json"));
    }

    #[test]
    fn resolve_checks_remote_configuration_up_front() {
        let unset = StorageSettings::from_lookup(lookup(&[]));
        assert!(unset.resolve("a.json", true, Path::new("/work")).is_err());
        assert_eq!(
            unset.resolve("a.json", false, Path::new("/work")).unwrap(),
            Destination::local("/work/a.json")
        );

        let configured = StorageSettings::from_lookup(lookup(&[
            ("AWS_REGION", "us-east-1"),
            ("BUCKET", "b"),
            ("S3_PREFIX", "exp/"),
        ]));
        let dest = configured.resolve("/a.json", true, Path::new("/work")).unwrap();
        assert_eq!(dest, Destination::Remote { key: "exp/a.json".into() });
    }
}
