//! Final locations for published payloads.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::store::ObjectStore;

/// Where a payload ends up. Resolved once at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Destination {
    /// A path on the local filesystem.
    Local { path: PathBuf },
    /// A key in the configured object store, prefix already applied.
    Remote { key: String },
}

impl Destination {
    pub fn local(path: impl Into<PathBuf>) -> Self {
        Self::Local { path: path.into() }
    }

    /// Remote destination for `key` under an optional `prefix`.
    pub fn remote(key: &str, prefix: Option<&str>) -> Self {
        Self::Remote {
            key: join_key(prefix, key),
        }
    }

    /// Local destination for `relative` under `base_dir`.
    pub fn local_under(base_dir: &Path, relative: &str) -> Self {
        Self::local(base_dir.join(relative.trim_start_matches('/')))
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote { .. })
    }

    /// User-facing location: the local path, or the store's URI for the key.
    pub fn display_uri(&self, store: Option<&dyn ObjectStore>) -> String {
        match (self, store) {
            (Self::Local { path }, _) => path.display().to_string(),
            (Self::Remote { key }, Some(store)) => store.uri(key),
            (Self::Remote { .. }, None) => self.to_string(),
        }
    }
}

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local { path } => write!(f, "{}", path.display()),
            Self::Remote { key } => write!(f, "remote:{key}"),
        }
    }
}

/// `prefix/key` with redundant slashes removed. A blank prefix is ignored.
pub fn join_key(prefix: Option<&str>, key: &str) -> String {
    let key = key.trim_start_matches('/');
    match prefix.map(|p| p.trim_matches('/')).filter(|p| !p.is_empty()) {
        Some(prefix) => format!("{prefix}/{key}"),
        None => key.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_key_handles_slashes() {
        assert_eq!(join_key(Some("mini-project2"), "metrics/a.json"), "mini-project2/metrics/a.json");
        assert_eq!(join_key(Some("/nested/prefix/"), "/a.json"), "nested/prefix/a.json");
        assert_eq!(join_key(None, "/a.json"), "a.json");
        assert_eq!(join_key(Some(""), "a.json"), "a.json");
        assert_eq!(join_key(Some("/"), "a.json"), "a.json");
    }

    #[test]
    fn local_under_joins_relative_path() {
        let dest = Destination::local_under(Path::new("/work"), "/metrics/hpo_summary.json");
        assert_eq!(dest, Destination::local("/work/metrics/hpo_summary.json"));
        assert!(!dest.is_remote());
    }

    #[test]
    fn remote_applies_prefix() {
        let dest = Destination::remote("metrics/hpo_summary.json", Some("exp"));
        assert_eq!(
            dest,
            Destination::Remote {
                key: "exp/metrics/hpo_summary.json".into()
            }
        );
        assert_eq!(dest.to_string(), "remote:exp/metrics/hpo_summary.json");
    }

    #[test]
    fn display_uri_uses_store() {
        let store = crate::store::AwsCliStore::new("bucket", "us-east-1");
        let dest = Destination::remote("a.json", Some("exp"));
        assert_eq!(dest.display_uri(Some(&store)), "s3://bucket/exp/a.json");
        assert_eq!(dest.display_uri(None), "remote:exp/a.json");
        assert_eq!(Destination::local("/tmp/a.json").display_uri(Some(&store)), "/tmp/a.json");
    }
}
