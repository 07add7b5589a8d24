//! Durable object-store backends.

use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::process::Command;

use thiserror::Error;

/// Errors surfaced by object-store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("`{program}` exited with {status}: {stderr}")]
    CommandFailed {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("invalid object key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },
}

/// A durable store that accepts whole files under string keys.
///
/// `put` must either store the complete file or fail; a failed `put` leaves
/// nothing under `key`.
pub trait ObjectStore: Send + Sync {
    fn put(&self, local_path: &Path, key: &str) -> Result<(), StoreError>;

    /// Human-readable location of `key` (e.g. `s3://bucket/key`).
    fn uri(&self, key: &str) -> String;

    /// Backend type name.
    fn backend_type(&self) -> &'static str;
}

// =============================================================================
// AWS CLI backend
// =============================================================================

/// Uploads with `aws s3 cp`, one process per object.
#[derive(Debug, Clone)]
pub struct AwsCliStore {
    bucket: String,
    region: String,
    program: String,
}

impl AwsCliStore {
    pub fn new(bucket: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            region: region.into(),
            program: "aws".to_string(),
        }
    }

    /// Override the executable (a wrapper script, or a stub in tests).
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn region(&self) -> &str {
        &self.region
    }
}

impl ObjectStore for AwsCliStore {
    fn put(&self, local_path: &Path, key: &str) -> Result<(), StoreError> {
        let uri = self.uri(key);
        tracing::debug!("Running {} s3 cp {} {}", self.program, local_path.display(), uri);

        let output = Command::new(&self.program)
            .arg("s3")
            .arg("cp")
            .arg(local_path)
            .arg(&uri)
            .arg("--region")
            .arg(&self.region)
            .arg("--only-show-errors")
            .output()?;

        if !output.status.success() {
            return Err(StoreError::CommandFailed {
                program: self.program.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }

    fn uri(&self, key: &str) -> String {
        format!("s3://{}/{}", self.bucket, key)
    }

    fn backend_type(&self) -> &'static str {
        "s3"
    }
}

// =============================================================================
// Directory backend
// =============================================================================

/// Stores objects as files under a root directory.
///
/// Each object is written to a temporary sibling and renamed into place, so
/// readers never see a partial object.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Filesystem path that backs `key`.
    pub fn object_path(&self, key: &str) -> Result<PathBuf, StoreError> {
        let relative = Path::new(key);
        let clean = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if key.is_empty() || !clean {
            return Err(StoreError::InvalidKey {
                key: key.to_string(),
                reason: "keys must be relative paths without '.' or '..' segments".to_string(),
            });
        }
        Ok(self.root.join(relative))
    }
}

impl ObjectStore for DirectoryStore {
    fn put(&self, local_path: &Path, key: &str) -> Result<(), StoreError> {
        let target = self.object_path(key)?;
        let parent = target.parent().unwrap_or(&self.root);
        std::fs::create_dir_all(parent)?;

        let mut source = std::fs::File::open(local_path)?;
        let mut staged = tempfile::NamedTempFile::new_in(parent)?;
        std::io::copy(&mut source, &mut staged)?;
        staged.flush()?;
        staged.as_file().sync_all()?;
        staged.persist(&target).map_err(|e| StoreError::Io(e.error))?;
        Ok(())
    }

    fn uri(&self, key: &str) -> String {
        format!("file://{}", self.root.join(key).display())
    }

    fn backend_type(&self) -> &'static str {
        "directory"
    }
}
