//! Scratch staging and publication of run artifacts.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tempfile::{Builder, NamedTempFile, TempDir};
use tracing::{info, warn};

use tb_types::{config_error, PublicationError, TbResult};

use crate::destination::Destination;
use crate::store::ObjectStore;

const SCRATCH_PREFIX: &str = "tb-run-";

/// A named blob ready for publication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    name: String,
    contents: Vec<u8>,
}

impl Payload {
    /// Pretty-printed JSON encoding of `value`.
    pub fn json<T: Serialize + ?Sized>(name: impl Into<String>, value: &T) -> Result<Self, PublicationError> {
        let name = name.into();
        match serde_json::to_vec_pretty(value) {
            Ok(contents) => Ok(Self { name, contents }),
            Err(source) => Err(PublicationError::Encode { payload: name, source }),
        }
    }

    /// Raw bytes, published as-is.
    pub fn bytes(name: impl Into<String>, contents: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            contents,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn contents(&self) -> &[u8] {
        &self.contents
    }
}

/// Where a payload ended up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishedArtifact {
    pub payload: String,
    /// Local path or store URI.
    pub location: String,
    pub bytes: u64,
}

/// Owns a per-run scratch directory and publishes payloads out of it.
///
/// Acquire the stager before the trial loop starts: the scratch directory is
/// removed when the stager is consumed by [`publish`](Self::publish) or
/// [`close`](Self::close), or dropped on an error path.
pub struct ArtifactStager {
    scratch: TempDir,
    store: Option<Box<dyn ObjectStore>>,
}

impl ArtifactStager {
    /// Scratch directory under the system temp location.
    pub fn new() -> TbResult<Self> {
        let scratch = Builder::new()
            .prefix(SCRATCH_PREFIX)
            .tempdir()
            .map_err(|source| PublicationError::ScratchAllocation { source })?;
        Ok(Self::from_scratch(scratch))
    }

    /// Scratch directory under `root`, which is created if missing.
    pub fn in_dir(root: impl AsRef<Path>) -> TbResult<Self> {
        let root = root.as_ref();
        let scratch = fs::create_dir_all(root)
            .and_then(|_| Builder::new().prefix(SCRATCH_PREFIX).tempdir_in(root))
            .map_err(|source| PublicationError::ScratchAllocation { source })?;
        Ok(Self::from_scratch(scratch))
    }

    fn from_scratch(scratch: TempDir) -> Self {
        tracing::debug!("Allocated scratch directory {}", scratch.path().display());
        Self { scratch, store: None }
    }

    /// Object store used for remote destinations.
    pub fn with_store(mut self, store: Box<dyn ObjectStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn scratch_path(&self) -> &Path {
        self.scratch.path()
    }

    pub fn store(&self) -> Option<&dyn ObjectStore> {
        self.store.as_deref()
    }

    /// Publish each payload in order, then remove the scratch directory.
    ///
    /// The first failure aborts the remaining payloads. Payloads published
    /// before it stay where they are.
    pub fn publish(self, items: Vec<(Payload, Destination)>) -> TbResult<Vec<PublishedArtifact>> {
        let outcome = self.publish_all(&items);
        match (outcome, self.close()) {
            (Ok(published), Ok(())) => Ok(published),
            (Ok(_), Err(cleanup)) => Err(cleanup),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(cleanup)) => {
                warn!("{}", cleanup);
                Err(err)
            }
        }
    }

    /// Remove the scratch directory without publishing anything.
    pub fn close(self) -> TbResult<()> {
        let path = self.scratch.path().display().to_string();
        self.scratch
            .close()
            .map_err(|source| PublicationError::Cleanup { path, source })?;
        Ok(())
    }

    fn publish_all(&self, items: &[(Payload, Destination)]) -> TbResult<Vec<PublishedArtifact>> {
        if items.iter().any(|(_, dest)| dest.is_remote()) && self.store.is_none() {
            return Err(config_error!("remote destination requested but no object store is configured"));
        }

        let mut published = Vec::with_capacity(items.len());
        for (index, (payload, destination)) in items.iter().enumerate() {
            let staged = self.stage(index, payload)?;
            let location = match destination {
                Destination::Local { path } => {
                    promote(&staged, path).map_err(|source| PublicationError::LocalRename {
                        from: staged.display().to_string(),
                        to: path.display().to_string(),
                        source,
                    })?;
                    info!("Saved locally: {}", path.display());
                    path.display().to_string()
                }
                Destination::Remote { key } => self.upload(&staged, payload.name(), key)?,
            };
            published.push(PublishedArtifact {
                payload: payload.name().to_string(),
                location,
                bytes: payload.contents().len() as u64,
            });
        }
        Ok(published)
    }

    /// Write `payload` into scratch and sync it to disk.
    fn stage(&self, index: usize, payload: &Payload) -> Result<PathBuf, PublicationError> {
        let path = self.scratch.path().join(scratch_file_name(index, payload.name()));
        let write = || -> io::Result<()> {
            let mut file = File::create(&path)?;
            file.write_all(payload.contents())?;
            file.sync_all()
        };
        write().map_err(|source| PublicationError::ScratchWrite {
            payload: payload.name().to_string(),
            path: path.display().to_string(),
            source,
        })?;
        Ok(path)
    }

    fn upload(&self, staged: &Path, payload: &str, key: &str) -> TbResult<String> {
        let store = self
            .store
            .as_deref()
            .ok_or_else(|| config_error!("no object store configured for {key}"))?;
        let uri = store.uri(key);
        store.put(staged, key).map_err(|e| PublicationError::Remote {
            payload: payload.to_string(),
            uri: uri.clone(),
            source: Box::new(e),
        })?;
        if let Err(e) = fs::remove_file(staged) {
            // the whole directory goes at close anyway
            tracing::debug!("Could not discard {}: {}", staged.display(), e);
        }
        info!("Uploaded: {}", uri);
        Ok(uri)
    }
}

impl std::fmt::Debug for ArtifactStager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactStager")
            .field("scratch", &self.scratch.path())
            .field("store", &self.store.as_ref().map(|s| s.backend_type()))
            .finish()
    }
}

fn scratch_file_name(index: usize, name: &str) -> String {
    let safe: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!("{index:02}-{safe}")
}

/// Move `staged` to `target` atomically, creating parent directories.
///
/// Across filesystems the file is copied into a temporary sibling of
/// `target` and renamed from there.
fn promote(staged: &Path, target: &Path) -> io::Result<()> {
    let parent = match target.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent)?;

    match fs::rename(staged, target) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            tracing::debug!("Rename crosses devices, copying {} into {}", staged.display(), parent.display());
            copy_into_place(staged, target, &parent)
        }
        Err(e) => Err(e),
    }
}

/// Copy `staged` into a temporary file in `parent`, then rename it onto
/// `target`. The staged file is discarded afterwards on a best-effort basis.
fn copy_into_place(staged: &Path, target: &Path, parent: &Path) -> io::Result<()> {
    let mut source = File::open(staged)?;
    let mut sibling = NamedTempFile::new_in(parent)?;
    io::copy(&mut source, &mut sibling)?;
    sibling.flush()?;
    sibling.as_file().sync_all()?;
    sibling.persist(target).map_err(|e| e.error)?;

    // target is complete; the scratch directory goes at close anyway
    if let Err(e) = fs::remove_file(staged) {
        tracing::debug!("Could not discard {}: {}", staged.display(), e);
    }
    Ok(())
}
