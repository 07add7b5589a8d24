//! # tb-artifacts
//!
//! Publication of run artifacts. Payloads are first written to a scratch
//! directory owned by the run, then moved to their final location: an atomic
//! rename for local destinations, a single object-store `put` for remote ones.
//! The scratch directory is removed on every exit path.

pub mod destination;
pub mod settings;
pub mod staging;
pub mod store;

pub use destination::{join_key, Destination};
pub use settings::StorageSettings;
pub use staging::{ArtifactStager, Payload, PublishedArtifact};
pub use store::{AwsCliStore, DirectoryStore, ObjectStore, StoreError};
