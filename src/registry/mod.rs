use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, warn};

use crate::constants::registry::{DEFAULT_DATASET_NAME, DEFAULT_PROJECT};
use crate::errors::PipelineError;
use crate::types::{DatasetName, ProjectName, VersionId};

/// JSON-over-HTTP registry client.
pub mod http;
/// Filesystem registry.
pub mod local;

pub use http::HttpRegistry;
pub use local::LocalRegistry;

/// Lifecycle state of a dataset version.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionStatus {
    /// Created; files may be attached.
    Pending,
    /// Attached files have been uploaded; not yet immutable.
    Uploaded,
    /// Immutable and queryable.
    Finalized,
}

impl VersionStatus {
    /// True once the version can no longer change.
    pub fn is_final(self) -> bool {
        matches!(self, VersionStatus::Finalized)
    }
}

/// One uploaded file of a version.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionFile {
    /// File name inside the version (e.g. `train.parquet`).
    pub name: String,
    /// Uploaded size in bytes.
    pub size_bytes: u64,
    /// Hex content hash of the uploaded bytes.
    pub content_hash: String,
}

/// A registered dataset version.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetVersion {
    /// Registry-assigned id.
    pub id: VersionId,
    /// Owning project.
    pub project: ProjectName,
    /// Dataset name shared along the lineage.
    pub name: DatasetName,
    /// Version this one was derived from, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<VersionId>,
    /// Lifecycle state.
    pub status: VersionStatus,
    /// Monotonic creation order within the registry.
    pub created_seq: u64,
    /// Creation time (UTC).
    pub created_at: DateTime<Utc>,
    /// Set once finalized.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finalized_at: Option<DateTime<Utc>>,
    /// Uploaded files.
    #[serde(default)]
    pub files: Vec<VersionFile>,
}

/// Versioned dataset store.
///
/// `list_versions` returns versions in creation order (oldest first).
/// `finalize` on an already finalized version is a no-op returning it.
pub trait DatasetRegistry {
    /// Versions in `project` whose name starts with `name_prefix`, oldest first.
    fn list_versions(
        &self,
        project: &str,
        name_prefix: &str,
    ) -> Result<Vec<DatasetVersion>, PipelineError>;
    /// Fetch one version by id.
    fn get(&self, id: &str) -> Result<DatasetVersion, PipelineError>;
    /// Create a pending version, optionally as a child of `parent`.
    fn create(
        &self,
        project: &str,
        name: &str,
        parent: Option<&str>,
    ) -> Result<DatasetVersion, PipelineError>;
    /// Stage a local file for upload into a non-final version.
    fn add_file(&self, id: &str, path: &Path) -> Result<(), PipelineError>;
    /// Upload every staged file of a version.
    fn upload(&self, id: &str) -> Result<DatasetVersion, PipelineError>;
    /// Mark a version immutable.
    fn finalize(&self, id: &str) -> Result<DatasetVersion, PipelineError>;
    /// Remove a version that was never finalized.
    fn discard(&self, id: &str) -> Result<(), PipelineError>;
}

/// Rule used to pick the parent of a new version.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LineagePolicy {
    /// Most recently created version, whatever its status.
    #[default]
    LatestCreated,
    /// Most recently created finalized version.
    LatestFinalized,
}

impl fmt::Display for LineagePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LineagePolicy::LatestCreated => f.write_str("latest-created"),
            LineagePolicy::LatestFinalized => f.write_str("latest-finalized"),
        }
    }
}

impl FromStr for LineagePolicy {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "latest-created" | "latest_created" => Ok(LineagePolicy::LatestCreated),
            "latest-finalized" | "latest_finalized" => Ok(LineagePolicy::LatestFinalized),
            other => Err(format!(
                "unknown lineage policy '{other}' (expected latest-created or latest-finalized)"
            )),
        }
    }
}

/// Where and under which identity partitions are published.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublishTarget {
    /// Registry project, e.g. `datasets/c4`.
    pub project: ProjectName,
    /// Dataset name, e.g. `c4_raw_clean`.
    pub name: DatasetName,
    /// Parent selection rule.
    pub lineage: LineagePolicy,
}

impl Default for PublishTarget {
    fn default() -> Self {
        Self {
            project: DEFAULT_PROJECT.to_string(),
            name: DEFAULT_DATASET_NAME.to_string(),
            lineage: LineagePolicy::default(),
        }
    }
}

/// Result of a successful publish.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublishOutcome {
    /// The new, finalized version.
    pub version: DatasetVersion,
    /// Parent it was linked to, if any.
    pub parent: Option<VersionId>,
}

/// Pick the parent for a new version of `name` in `project`.
pub fn resolve_parent(
    registry: &dyn DatasetRegistry,
    project: &str,
    name: &str,
    policy: LineagePolicy,
) -> Result<Option<DatasetVersion>, PipelineError> {
    let versions = registry.list_versions(project, name)?;
    let candidate = match policy {
        LineagePolicy::LatestCreated => versions.last(),
        LineagePolicy::LatestFinalized => versions.iter().rev().find(|v| v.status.is_final()),
    };
    match candidate {
        Some(version) => registry.get(&version.id).map(Some),
        None => Ok(None),
    }
}

/// Create a new version, linked to the resolved parent when one exists.
///
/// An open parent is finalized before the child is created.
pub fn create_dataset(
    registry: &dyn DatasetRegistry,
    project: &str,
    name: &str,
    policy: LineagePolicy,
) -> Result<DatasetVersion, PipelineError> {
    match resolve_parent(registry, project, name, policy)? {
        Some(parent) => {
            info!(
                "[corpus_pairs:registry] create child of {} ({:?}) for {}/{}",
                parent.id, parent.status, project, name
            );
            if !parent.status.is_final() {
                registry.finalize(&parent.id)?;
            }
            registry.create(project, name, Some(&parent.id))
        }
        None => {
            info!(
                "[corpus_pairs:registry] create parent version for {}/{}",
                project, name
            );
            registry.create(project, name, None)
        }
    }
}

fn attach_upload_finalize(
    registry: &dyn DatasetRegistry,
    id: &str,
    files: &[PathBuf],
) -> Result<DatasetVersion, PipelineError> {
    for path in files {
        registry.add_file(id, path)?;
    }
    registry.upload(id)?;
    registry.finalize(id)
}

/// Create a version, attach `files`, upload, and finalize.
///
/// If anything fails after the version exists it is discarded before the
/// error is returned.
pub fn publish(
    registry: &dyn DatasetRegistry,
    target: &PublishTarget,
    files: &[PathBuf],
) -> Result<PublishOutcome, PipelineError> {
    let version = create_dataset(registry, &target.project, &target.name, target.lineage)?;
    let parent = version.parent.clone();

    match attach_upload_finalize(registry, &version.id, files) {
        Ok(finalized) => {
            info!(
                "[corpus_pairs:registry] finalized {}/{} version {} with {} files",
                finalized.project,
                finalized.name,
                finalized.id,
                finalized.files.len()
            );
            Ok(PublishOutcome {
                version: finalized,
                parent,
            })
        }
        Err(err) => {
            warn!(
                "[corpus_pairs:registry] publish of version {} failed, discarding: {err}",
                version.id
            );
            if let Err(discard_err) = registry.discard(&version.id) {
                warn!(
                    "[corpus_pairs:registry] failed discarding version {}: {discard_err}",
                    version.id
                );
            }
            Err(err)
        }
    }
}
