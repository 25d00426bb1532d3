use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};
use walkdir::WalkDir;

use super::{DatasetRegistry, DatasetVersion, VersionFile, VersionStatus};
use crate::constants::registry::{VERSION_FILES_DIR, VERSION_MANIFEST_FILE, VERSIONS_DIR};
use crate::errors::PipelineError;
use crate::hash::{stable_hash_reader, stable_hash_str};

/// On-disk manifest: the public version record plus files staged for upload.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct Manifest {
    #[serde(flatten)]
    version: DatasetVersion,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    staged: Vec<PathBuf>,
}

/// Filesystem-backed dataset registry.
///
/// Layout: `<root>/versions/<id>/version.json` and
/// `<root>/versions/<id>/files/<name>`. Manifests are replaced atomically.
/// Writers inside one process are serialized; separate processes are not.
pub struct LocalRegistry {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl std::fmt::Debug for LocalRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalRegistry")
            .field("root", &self.root)
            .finish()
    }
}

fn registry_err(dataset: &str, reason: impl Into<String>) -> PipelineError {
    PipelineError::Registry {
        dataset: dataset.to_string(),
        reason: reason.into(),
    }
}

impl LocalRegistry {
    /// Open (or create) a registry rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, PipelineError> {
        let root = root.into();
        fs::create_dir_all(root.join(VERSIONS_DIR))?;
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    /// Registry root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn versions_dir(&self) -> PathBuf {
        self.root.join(VERSIONS_DIR)
    }

    fn version_dir(&self, id: &str) -> PathBuf {
        self.versions_dir().join(id)
    }

    /// Directory holding the uploaded files of version `id`.
    pub fn files_dir(&self, id: &str) -> PathBuf {
        self.version_dir(id).join(VERSION_FILES_DIR)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ()>, PipelineError> {
        self.write_lock
            .lock()
            .map_err(|_| registry_err("*", "registry write lock poisoned"))
    }

    fn read_manifest_at(path: &Path) -> Result<Manifest, PipelineError> {
        let bytes = fs::read(path)?;
        serde_json::from_slice(&bytes).map_err(|err| {
            registry_err(
                "*",
                format!("corrupt version manifest {}: {err}", path.display()),
            )
        })
    }

    fn read_manifest(&self, id: &str) -> Result<Manifest, PipelineError> {
        let path = self.version_dir(id).join(VERSION_MANIFEST_FILE);
        if !path.is_file() {
            return Err(registry_err(id, format!("version '{id}' not found")));
        }
        Self::read_manifest_at(&path)
    }

    fn write_manifest(&self, manifest: &Manifest) -> Result<(), PipelineError> {
        let dir = self.version_dir(&manifest.version.id);
        fs::create_dir_all(&dir)?;
        let target = dir.join(VERSION_MANIFEST_FILE);
        let temp = target.with_extension("json.tmp");
        let payload = serde_json::to_vec_pretty(manifest).map_err(|err| {
            registry_err(
                &manifest.version.name,
                format!("failed encoding manifest: {err}"),
            )
        })?;
        fs::write(&temp, payload)?;
        fs::rename(&temp, &target)?;
        Ok(())
    }

    fn all_manifests(&self) -> Result<Vec<Manifest>, PipelineError> {
        let mut manifests = Vec::new();
        // Unreadable entries fail the listing instead of being skipped.
        for entry in WalkDir::new(self.versions_dir()).min_depth(2).max_depth(2) {
            let entry = entry.map_err(|err| {
                registry_err("*", format!("failed listing registry versions: {err}"))
            })?;
            if entry.file_type().is_file() && entry.file_name() == VERSION_MANIFEST_FILE {
                manifests.push(Self::read_manifest_at(entry.path())?);
            }
        }
        manifests.sort_by_key(|manifest| manifest.version.created_seq);
        Ok(manifests)
    }

    fn ensure_open(manifest: &Manifest, action: &str) -> Result<(), PipelineError> {
        if manifest.version.status.is_final() {
            return Err(registry_err(
                &manifest.version.name,
                format!(
                    "cannot {action} version '{}': it is finalized",
                    manifest.version.id
                ),
            ));
        }
        Ok(())
    }
}

impl DatasetRegistry for LocalRegistry {
    fn list_versions(
        &self,
        project: &str,
        name_prefix: &str,
    ) -> Result<Vec<DatasetVersion>, PipelineError> {
        Ok(self
            .all_manifests()?
            .into_iter()
            .map(|manifest| manifest.version)
            .filter(|version| version.project == project && version.name.starts_with(name_prefix))
            .collect())
    }

    fn get(&self, id: &str) -> Result<DatasetVersion, PipelineError> {
        Ok(self.read_manifest(id)?.version)
    }

    fn create(
        &self,
        project: &str,
        name: &str,
        parent: Option<&str>,
    ) -> Result<DatasetVersion, PipelineError> {
        let _guard = self.lock()?;
        if let Some(parent_id) = parent {
            self.read_manifest(parent_id)?;
        }
        let created_seq = self
            .all_manifests()?
            .last()
            .map(|manifest| manifest.version.created_seq + 1)
            .unwrap_or(1);
        let created_at = Utc::now();
        let fingerprint = format!(
            "{project}/{name}/{}",
            created_at.timestamp_nanos_opt().unwrap_or_default()
        );
        let id = format!(
            "{created_seq:06}-{:016x}",
            stable_hash_str(created_seq, &fingerprint)
        );
        let version = DatasetVersion {
            id,
            project: project.to_string(),
            name: name.to_string(),
            parent: parent.map(str::to_string),
            status: VersionStatus::Pending,
            created_seq,
            created_at,
            finalized_at: None,
            files: Vec::new(),
        };
        self.write_manifest(&Manifest {
            version: version.clone(),
            staged: Vec::new(),
        })?;
        info!(
            "[corpus_pairs:registry] created version {} for {}/{} (parent: {})",
            version.id,
            project,
            name,
            version.parent.as_deref().unwrap_or("none")
        );
        Ok(version)
    }

    fn add_file(&self, id: &str, path: &Path) -> Result<(), PipelineError> {
        let _guard = self.lock()?;
        let mut manifest = self.read_manifest(id)?;
        Self::ensure_open(&manifest, "add files to")?;
        if !path.is_file() {
            return Err(registry_err(
                &manifest.version.name,
                format!("cannot attach {}: not a file", path.display()),
            ));
        }
        let path = path.to_path_buf();
        manifest
            .staged
            .retain(|staged| staged.file_name() != path.file_name());
        manifest.staged.push(path);
        self.write_manifest(&manifest)
    }

    fn upload(&self, id: &str) -> Result<DatasetVersion, PipelineError> {
        let _guard = self.lock()?;
        let mut manifest = self.read_manifest(id)?;
        Self::ensure_open(&manifest, "upload to")?;
        let files_dir = self.files_dir(id);
        fs::create_dir_all(&files_dir)?;

        for source in std::mem::take(&mut manifest.staged) {
            let name = source
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .ok_or_else(|| {
                    registry_err(
                        &manifest.version.name,
                        format!("staged path {} has no file name", source.display()),
                    )
                })?;
            let target = files_dir.join(&name);
            fs::copy(&source, &target).map_err(|err| {
                registry_err(
                    &manifest.version.name,
                    format!("failed uploading {}: {err}", source.display()),
                )
            })?;
            let (hash, size_bytes) = stable_hash_reader(BufReader::new(File::open(&target)?))?;
            debug!(
                "[corpus_pairs:registry] uploaded {} ({} bytes) to version {}",
                name, size_bytes, id
            );
            manifest.version.files.retain(|file| file.name != name);
            manifest.version.files.push(VersionFile {
                name,
                size_bytes,
                content_hash: format!("{hash:016x}"),
            });
        }
        manifest.version.status = VersionStatus::Uploaded;
        self.write_manifest(&manifest)?;
        Ok(manifest.version)
    }

    fn finalize(&self, id: &str) -> Result<DatasetVersion, PipelineError> {
        let _guard = self.lock()?;
        let mut manifest = self.read_manifest(id)?;
        if manifest.version.status.is_final() {
            return Ok(manifest.version);
        }
        if !manifest.staged.is_empty() {
            return Err(registry_err(
                &manifest.version.name,
                format!(
                    "cannot finalize version '{id}': {} files are staged but not uploaded",
                    manifest.staged.len()
                ),
            ));
        }
        manifest.version.status = VersionStatus::Finalized;
        manifest.version.finalized_at = Some(Utc::now());
        self.write_manifest(&manifest)?;
        Ok(manifest.version)
    }

    fn discard(&self, id: &str) -> Result<(), PipelineError> {
        let _guard = self.lock()?;
        let manifest = self.read_manifest(id)?;
        Self::ensure_open(&manifest, "discard")?;
        fs::remove_dir_all(self.version_dir(id))?;
        info!("[corpus_pairs:registry] discarded version {}", id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn versions_list_in_creation_order_filtered_by_project_and_prefix() {
        let dir = tempdir().unwrap();
        let registry = LocalRegistry::open(dir.path()).unwrap();
        let a = registry.create("datasets/c4", "c4_raw_clean", None).unwrap();
        registry.create("datasets/other", "c4_raw_clean", None).unwrap();
        let b = registry.create("datasets/c4", "c4_raw_clean_v2", None).unwrap();
        registry.create("datasets/c4", "wiki", None).unwrap();

        let listed = registry.list_versions("datasets/c4", "c4_raw").unwrap();

        let ids: Vec<&str> = listed.iter().map(|v| v.id.as_str()).collect();
        assert_eq!(ids, vec![a.id.as_str(), b.id.as_str()]);
        assert!(listed[0].created_seq < listed[1].created_seq);
    }

    #[test]
    fn upload_copies_staged_files_and_records_digests() {
        let dir = tempdir().unwrap();
        let registry = LocalRegistry::open(dir.path().join("reg")).unwrap();
        let file = dir.path().join("validate.parquet");
        fs::write(&file, b"0123456789").unwrap();
        let version = registry.create("p", "ds", None).unwrap();

        registry.add_file(&version.id, &file).unwrap();
        registry.add_file(&version.id, &file).unwrap();
        let uploaded = registry.upload(&version.id).unwrap();

        assert_eq!(uploaded.status, VersionStatus::Uploaded);
        assert_eq!(uploaded.files.len(), 1);
        assert_eq!(uploaded.files[0].size_bytes, 10);
        assert_eq!(
            fs::read(registry.files_dir(&version.id).join("validate.parquet")).unwrap(),
            b"0123456789"
        );
    }

    #[test]
    fn finalize_is_idempotent_and_freezes_version() {
        let dir = tempdir().unwrap();
        let registry = LocalRegistry::open(dir.path().join("reg")).unwrap();
        let file = dir.path().join("test.parquet");
        fs::write(&file, b"x").unwrap();
        let version = registry.create("p", "ds", None).unwrap();

        let first = registry.finalize(&version.id).unwrap();
        let second = registry.finalize(&version.id).unwrap();

        assert_eq!(first, second);
        assert!(registry.add_file(&version.id, &file).is_err());
        assert!(registry.discard(&version.id).is_err());
    }

    #[test]
    fn finalize_refuses_staged_but_unuploaded_files() {
        let dir = tempdir().unwrap();
        let registry = LocalRegistry::open(dir.path().join("reg")).unwrap();
        let file = dir.path().join("train.parquet");
        fs::write(&file, b"x").unwrap();
        let version = registry.create("p", "ds", None).unwrap();
        registry.add_file(&version.id, &file).unwrap();

        assert!(matches!(
            registry.finalize(&version.id),
            Err(PipelineError::Registry { .. })
        ));
    }

    #[test]
    fn unknown_version_and_unknown_parent_are_errors() {
        let dir = tempdir().unwrap();
        let registry = LocalRegistry::open(dir.path()).unwrap();
        assert!(registry.get("000009-deadbeef").is_err());
        assert!(registry.create("p", "ds", Some("missing")).is_err());
    }

    #[test]
    fn listing_fails_when_versions_cannot_be_walked() {
        let dir = tempdir().unwrap();
        let registry = LocalRegistry::open(dir.path().join("reg")).unwrap();
        registry.create("p", "ds", None).unwrap();
        fs::remove_dir_all(registry.versions_dir()).unwrap();

        assert!(matches!(
            registry.list_versions("p", "ds"),
            Err(PipelineError::Registry { .. })
        ));
        assert!(matches!(
            registry.create("p", "ds", None),
            Err(PipelineError::Registry { .. })
        ));
    }

    #[test]
    fn discard_removes_open_version() {
        let dir = tempdir().unwrap();
        let registry = LocalRegistry::open(dir.path()).unwrap();
        let version = registry.create("p", "ds", None).unwrap();

        registry.discard(&version.id).unwrap();

        assert!(registry.list_versions("p", "ds").unwrap().is_empty());
    }
}
