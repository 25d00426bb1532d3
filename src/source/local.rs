use std::path::{Path, PathBuf};
use tracing::info;
use walkdir::WalkDir;

use super::{CorpusFetcher, CorpusSpec, read_rows};
use crate::data::Table;
use crate::errors::PipelineError;
use crate::types::PathString;

/// Fetcher reading a local snapshot laid out like the remote repository
/// (e.g. `<root>/en/c4-train.00000-of-01024.json.gz`).
#[derive(Clone, Debug)]
pub struct LocalFetcher {
    root: PathBuf,
    follow_links: bool,
}

impl LocalFetcher {
    /// Create a fetcher rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            follow_links: true,
        }
    }

    /// Configure symlink traversal (hf-hub snapshots are symlink trees).
    pub fn with_follow_symlinks(mut self, follow_links: bool) -> Self {
        self.follow_links = follow_links;
        self
    }

    /// Root directory of the snapshot.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// List every file under the root as a `/`-separated relative path.
    fn list_files(&self) -> Vec<PathString> {
        WalkDir::new(&self.root)
            .follow_links(self.follow_links)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| {
                entry
                    .path()
                    .strip_prefix(&self.root)
                    .ok()
                    .map(relative_path_string)
            })
            .collect()
    }
}

fn relative_path_string(path: &Path) -> PathString {
    path.components()
        .map(|part| part.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

impl CorpusFetcher for LocalFetcher {
    fn fetch(&self, spec: &CorpusSpec) -> Result<Table, PipelineError> {
        if !self.root.is_dir() {
            return Err(PipelineError::SourceUnavailable {
                source_id: spec.source_id(),
                reason: format!("snapshot root {} is not a directory", self.root.display()),
            });
        }
        let source_id = spec.source_id();
        let files = spec.select_files(&self.list_files())?;
        let mut table = Table::new();
        for relative in &files {
            let rows = read_rows(&self.root.join(relative), &source_id)?;
            info!(
                "[corpus_pairs:fetch] {} rows from local shard {}",
                rows.len(),
                relative
            );
            table.extend(rows);
        }
        Ok(table)
    }
}
