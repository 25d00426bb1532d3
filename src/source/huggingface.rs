use hf_hub::api::sync::{ApiBuilder, ApiRepo};
use hf_hub::{Repo, RepoType};
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;

use super::{CorpusFetcher, CorpusSpec, read_rows};
use crate::constants::source::HF_HUB_RETRIES;
use crate::data::Table;
use crate::errors::PipelineError;
use crate::types::PathString;

/// Fetcher pulling shard files from a Hugging Face dataset repository.
///
/// Files are downloaded into the hf-hub cache (`HF_HOME` or `cache_dir`) and
/// reused by later runs; retry behaviour is the client's own.
#[derive(Clone, Debug)]
pub struct HuggingFaceFetcher {
    /// Optional cache directory override.
    pub cache_dir: Option<PathBuf>,
    /// Optional access token for gated datasets.
    pub token: Option<String>,
    /// Show per-file download progress bars.
    pub progress: bool,
}

impl Default for HuggingFaceFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl HuggingFaceFetcher {
    /// Create a fetcher using the default hf-hub cache and no token.
    pub fn new() -> Self {
        Self {
            cache_dir: None,
            token: None,
            progress: true,
        }
    }

    fn repo_api(&self, spec: &CorpusSpec) -> Result<ApiRepo, PipelineError> {
        let mut builder = ApiBuilder::new()
            .with_progress(self.progress)
            .with_retries(HF_HUB_RETRIES)
            .with_token(self.token.clone());
        if let Some(dir) = &self.cache_dir {
            builder = builder.with_cache_dir(dir.clone());
        }
        let api = builder
            .build()
            .map_err(|err| PipelineError::SourceUnavailable {
                source_id: spec.source_id(),
                reason: format!("failed building hf-hub client: {err}"),
            })?;

        let repo = match &spec.revision {
            Some(revision) => {
                Repo::with_revision(spec.dataset.clone(), RepoType::Dataset, revision.clone())
            }
            None => Repo::new(spec.dataset.clone(), RepoType::Dataset),
        };
        Ok(api.repo(repo))
    }

    fn list_remote_files(
        &self,
        spec: &CorpusSpec,
        repo_api: &ApiRepo,
    ) -> Result<Vec<PathString>, PipelineError> {
        info!(
            "[corpus_pairs:fetch] reading remote file list for dataset {}",
            spec.dataset
        );
        let info = repo_api
            .info()
            .map_err(|err| PipelineError::SourceUnavailable {
                source_id: spec.source_id(),
                reason: format!("failed reading hf-hub repository info: {err}"),
            })?;
        Ok(info
            .siblings
            .into_iter()
            .map(|entry| entry.rfilename)
            .collect())
    }
}

/// Read the repository files of `remote_files` that match `spec`.
///
/// `resolve` maps a matched repository path to a local file (a download into
/// the hf-hub cache for [`HuggingFaceFetcher`]). Files are read in path order.
pub fn read_listed_files<F>(
    spec: &CorpusSpec,
    remote_files: &[PathString],
    mut resolve: F,
) -> Result<Table, PipelineError>
where
    F: FnMut(&str) -> Result<PathBuf, PipelineError>,
{
    let source_id = spec.source_id();
    let selected = spec.select_files(remote_files)?;

    let mut table = Table::new();
    for remote_path in &selected {
        let started = Instant::now();
        let local = resolve(remote_path)?;
        if !local.exists() {
            return Err(PipelineError::SourceUnavailable {
                source_id,
                reason: format!(
                    "resolved file for '{}' does not exist at {}",
                    remote_path,
                    local.display()
                ),
            });
        }
        let rows = read_rows(&local, &source_id)?;
        info!(
            "[corpus_pairs:fetch] {} rows from {} ({:.1}s)",
            rows.len(),
            remote_path,
            started.elapsed().as_secs_f64()
        );
        table.extend(rows);
    }
    Ok(table)
}

impl CorpusFetcher for HuggingFaceFetcher {
    fn fetch(&self, spec: &CorpusSpec) -> Result<Table, PipelineError> {
        let repo_api = self.repo_api(spec)?;
        let remote_files = self.list_remote_files(spec, &repo_api)?;
        read_listed_files(spec, &remote_files, |remote_path| {
            repo_api
                .get(remote_path)
                .map_err(|err| PipelineError::SourceUnavailable {
                    source_id: spec.source_id(),
                    reason: format!("failed downloading '{remote_path}' from hf-hub: {err}"),
                })
        })
    }
}
