use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};
use ureq::{Agent, RequestBuilder};

use super::{DatasetRegistry, DatasetVersion};
use crate::constants::registry::HTTP_VERSIONS_PATH;
use crate::errors::PipelineError;
use crate::types::VersionId;

#[derive(Serialize)]
struct CreateVersionRequest<'a> {
    project: &'a str,
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parent: Option<&'a str>,
}

/// Registry client for a JSON-over-HTTP dataset service.
///
/// Files are staged in memory and sent with `PUT` on [`DatasetRegistry::upload`].
/// Non-2xx responses surface as [`PipelineError::Registry`].
pub struct HttpRegistry {
    base_url: String,
    token: Option<String>,
    agent: Agent,
    staged: Mutex<HashMap<VersionId, Vec<PathBuf>>>,
}

impl std::fmt::Debug for HttpRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRegistry")
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

fn registry_err(dataset: &str, reason: impl Into<String>) -> PipelineError {
    PipelineError::Registry {
        dataset: dataset.to_string(),
        reason: reason.into(),
    }
}

impl HttpRegistry {
    /// Client for the service at `base_url`, sending `token` as a bearer credential.
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            token,
            agent: Agent::new_with_defaults(),
            staged: Mutex::new(HashMap::new()),
        }
    }

    /// Service base URL without trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn versions_url(&self) -> String {
        format!("{}/{}", self.base_url, HTTP_VERSIONS_PATH)
    }

    fn version_url(&self, id: &str) -> String {
        format!("{}/{}", self.versions_url(), id)
    }

    fn authorize<B>(&self, request: RequestBuilder<B>) -> RequestBuilder<B> {
        match &self.token {
            Some(token) => request.header("Authorization", format!("Bearer {token}")),
            None => request,
        }
    }

    fn read_json<T: DeserializeOwned>(
        context: &str,
        response: Result<ureq::http::Response<ureq::Body>, ureq::Error>,
    ) -> Result<T, PipelineError> {
        let response =
            response.map_err(|err| registry_err(context, format!("request failed: {err}")))?;
        let body = response
            .into_body()
            .read_to_string()
            .map_err(|err| registry_err(context, format!("failed reading response body: {err}")))?;
        serde_json::from_str(&body)
            .map_err(|err| registry_err(context, format!("failed parsing response: {err}")))
    }

    fn staged_files(&self, id: &str) -> Result<Vec<PathBuf>, PipelineError> {
        let staged = self
            .staged
            .lock()
            .map_err(|_| registry_err(id, "staging lock poisoned"))?;
        Ok(staged.get(id).cloned().unwrap_or_default())
    }

    fn with_staged<R>(
        &self,
        id: &str,
        apply: impl FnOnce(&mut HashMap<VersionId, Vec<PathBuf>>) -> R,
    ) -> Result<R, PipelineError> {
        let mut staged = self
            .staged
            .lock()
            .map_err(|_| registry_err(id, "staging lock poisoned"))?;
        Ok(apply(&mut staged))
    }

    fn put_file(&self, version: &DatasetVersion, path: &Path) -> Result<(), PipelineError> {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| {
                registry_err(
                    &version.name,
                    format!("staged path {} has no file name", path.display()),
                )
            })?;
        let payload = fs::read(path).map_err(|err| {
            registry_err(
                &version.name,
                format!("failed reading {}: {err}", path.display()),
            )
        })?;
        let url = format!("{}/files/{}", self.version_url(&version.id), name);
        let size = payload.len();
        self.authorize(self.agent.put(&url))
            .header("Content-Type", "application/octet-stream")
            .send(payload)
            .map_err(|err| registry_err(&version.name, format!("failed uploading {name}: {err}")))?;
        debug!(
            "[corpus_pairs:registry] uploaded {} ({} bytes) to version {}",
            name, size, version.id
        );
        Ok(())
    }
}

impl DatasetRegistry for HttpRegistry {
    fn list_versions(
        &self,
        project: &str,
        name_prefix: &str,
    ) -> Result<Vec<DatasetVersion>, PipelineError> {
        let response = self
            .authorize(self.agent.get(&self.versions_url()))
            .query("project", project)
            .query("name", name_prefix)
            .call();
        let mut versions: Vec<DatasetVersion> = Self::read_json(name_prefix, response)?;
        versions.retain(|version| {
            version.project == project && version.name.starts_with(name_prefix)
        });
        versions.sort_by_key(|version| version.created_seq);
        Ok(versions)
    }

    fn get(&self, id: &str) -> Result<DatasetVersion, PipelineError> {
        let response = self.authorize(self.agent.get(&self.version_url(id))).call();
        Self::read_json(id, response)
    }

    fn create(
        &self,
        project: &str,
        name: &str,
        parent: Option<&str>,
    ) -> Result<DatasetVersion, PipelineError> {
        let payload = serde_json::to_string(&CreateVersionRequest {
            project,
            name,
            parent,
        })
        .map_err(|err| registry_err(name, format!("failed encoding request: {err}")))?;
        let response = self
            .authorize(self.agent.post(&self.versions_url()))
            .header("Content-Type", "application/json")
            .send(payload);
        let version: DatasetVersion = Self::read_json(name, response)?;
        info!(
            "[corpus_pairs:registry] created remote version {} for {}/{}",
            version.id, project, name
        );
        Ok(version)
    }

    fn add_file(&self, id: &str, path: &Path) -> Result<(), PipelineError> {
        let version = self.get(id)?;
        if version.status.is_final() {
            return Err(registry_err(
                &version.name,
                format!("cannot add files to version '{id}': it is finalized"),
            ));
        }
        if !path.is_file() {
            return Err(registry_err(
                &version.name,
                format!("cannot attach {}: not a file", path.display()),
            ));
        }
        let path = path.to_path_buf();
        self.with_staged(id, |staged| {
            let files = staged.entry(id.to_string()).or_default();
            files.retain(|existing| existing.file_name() != path.file_name());
            files.push(path);
        })
    }

    fn upload(&self, id: &str) -> Result<DatasetVersion, PipelineError> {
        let version = self.get(id)?;
        for path in self.staged_files(id)? {
            self.put_file(&version, &path)?;
        }
        self.with_staged(id, |staged| staged.remove(id))?;
        self.get(id)
    }

    fn finalize(&self, id: &str) -> Result<DatasetVersion, PipelineError> {
        let version = self.get(id)?;
        if version.status.is_final() {
            return Ok(version);
        }
        let pending = self.staged_files(id)?;
        if !pending.is_empty() {
            return Err(registry_err(
                &version.name,
                format!(
                    "cannot finalize version '{id}': {} files are staged but not uploaded",
                    pending.len()
                ),
            ));
        }
        let response = self
            .authorize(self.agent.post(&format!("{}/finalize", self.version_url(id))))
            .send_empty();
        Self::read_json(&version.name, response)
    }

    fn discard(&self, id: &str) -> Result<(), PipelineError> {
        self.authorize(self.agent.delete(&self.version_url(id)))
            .call()
            .map_err(|err| registry_err(id, format!("failed discarding version: {err}")))?;
        self.with_staged(id, |staged| staged.remove(id))?;
        info!("[corpus_pairs:registry] discarded remote version {}", id);
        Ok(())
    }
}
