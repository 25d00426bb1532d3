use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::constants::corpus::{RAW_DATA_FILES, RAW_VARIANT};
use crate::constants::registry::DEFAULT_REGISTRY_DIR;
use crate::constants::shards::{DEFAULT_CLEAN_SHARD_ROOT, DEFAULT_NUM_SHARDS, DEFAULT_RAW_SHARD_ROOT};
use crate::constants::splits::DEFAULT_SEED;
use crate::errors::PipelineError;
use crate::registry::{DatasetRegistry, HttpRegistry, LocalRegistry, PublishTarget};
use crate::source::{CorpusFetcher, CorpusSpec, LocalFetcher};
use crate::splits::SplitRatios;

/// Controls the shard round-trip stage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShardConfig {
    /// Run the round-trip at all. When disabled the fetched tables are joined directly.
    pub enabled: bool,
    /// Shards per table.
    pub num_shards: usize,
    /// Shard root for the clean table.
    pub clean_root: PathBuf,
    /// Shard root for the raw table.
    pub raw_root: PathBuf,
    /// Delete shard directories once reloaded (and on failure).
    pub cleanup: bool,
}

impl Default for ShardConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            num_shards: DEFAULT_NUM_SHARDS,
            clean_root: PathBuf::from(DEFAULT_CLEAN_SHARD_ROOT),
            raw_root: PathBuf::from(DEFAULT_RAW_SHARD_ROOT),
            cleanup: true,
        }
    }
}

/// Where corpus files are read from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FetchTarget {
    /// Hugging Face Hub, cached under `cache_dir` (or the client default).
    HuggingFace {
        cache_dir: Option<PathBuf>,
        token: Option<String>,
    },
    /// Local snapshot laid out like the remote repository.
    Local { root: PathBuf },
}

impl Default for FetchTarget {
    fn default() -> Self {
        FetchTarget::HuggingFace {
            cache_dir: None,
            token: None,
        }
    }
}

/// Which dataset registry receives the partitions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RegistryTarget {
    /// Filesystem registry rooted at `root`.
    Local { root: PathBuf },
    /// Remote registry service.
    Http {
        base_url: String,
        token: Option<String>,
    },
}

impl Default for RegistryTarget {
    fn default() -> Self {
        RegistryTarget::Local {
            root: PathBuf::from(DEFAULT_REGISTRY_DIR),
        }
    }
}

/// Fully resolved configuration of one pipeline run.
#[derive(Clone, Debug, PartialEq)]
pub struct RunConfig {
    /// Clean corpus variant (left side of the join).
    pub clean: CorpusSpec,
    /// Raw corpus variant (right side of the join).
    pub raw: CorpusSpec,
    /// Corpus file source.
    pub fetch: FetchTarget,
    /// Shard round-trip settings.
    pub shards: ShardConfig,
    /// Partition ratios.
    pub split: SplitRatios,
    /// Shuffle seed.
    pub seed: u64,
    /// Directory receiving `train.parquet`, `validate.parquet`, `test.parquet`.
    pub output_dir: PathBuf,
    /// Registry backend.
    pub registry: RegistryTarget,
    /// Project, dataset name, and lineage policy of the published version.
    pub publish: PublishTarget,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            clean: CorpusSpec::default(),
            raw: CorpusSpec {
                variant: RAW_VARIANT.to_string(),
                data_files: RAW_DATA_FILES.to_string(),
                ..CorpusSpec::default()
            },
            fetch: FetchTarget::default(),
            shards: ShardConfig::default(),
            split: SplitRatios::default(),
            seed: DEFAULT_SEED,
            output_dir: PathBuf::from("."),
            registry: RegistryTarget::default(),
            publish: PublishTarget::default(),
        }
    }
}

impl RunConfig {
    /// Check cross-field constraints before any work starts.
    pub fn validate(&self) -> Result<(), PipelineError> {
        self.split.normalized()?;
        if self.shards.enabled && self.shards.num_shards == 0 {
            return Err(PipelineError::Configuration(
                "num_shards must be at least 1".to_string(),
            ));
        }
        if self.shards.enabled && self.shards.clean_root == self.shards.raw_root {
            return Err(PipelineError::Configuration(format!(
                "clean and raw shard roots must differ (both {})",
                self.shards.clean_root.display()
            )));
        }
        for spec in [&self.clean, &self.raw] {
            if spec.dataset.trim().is_empty() || spec.variant.trim().is_empty() {
                return Err(PipelineError::Configuration(format!(
                    "corpus '{}' needs a dataset and a variant name",
                    spec.source_id()
                )));
            }
            spec.matcher()?;
        }
        if self.publish.project.trim().is_empty() || self.publish.name.trim().is_empty() {
            return Err(PipelineError::Configuration(
                "registry project and dataset name must be non-empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Parameter-override file.
///
/// Keys mirror the job's parameter set; each present key replaces the
/// matching field. The `*_dataset_name` keys only relabel row-count reporting;
/// the repository a variant is fetched from is set on the command line.
/// Changing a variant or split without naming files resets the file glob to
/// every shard of that split.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
#[allow(missing_docs)]
pub struct ParamOverrides {
    pub clean_dataset_name: Option<String>,
    pub clean_dataset_variant_name: Option<String>,
    pub clean_dataset_split: Option<String>,
    pub unclean_dataset_name: Option<String>,
    pub unclean_dataset_variant_name: Option<String>,
    pub unclean_dataset_split: Option<String>,
}

impl ParamOverrides {
    /// Parse a JSON override file.
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let raw = fs::read_to_string(path).map_err(|err| {
            PipelineError::Configuration(format!(
                "failed reading parameter file {}: {err}",
                path.display()
            ))
        })?;
        Self::from_json(&raw).map_err(|err| {
            PipelineError::Configuration(format!("{} in {}", err, path.display()))
        })
    }

    /// Parse overrides from a JSON string.
    pub fn from_json(raw: &str) -> Result<Self, PipelineError> {
        serde_json::from_str(raw)
            .map_err(|err| PipelineError::Configuration(format!("invalid parameter file: {err}")))
    }

    /// Apply present keys onto `config`.
    pub fn apply(&self, config: &mut RunConfig) {
        apply_corpus(
            &mut config.clean,
            &self.clean_dataset_name,
            &self.clean_dataset_variant_name,
            &self.clean_dataset_split,
        );
        apply_corpus(
            &mut config.raw,
            &self.unclean_dataset_name,
            &self.unclean_dataset_variant_name,
            &self.unclean_dataset_split,
        );
    }
}

fn apply_corpus(
    spec: &mut CorpusSpec,
    label: &Option<String>,
    variant: &Option<String>,
    split: &Option<String>,
) {
    if let Some(label) = label {
        spec.label = label.clone();
    }
    let mut reset_files = false;
    if let Some(variant) = variant
        && *variant != spec.variant
    {
        spec.variant = variant.clone();
        reset_files = true;
    }
    if let Some(split) = split
        && *split != spec.split
    {
        spec.split = split.clone();
        reset_files = true;
    }
    if reset_files {
        spec.data_files.clear();
    }
}

/// Everything a run needs: resolved configuration plus its collaborators.
pub struct RunContext {
    /// Resolved configuration.
    pub config: RunConfig,
    /// Registry receiving the published version.
    pub registry: Box<dyn DatasetRegistry>,
    /// Source of both corpus variants.
    pub fetcher: Box<dyn CorpusFetcher>,
}

impl RunContext {
    /// Assemble a context from explicit collaborators.
    pub fn new(
        config: RunConfig,
        registry: Box<dyn DatasetRegistry>,
        fetcher: Box<dyn CorpusFetcher>,
    ) -> Self {
        Self {
            config,
            registry,
            fetcher,
        }
    }

    /// Validate `config` and open the registry and fetcher it names.
    pub fn from_config(config: RunConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        let registry = open_registry(&config.registry)?;
        let fetcher = open_fetcher(&config.fetch)?;
        Ok(Self::new(config, registry, fetcher))
    }
}

/// Open the registry backend described by `target`.
pub fn open_registry(target: &RegistryTarget) -> Result<Box<dyn DatasetRegistry>, PipelineError> {
    Ok(match target {
        RegistryTarget::Local { root } => Box::new(LocalRegistry::open(root.clone())?),
        RegistryTarget::Http { base_url, token } => {
            Box::new(HttpRegistry::new(base_url.clone(), token.clone()))
        }
    })
}

/// Open the corpus fetcher described by `target`.
pub fn open_fetcher(target: &FetchTarget) -> Result<Box<dyn CorpusFetcher>, PipelineError> {
    match target {
        FetchTarget::Local { root } => Ok(Box::new(LocalFetcher::new(root.clone()))),
        #[cfg(feature = "huggingface")]
        FetchTarget::HuggingFace { cache_dir, token } => {
            Ok(Box::new(crate::source::HuggingFaceFetcher {
                cache_dir: cache_dir.clone(),
                token: token.clone(),
                ..crate::source::HuggingFaceFetcher::new()
            }))
        }
        #[cfg(not(feature = "huggingface"))]
        FetchTarget::HuggingFace { .. } => Err(PipelineError::Configuration(
            "built without the `huggingface` feature; use a local snapshot".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::corpus::{CLEAN_DATA_FILES, CLEAN_VARIANT, DEFAULT_DATASET};
    use tempfile::tempdir;

    #[test]
    fn defaults_match_the_c4_job() {
        let config = RunConfig::default();
        assert_eq!(config.clean.dataset, DEFAULT_DATASET);
        assert_eq!(config.clean.variant, CLEAN_VARIANT);
        assert_eq!(config.clean.data_files, CLEAN_DATA_FILES);
        assert_eq!(config.raw.variant, "en.noclean");
        assert_eq!(config.raw.split, "train");
        assert_eq!(config.shards.num_shards, 8);
        assert_eq!(config.seed, 42);
        assert_eq!(config.publish.project, "datasets/c4");
        assert_eq!(config.publish.name, "c4_raw_clean");
        config.validate().unwrap();
    }

    #[test]
    fn overrides_replace_only_present_keys() {
        let overrides = ParamOverrides::from_json(
            r#"{"clean_dataset_name": "mirror/c4", "unclean_dataset_split": "validation"}"#,
        )
        .unwrap();
        let mut config = RunConfig::default();
        overrides.apply(&mut config);

        assert_eq!(config.clean.dataset, DEFAULT_DATASET);
        assert_eq!(config.clean.label, "mirror/c4");
        assert_eq!(config.clean.data_files, CLEAN_DATA_FILES);
        assert_eq!(config.raw.dataset, DEFAULT_DATASET);
        assert_eq!(config.raw.split, "validation");
        assert_eq!(
            config.raw.effective_pattern(),
            "en.noclean/c4-validation.*.json.gz"
        );
    }

    #[test]
    fn dataset_name_keys_label_without_changing_the_repository() {
        let overrides = ParamOverrides::from_json(
            r#"{"clean_dataset_name": "c4", "unclean_dataset_name": "c4-noclean"}"#,
        )
        .unwrap();
        let mut config = RunConfig::default();
        overrides.apply(&mut config);

        assert_eq!(config.clean.dataset, DEFAULT_DATASET);
        assert_eq!(config.raw.dataset, DEFAULT_DATASET);
        assert_eq!(config.clean.label, "c4");
        assert_eq!(config.raw.label, "c4-noclean");
        assert_eq!(config.clean.source_id(), "allenai/c4:en");
    }

    #[test]
    fn unknown_override_keys_are_rejected() {
        let err = ParamOverrides::from_json(r#"{"clean_dataset": "x"}"#).unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));
    }

    #[test]
    fn override_file_is_loaded_from_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("params.json");
        fs::write(&path, r#"{"clean_dataset_variant_name": "realnewslike"}"#).unwrap();

        let overrides = ParamOverrides::load(&path).unwrap();

        assert_eq!(
            overrides.clean_dataset_variant_name.as_deref(),
            Some("realnewslike")
        );
        assert!(ParamOverrides::load(&dir.path().join("absent.json")).is_err());
    }

    #[test]
    fn validate_rejects_bad_shapes() {
        let mut config = RunConfig::default();
        config.shards.num_shards = 0;
        assert!(config.validate().is_err());

        let mut config = RunConfig::default();
        config.shards.raw_root = config.shards.clean_root.clone();
        assert!(config.validate().is_err());

        let mut config = RunConfig::default();
        config.split = SplitRatios {
            train: 0.5,
            validation: 0.2,
            test: 0.2,
        };
        assert!(config.validate().is_err());

        let mut config = RunConfig::default();
        config.shards.enabled = false;
        config.shards.num_shards = 0;
        config.validate().unwrap();
    }

    #[test]
    fn local_targets_open_without_network() {
        let dir = tempdir().unwrap();
        let mut config = RunConfig::default();
        config.registry = RegistryTarget::Local {
            root: dir.path().join("registry"),
        };
        config.fetch = FetchTarget::Local {
            root: dir.path().to_path_buf(),
        };

        let context = RunContext::from_config(config).unwrap();

        assert!(
            context
                .registry
                .list_versions("datasets/c4", "c4_raw_clean")
                .unwrap()
                .is_empty()
        );
    }
}
