use crate::splits::SplitLabel;

/// Column names shared by shard files and partition files.
pub mod columns {
    /// Document URL (join key).
    pub const URL: &str = "url";
    /// Document body of a fetched record.
    pub const TEXT: &str = "text";
    /// Crawl timestamp.
    pub const TIMESTAMP: &str = "timestamp";
    /// Body taken from the clean variant.
    pub const CLEAN: &str = "clean";
    /// Body taken from the raw variant.
    pub const RAW: &str = "raw";
    /// Dense post-join row index.
    pub const DOC_ID: &str = "doc_id";
}

/// Constants used by corpus fetchers and row decoding.
pub mod source {
    /// File extensions decoded as one JSON object per line.
    pub const JSON_LINE_EXTENSIONS: [&str; 3] = ["json", "jsonl", "ndjson"];
    /// Extension decoded as gzip before line parsing.
    pub const GZIP_EXTENSION: &str = "gz";
    /// Extension decoded through the parquet row reader.
    pub const PARQUET_EXTENSION: &str = "parquet";
    /// Number of download attempts handed to the hf-hub client.
    pub const HF_HUB_RETRIES: usize = 5;
}

/// Constants used by the shard round-trip stage.
pub mod shards {
    /// Default shard count per fetched table.
    pub const DEFAULT_NUM_SHARDS: usize = 8;
    /// Default shard root for the clean variant.
    pub const DEFAULT_CLEAN_SHARD_ROOT: &str = "/tmp/cleaned_dataset";
    /// Default shard root for the raw variant.
    pub const DEFAULT_RAW_SHARD_ROOT: &str = "/tmp/uncleaned_dataset";
    /// Prefix of each shard subdirectory (`shard_0`, `shard_1`, ...).
    pub const SHARD_DIR_PREFIX: &str = "shard_";
    /// Parquet payload filename inside a shard directory.
    pub const SHARD_DATA_FILE: &str = "data.parquet";
    /// Shard bookkeeping filename inside a shard directory.
    pub const SHARD_STATE_FILE: &str = "state.json";
}

/// Constants used by the split engine.
pub mod splits {
    use super::SplitLabel;

    /// Seed used for the deterministic row shuffle.
    pub const DEFAULT_SEED: u64 = 42;
    /// Basis-point scale used to turn ratios into integer cut products.
    pub const RATIO_SCALE: u64 = 10_000;
    /// Canonical partition order used when writing and publishing.
    pub const ALL_SPLITS: [SplitLabel; 3] =
        [SplitLabel::Train, SplitLabel::Validation, SplitLabel::Test];
}

/// Constants used by the dataset registry and publisher.
pub mod registry {
    /// Default registry project.
    pub const DEFAULT_PROJECT: &str = "datasets/c4";
    /// Default dataset name.
    pub const DEFAULT_DATASET_NAME: &str = "c4_raw_clean";
    /// Default directory for the filesystem registry.
    pub const DEFAULT_REGISTRY_DIR: &str = ".dataset_registry";
    /// Directory under the registry root holding one subdirectory per version.
    pub const VERSIONS_DIR: &str = "versions";
    /// Manifest filename inside a version directory.
    pub const VERSION_MANIFEST_FILE: &str = "version.json";
    /// Directory inside a version directory holding uploaded files.
    pub const VERSION_FILES_DIR: &str = "files";
    /// HTTP path prefix for registry version resources.
    pub const HTTP_VERSIONS_PATH: &str = "datasets/versions";
    /// Environment variable holding the HTTP registry bearer token.
    pub const REGISTRY_TOKEN_ENV: &str = "CORPUS_PAIRS_REGISTRY_TOKEN";
}

/// Constants describing the default corpus pair.
pub mod corpus {
    /// Hugging Face dataset id for both variants.
    pub const DEFAULT_DATASET: &str = "allenai/c4";
    /// Display name used when reporting row counts.
    pub const DEFAULT_DATASET_LABEL: &str = "c4";
    /// Clean variant name.
    pub const CLEAN_VARIANT: &str = "en";
    /// Raw (unfiltered) variant name.
    pub const RAW_VARIANT: &str = "en.noclean";
    /// Default split requested from both variants.
    pub const DEFAULT_SPLIT: &str = "train";
    /// Remote shard glob for the clean variant.
    pub const CLEAN_DATA_FILES: &str = "en/c4-train.0000[0-1]-of-01024.json.gz";
    /// Remote shard glob for the raw variant.
    pub const RAW_DATA_FILES: &str = "en.noclean/c4-train.0000[0-1]-of-07168.json.gz";
}
