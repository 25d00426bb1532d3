#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

/// `publish_corpus` command-line runner.
pub mod app;
/// Parquet encoding of shard and partition files.
pub mod columnar;
/// Run configuration, override files, and run context.
pub mod config;
/// Centralized constants used across sources, shards, splits, and the registry.
pub mod constants;
/// Record, joined record, and partition types.
pub mod data;
mod hash;
/// Inner join of the clean and raw tables.
pub mod join;
/// End-to-end job orchestration.
pub mod pipeline;
/// Versioned dataset registry and publisher.
pub mod registry;
/// Disk shard round-trip of fetched tables.
pub mod shards;
/// Corpus fetchers and row decoding.
pub mod source;
/// Deterministic shuffle and partition cuts.
pub mod splits;
/// Shared type aliases.
pub mod types;

mod errors;

pub use config::{
    FetchTarget, ParamOverrides, RegistryTarget, RunConfig, RunContext, ShardConfig,
};
pub use data::{JoinedRecord, Partitions, Record, Table};
pub use errors::PipelineError;
pub use join::{JoinSummary, inner_join};
pub use pipeline::{RunReport, run};
pub use registry::{
    DatasetRegistry, DatasetVersion, HttpRegistry, LineagePolicy, LocalRegistry, PublishOutcome,
    PublishTarget, VersionFile, VersionStatus, create_dataset, publish,
};
pub use shards::{ShardSet, dataset_to_shard, shard_to_dataset};
#[cfg(feature = "huggingface")]
pub use source::HuggingFaceFetcher;
pub use source::{CorpusFetcher, CorpusSpec, LocalFetcher};
pub use splits::{DeterministicRng, SplitLabel, SplitRatios, split_rows};
pub use types::{DatasetName, DocId, DocUrl, PathString, ProjectName, SourceId, VersionId};
