use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::types::{DatasetName, SourceId};

/// Error type for fetch, shard, columnar, and registry failures.
///
/// Every variant is fatal for a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("corpus source '{source_id}' is unavailable: {reason}")]
    SourceUnavailable { source_id: SourceId, reason: String },
    #[error("corpus source '{source_id}' returned inconsistent rows: {details}")]
    SourceInconsistent {
        source_id: SourceId,
        details: String,
    },
    #[error("shard failure at {}: {reason}", path.display())]
    Shard { path: PathBuf, reason: String },
    #[error("columnar file failure at {}: {reason}", path.display())]
    Columnar { path: PathBuf, reason: String },
    #[error("inner join on url produced no rows ({left} clean rows, {right} raw rows)")]
    EmptyJoin { left: usize, right: usize },
    #[error("dataset registry failure for '{dataset}': {reason}")]
    Registry {
        dataset: DatasetName,
        reason: String,
    },
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("configuration error: {0}")]
    Configuration(String),
}
