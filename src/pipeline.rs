//! The end-to-end job: fetch both variants, round-trip them through shards,
//! join, split, write partition files, and publish them as a new version.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;

use crate::columnar::write_partitions;
use crate::config::{RunConfig, RunContext};
use crate::data::Table;
use crate::errors::PipelineError;
use crate::join::{JoinSummary, inner_join};
use crate::registry::publish;
use crate::shards::round_trip;
use crate::source::CorpusSpec;
use crate::splits::split_rows;
use crate::types::VersionId;

/// What one run produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunReport {
    /// Rows fetched from the clean variant.
    pub clean_rows: usize,
    /// Rows fetched from the raw variant.
    pub raw_rows: usize,
    /// Join accounting.
    pub join: JoinSummary,
    /// Rows in `train.parquet`.
    pub train_rows: usize,
    /// Rows in `validate.parquet`.
    pub validate_rows: usize,
    /// Rows in `test.parquet`.
    pub test_rows: usize,
    /// Id of the finalized version holding the partitions.
    pub version_id: VersionId,
    /// Parent the version was linked to, if any.
    pub parent_id: Option<VersionId>,
    /// Partition files written locally, in train/validate/test order.
    pub files: Vec<PathBuf>,
}

impl RunReport {
    /// Rows in the joined table (equal to the sum of the partitions).
    pub fn joined_rows(&self) -> usize {
        self.join.joined_rows
    }
}

fn fetch_variant(
    context: &RunContext,
    spec: &CorpusSpec,
    label: &str,
) -> Result<Table, PipelineError> {
    let started = Instant::now();
    info!(
        "[corpus_pairs:fetch] {} variant: {} split={} files={}",
        label,
        spec.source_id(),
        spec.split,
        spec.effective_pattern()
    );
    let table = context.fetcher.fetch(spec)?;
    info!(
        "[corpus_pairs:fetch] Number of samples in {} dataset ({}): {} ({:.1}s)",
        spec.label,
        label,
        table.len(),
        started.elapsed().as_secs_f64()
    );
    Ok(table)
}

fn materialize(
    config: &RunConfig,
    table: Table,
    shard_root: &Path,
    label: &str,
) -> Result<Table, PipelineError> {
    if !config.shards.enabled {
        return Ok(table);
    }
    let reloaded = round_trip(
        &table,
        shard_root,
        config.shards.num_shards,
        config.shards.cleanup,
    )?;
    info!(
        "[corpus_pairs:shards] {} dataset after round-trip: {} rows, columns [url, text, timestamp]",
        label,
        reloaded.len()
    );
    Ok(reloaded)
}

/// Run the whole job against the collaborators in `context`.
///
/// Stages run sequentially and every failure aborts the run. Shard directories
/// are removed on failure when cleanup is enabled, and a version created by
/// this run is discarded if publishing does not complete.
pub fn run(context: &RunContext) -> Result<RunReport, PipelineError> {
    let config = &context.config;
    config.validate()?;
    let started = Instant::now();

    let clean = fetch_variant(context, &config.clean, "clean")?;
    let raw = fetch_variant(context, &config.raw, "raw")?;
    let clean_rows = clean.len();
    let raw_rows = raw.len();

    let clean = materialize(config, clean, &config.shards.clean_root, "clean")?;
    let raw = materialize(config, raw, &config.shards.raw_root, "raw")?;

    let (joined, join) = inner_join(&clean, &raw);
    drop(clean);
    drop(raw);
    if joined.is_empty() {
        return Err(PipelineError::EmptyJoin {
            left: join.left_rows,
            right: join.right_rows,
        });
    }
    info!(
        "[corpus_pairs:join] joined dataset: {} rows, columns [url, timestamp, clean, raw, doc_id]",
        joined.len()
    );

    let partitions = split_rows(joined, config.split, config.seed)?;

    fs::create_dir_all(&config.output_dir)?;
    let files = write_partitions(&config.output_dir, &partitions)?;

    let outcome = publish(context.registry.as_ref(), &config.publish, &files)?;
    info!(
        "[corpus_pairs:pipeline] published {}/{} version {} (parent: {}) in {:.1}s",
        outcome.version.project,
        outcome.version.name,
        outcome.version.id,
        outcome.parent.as_deref().unwrap_or("none"),
        started.elapsed().as_secs_f64()
    );

    Ok(RunReport {
        clean_rows,
        raw_rows,
        join,
        train_rows: partitions.train.len(),
        validate_rows: partitions.validate.len(),
        test_rows: partitions.test.len(),
        version_id: outcome.version.id,
        parent_id: outcome.parent,
        files,
    })
}
