//! Disk-materialized chunking of corpus tables.
//!
//! A table is cut into `num_shards` contiguous index ranges, each persisted as
//! `<root>/shard_<i>/data.parquet` with a `state.json` row-count record, then
//! reloaded in shard order. The reloaded table equals the input row for row.

use serde::{Deserialize, Serialize};
use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::columnar::{read_records, write_records};
use crate::constants::shards::{SHARD_DATA_FILE, SHARD_DIR_PREFIX, SHARD_STATE_FILE};
use crate::data::{Record, Table};
use crate::errors::PipelineError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
struct ShardState {
    index: usize,
    num_shards: usize,
    num_rows: usize,
}

/// Row range held by shard `index` when `total` rows are cut into `num_shards`.
///
/// The first `total % num_shards` shards hold one extra row.
pub fn shard_bounds(total: usize, num_shards: usize, index: usize) -> Range<usize> {
    let per_shard = total / num_shards;
    let extra = total % num_shards;
    let start = index * per_shard + index.min(extra);
    let end = start + per_shard + usize::from(index < extra);
    start..end
}

/// Directory of shard `index` under `root`.
pub fn shard_dir(root: &Path, index: usize) -> PathBuf {
    root.join(format!("{SHARD_DIR_PREFIX}{index}"))
}

fn shard_err(path: &Path, reason: impl Into<String>) -> PipelineError {
    PipelineError::Shard {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

fn ensure_shard_count(num_shards: usize) -> Result<(), PipelineError> {
    if num_shards == 0 {
        return Err(PipelineError::Configuration(
            "num_shards must be at least 1".to_string(),
        ));
    }
    Ok(())
}

/// Shards written by [`dataset_to_shard`].
#[derive(Clone, Debug)]
pub struct ShardSet {
    root: PathBuf,
    num_shards: usize,
    rows: usize,
}

impl ShardSet {
    /// Root directory holding the shard subdirectories.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of shards written.
    pub fn num_shards(&self) -> usize {
        self.num_shards
    }

    /// Total rows across all shards.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Reload all shards in order (see [`shard_to_dataset`]).
    pub fn reload(&self) -> Result<Table, PipelineError> {
        shard_to_dataset(&self.root, self.num_shards)
    }

    /// Delete every shard directory of this set. The root itself is kept.
    pub fn remove(&self) -> Result<(), PipelineError> {
        for index in 0..self.num_shards {
            let dir = shard_dir(&self.root, index);
            if dir.exists() {
                fs::remove_dir_all(&dir)?;
            }
        }
        info!(
            "[corpus_pairs:shards] removed {} shards under {}",
            self.num_shards,
            self.root.display()
        );
        Ok(())
    }
}

/// Remove `shard_*` directories left under `root` by earlier runs.
fn clear_stale_shards(root: &Path) -> Result<(), PipelineError> {
    if !root.is_dir() {
        return Ok(());
    }
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        let is_shard = entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with(SHARD_DIR_PREFIX));
        if is_shard && entry.file_type()?.is_dir() {
            fs::remove_dir_all(entry.path())?;
        }
    }
    Ok(())
}

/// Persist `table` as `num_shards` contiguous shards under `shard_root`.
pub fn dataset_to_shard(
    table: &[Record],
    shard_root: &Path,
    num_shards: usize,
) -> Result<ShardSet, PipelineError> {
    ensure_shard_count(num_shards)?;
    clear_stale_shards(shard_root)?;
    fs::create_dir_all(shard_root)?;

    for index in 0..num_shards {
        let range = shard_bounds(table.len(), num_shards, index);
        let dir = shard_dir(shard_root, index);
        fs::create_dir_all(&dir)?;
        write_records(&dir.join(SHARD_DATA_FILE), &table[range.clone()])?;
        let state = ShardState {
            index,
            num_shards,
            num_rows: range.len(),
        };
        let state_path = dir.join(SHARD_STATE_FILE);
        let payload = serde_json::to_vec_pretty(&state)
            .map_err(|err| shard_err(&state_path, format!("failed encoding state: {err}")))?;
        fs::write(&state_path, payload)?;
    }

    info!(
        "[corpus_pairs:shards] wrote {} rows as {} shards under {}",
        table.len(),
        num_shards,
        shard_root.display()
    );
    Ok(ShardSet {
        root: shard_root.to_path_buf(),
        num_shards,
        rows: table.len(),
    })
}

fn load_shard(root: &Path, index: usize, num_shards: usize) -> Result<Table, PipelineError> {
    let dir = shard_dir(root, index);
    let state_path = dir.join(SHARD_STATE_FILE);
    let data_path = dir.join(SHARD_DATA_FILE);
    if !state_path.is_file() || !data_path.is_file() {
        return Err(shard_err(&dir, "shard directory is missing or incomplete"));
    }

    let state: ShardState = fs::read(&state_path)
        .map_err(PipelineError::from)
        .and_then(|bytes| {
            serde_json::from_slice(&bytes)
                .map_err(|err| shard_err(&state_path, format!("corrupt shard state: {err}")))
        })?;
    if state.index != index || state.num_shards != num_shards {
        return Err(shard_err(
            &state_path,
            format!(
                "shard state describes shard {} of {}, expected {} of {}",
                state.index, state.num_shards, index, num_shards
            ),
        ));
    }

    let rows = read_records(&data_path).map_err(|err| shard_err(&data_path, err.to_string()))?;
    if rows.len() != state.num_rows {
        return Err(shard_err(
            &data_path,
            format!(
                "shard holds {} rows, state records {}",
                rows.len(),
                state.num_rows
            ),
        ));
    }
    Ok(rows)
}

/// Reload shards `0..num_shards` under `shard_root` and concatenate them.
///
/// Any missing or corrupt shard aborts the reload.
pub fn shard_to_dataset(shard_root: &Path, num_shards: usize) -> Result<Table, PipelineError> {
    ensure_shard_count(num_shards)?;
    let mut table = Table::new();
    for index in 0..num_shards {
        table.extend(load_shard(shard_root, index, num_shards)?);
    }
    info!(
        "[corpus_pairs:shards] reloaded {} rows from {} shards under {}",
        table.len(),
        num_shards,
        shard_root.display()
    );
    Ok(table)
}

/// Write `table` as shards, reload it, and optionally delete the shards.
///
/// With `cleanup`, shard directories are removed on failure as well.
pub fn round_trip(
    table: &[Record],
    shard_root: &Path,
    num_shards: usize,
    cleanup: bool,
) -> Result<Table, PipelineError> {
    let written = dataset_to_shard(table, shard_root, num_shards);
    let set = match written {
        Ok(set) => set,
        Err(err) => {
            if cleanup && let Err(clean_err) = clear_stale_shards(shard_root) {
                warn!(
                    "[corpus_pairs:shards] failed removing partial shards under {}: {clean_err}",
                    shard_root.display()
                );
            }
            return Err(err);
        }
    };

    let reloaded = set.reload();
    if cleanup && let Err(clean_err) = set.remove() {
        warn!(
            "[corpus_pairs:shards] failed removing shards under {}: {clean_err}",
            shard_root.display()
        );
    }
    reloaded
}
