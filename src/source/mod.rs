use flate2::read::MultiGzDecoder;
use globset::{GlobBuilder, GlobMatcher};
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use tracing::{debug, info};

use crate::columnar::read_rows_as;
use crate::constants::corpus::{
    CLEAN_DATA_FILES, CLEAN_VARIANT, DEFAULT_DATASET, DEFAULT_DATASET_LABEL, DEFAULT_SPLIT,
};
use crate::constants::source::{GZIP_EXTENSION, JSON_LINE_EXTENSIONS, PARQUET_EXTENSION};
use crate::data::{Record, Table};
use crate::errors::PipelineError;
use crate::types::{PathString, SourceId};

/// Hugging Face Hub backed fetcher.
#[cfg(feature = "huggingface")]
pub mod huggingface;
/// Local snapshot directory fetcher.
pub mod local;

#[cfg(feature = "huggingface")]
pub use huggingface::{HuggingFaceFetcher, read_listed_files};
pub use local::LocalFetcher;

/// Identity of one corpus variant to fetch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CorpusSpec {
    /// Dataset repository id, e.g. `allenai/c4`.
    pub dataset: String,
    /// Display name for row-count reporting, e.g. `c4`. Never used to fetch.
    pub label: String,
    /// Variant (config) name, e.g. `en` or `en.noclean`.
    pub variant: String,
    /// Glob restricting which remote shard files are pulled.
    ///
    /// Empty means every `.json.gz` file of the split under the variant directory.
    pub data_files: String,
    /// Split name, e.g. `train`.
    pub split: String,
    /// Optional repository revision (branch, tag, or commit).
    pub revision: Option<String>,
}

impl Default for CorpusSpec {
    fn default() -> Self {
        Self {
            dataset: DEFAULT_DATASET.to_string(),
            label: DEFAULT_DATASET_LABEL.to_string(),
            variant: CLEAN_VARIANT.to_string(),
            data_files: CLEAN_DATA_FILES.to_string(),
            split: DEFAULT_SPLIT.to_string(),
            revision: None,
        }
    }
}

fn dataset_label(dataset: &str) -> String {
    dataset
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .unwrap_or(dataset)
        .to_string()
}

impl CorpusSpec {
    /// Create a spec with explicit identity values and file glob.
    ///
    /// The label defaults to the last path segment of `dataset`.
    pub fn new(
        dataset: impl Into<String>,
        variant: impl Into<String>,
        data_files: impl Into<String>,
        split: impl Into<String>,
    ) -> Self {
        let dataset = dataset.into();
        Self {
            label: dataset_label(&dataset),
            dataset,
            variant: variant.into(),
            data_files: data_files.into(),
            split: split.into(),
            revision: None,
        }
    }

    /// Point the spec at another repository; the label follows the repo name.
    pub fn set_dataset(&mut self, dataset: impl Into<String>) {
        self.dataset = dataset.into();
        self.label = dataset_label(&self.dataset);
    }

    /// Stable id used in logs and errors (`dataset:variant`).
    pub fn source_id(&self) -> SourceId {
        format!("{}:{}", self.dataset, self.variant)
    }

    /// Glob actually applied to repository paths.
    pub fn effective_pattern(&self) -> String {
        if self.data_files.trim().is_empty() {
            format!("{}/c4-{}.*.json.gz", self.variant, self.split)
        } else {
            self.data_files.trim().to_string()
        }
    }

    /// Compile [`Self::effective_pattern`] into a matcher where `*` stops at `/`.
    pub fn matcher(&self) -> Result<GlobMatcher, PipelineError> {
        let pattern = self.effective_pattern();
        GlobBuilder::new(&pattern)
            .literal_separator(true)
            .build()
            .map(|glob| glob.compile_matcher())
            .map_err(|err| {
                PipelineError::Configuration(format!("invalid data_files glob '{pattern}': {err}"))
            })
    }

    /// Keep the candidate paths matching this spec's glob, sorted by path.
    ///
    /// Matching nothing is an error: the run cannot proceed without input.
    pub fn select_files(&self, candidates: &[PathString]) -> Result<Vec<PathString>, PipelineError> {
        if self.split.trim().is_empty() {
            return Err(PipelineError::Configuration(format!(
                "corpus '{}' has an empty split name",
                self.source_id()
            )));
        }
        let matcher = self.matcher()?;
        let mut selected: Vec<PathString> = candidates
            .iter()
            .filter(|path| matcher.is_match(path.as_str()))
            .cloned()
            .collect();
        selected.sort();
        selected.dedup();
        if selected.is_empty() {
            return Err(PipelineError::SourceUnavailable {
                source_id: self.source_id(),
                reason: format!(
                    "no files match '{}' for split '{}' ({} candidates listed)",
                    self.effective_pattern(),
                    self.split,
                    candidates.len()
                ),
            });
        }
        info!(
            "[corpus_pairs:fetch] {} files match '{}' for {} split '{}'",
            selected.len(),
            self.effective_pattern(),
            self.source_id(),
            self.split
        );
        Ok(selected)
    }
}

/// Retrieves the records of one corpus variant as an ordered table.
pub trait CorpusFetcher {
    /// Fetch every record of the files matching `spec`, in file-path order.
    fn fetch(&self, spec: &CorpusSpec) -> Result<Table, PipelineError>;
}

/// Decode one shard file into records.
///
/// Accepts `.json`/`.jsonl`/`.ndjson` (optionally gzip compressed, one JSON
/// object per line) and `.parquet`.
pub fn read_rows(path: &Path, source_id: &str) -> Result<Table, PipelineError> {
    let (format, gzipped) = shard_format(path);
    match format.as_deref() {
        Some(ext) if ext == PARQUET_EXTENSION && !gzipped => read_rows_as::<Record>(path),
        Some(ext) if JSON_LINE_EXTENSIONS.contains(&ext) => {
            let file = File::open(path).map_err(|err| PipelineError::SourceUnavailable {
                source_id: source_id.to_string(),
                reason: format!("failed opening shard {}: {err}", path.display()),
            })?;
            let reader: Box<dyn Read> = if gzipped {
                Box::new(MultiGzDecoder::new(BufReader::new(file)))
            } else {
                Box::new(file)
            };
            read_json_lines(BufReader::new(reader), path, source_id)
        }
        _ => Err(PipelineError::SourceUnavailable {
            source_id: source_id.to_string(),
            reason: format!("unsupported shard format: {}", path.display()),
        }),
    }
}

/// Resolve `(format extension, gzipped)` from a shard path.
fn shard_format(path: &Path) -> (Option<String>, bool) {
    let ext_of = |p: &Path| {
        p.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
    };
    match ext_of(path) {
        Some(ext) if ext == GZIP_EXTENSION => {
            let inner = path.file_stem().map(Path::new).and_then(ext_of);
            (inner, true)
        }
        other => (other, false),
    }
}

fn read_json_lines(
    reader: impl BufRead,
    path: &Path,
    source_id: &str,
) -> Result<Table, PipelineError> {
    let mut rows = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line.map_err(|err| PipelineError::SourceUnavailable {
            source_id: source_id.to_string(),
            reason: format!("failed reading {} line {}: {err}", path.display(), idx + 1),
        })?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let record: Record =
            serde_json::from_str(trimmed).map_err(|err| PipelineError::SourceInconsistent {
                source_id: source_id.to_string(),
                details: format!("{} line {}: {err}", path.display(), idx + 1),
            })?;
        rows.push(record);
    }
    debug!(
        "[corpus_pairs:fetch] decoded {} rows from {}",
        rows.len(),
        path.display()
    );
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::fs;
    use std::io::Write;
    use tempfile::tempdir;

    fn c4_line(url: &str, text: &str) -> String {
        format!(
            r#"{{"url":"{url}","text":"{text}","timestamp":"2019-04-25T12:57:54Z","extra":1}}"#
        )
    }

    #[test]
    fn character_class_globs_select_matching_shards_in_order() {
        let spec = CorpusSpec::default();
        let candidates = vec![
            "en/c4-train.00002-of-01024.json.gz".to_string(),
            "en/c4-train.00001-of-01024.json.gz".to_string(),
            "en/c4-train.00000-of-01024.json.gz".to_string(),
            "en.noclean/c4-train.00000-of-07168.json.gz".to_string(),
            "en/c4-validation.00000-of-00008.json.gz".to_string(),
        ];

        let selected = spec.select_files(&candidates).unwrap();

        assert_eq!(
            selected,
            vec![
                "en/c4-train.00000-of-01024.json.gz".to_string(),
                "en/c4-train.00001-of-01024.json.gz".to_string(),
            ]
        );
    }

    #[test]
    fn empty_data_files_defaults_to_variant_split_glob() {
        let spec = CorpusSpec::new("allenai/c4", "en.noclean", "", "validation");
        assert_eq!(
            spec.effective_pattern(),
            "en.noclean/c4-validation.*.json.gz"
        );
        let selected = spec
            .select_files(&[
                "en.noclean/c4-validation.00003-of-00064.json.gz".to_string(),
                "en.noclean/nested/c4-validation.00003-of-00064.json.gz".to_string(),
            ])
            .unwrap();
        assert_eq!(selected.len(), 1);
    }

    #[test]
    fn label_is_the_repository_name_unless_set() {
        assert_eq!(CorpusSpec::default().label, "c4");
        assert_eq!(CorpusSpec::new("mirror/c4-copy", "en", "", "train").label, "c4-copy");
        assert_eq!(CorpusSpec::new("local", "en", "", "train").label, "local");

        let mut spec = CorpusSpec::default();
        spec.set_dataset("other/corpus");
        assert_eq!(spec.dataset, "other/corpus");
        assert_eq!(spec.label, "corpus");
    }

    #[test]
    fn no_matching_files_is_an_error() {
        let spec = CorpusSpec::default();
        let err = spec.select_files(&["README.md".to_string()]).unwrap_err();
        assert!(matches!(err, PipelineError::SourceUnavailable { .. }));
    }

    #[test]
    fn reads_gzipped_json_lines_and_skips_blank_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("c4-train.00000-of-01024.json.gz");
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        writeln!(encoder, "{}", c4_line("https://a.example", "alpha")).unwrap();
        writeln!(encoder).unwrap();
        writeln!(encoder, "{}", c4_line("https://b.example", "beta")).unwrap();
        fs::write(&path, encoder.finish().unwrap()).unwrap();

        let rows = read_rows(&path, "test").unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].url, "https://a.example");
        assert_eq!(rows[1].text, "beta");
        assert_eq!(rows[1].timestamp, "2019-04-25T12:57:54Z");
    }

    #[test]
    fn reads_every_member_of_a_concatenated_gzip_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("c4-train.00000-of-01024.json.gz");
        let mut payload = Vec::new();
        for (url, text) in [("https://a", "alpha"), ("https://b", "beta")] {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            writeln!(encoder, "{}", c4_line(url, text)).unwrap();
            payload.extend(encoder.finish().unwrap());
        }
        fs::write(&path, payload).unwrap();

        let rows = read_rows(&path, "test").unwrap();

        let urls: Vec<&str> = rows.iter().map(|row| row.url.as_str()).collect();
        assert_eq!(urls, vec!["https://a", "https://b"]);
    }

    #[test]
    fn malformed_line_reports_file_and_line_number() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("part.jsonl");
        fs::write(
            &path,
            format!("{}\n{{\"url\":\"x\"}}\n", c4_line("https://a.example", "alpha")),
        )
        .unwrap();

        let err = read_rows(&path, "test").unwrap_err();
        match err {
            PipelineError::SourceInconsistent { details, .. } => {
                assert!(details.contains("line 2"), "{details}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unsupported_extension_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("notes.csv");
        fs::write(&path, "url,text\n").unwrap();
        assert!(matches!(
            read_rows(&path, "test"),
            Err(PipelineError::SourceUnavailable { .. })
        ));
    }
}
