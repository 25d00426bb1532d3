#![cfg(feature = "huggingface")]

use std::fs;
use std::path::{Path, PathBuf};

use corpus_pairs::config::open_fetcher;
use corpus_pairs::source::read_listed_files;
use corpus_pairs::{CorpusSpec, FetchTarget, HuggingFaceFetcher, PipelineError, RunConfig};

#[test]
fn default_run_reads_from_the_hub() {
    let config = RunConfig::default();
    assert_eq!(
        config.fetch,
        FetchTarget::HuggingFace {
            cache_dir: None,
            token: None
        }
    );
    assert!(open_fetcher(&config.fetch).is_ok());
}

#[test]
fn fetcher_defaults_show_progress_without_token() {
    let fetcher = HuggingFaceFetcher::default();
    assert!(fetcher.progress);
    assert!(fetcher.token.is_none());
    assert!(fetcher.cache_dir.is_none());
}

fn write_lines(path: &Path, urls: &[&str]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let body: String = urls
        .iter()
        .map(|url| format!("{{\"url\":\"{url}\",\"text\":\"text of {url}\",\"timestamp\":\"t\"}}\n"))
        .collect();
    fs::write(path, body).unwrap();
}

fn siblings() -> Vec<String> {
    vec![
        "README.md".to_string(),
        "en/c4-train.00001.jsonl".to_string(),
        "en/c4-train.00000.jsonl".to_string(),
        "en.noclean/c4-train.00000.jsonl".to_string(),
    ]
}

#[test]
fn listed_files_are_filtered_resolved_and_read_in_path_order() {
    let temp = tempfile::tempdir().unwrap();
    let snapshot = temp.path().to_path_buf();
    write_lines(&snapshot.join("en/c4-train.00000.jsonl"), &["a", "b"]);
    write_lines(&snapshot.join("en/c4-train.00001.jsonl"), &["c"]);
    let spec = CorpusSpec::new("allenai/c4", "en", "en/c4-train.*.jsonl", "train");

    let mut resolved = Vec::new();
    let table = read_listed_files(&spec, &siblings(), |remote| {
        resolved.push(remote.to_string());
        Ok(snapshot.join(remote))
    })
    .unwrap();

    assert_eq!(
        resolved,
        vec!["en/c4-train.00000.jsonl", "en/c4-train.00001.jsonl"]
    );
    let urls: Vec<&str> = table.iter().map(|row| row.url.as_str()).collect();
    assert_eq!(urls, vec!["a", "b", "c"]);
}

#[test]
fn no_matching_sibling_is_unavailable_without_resolving() {
    let spec = CorpusSpec::new("allenai/c4", "en", "en/c4-validation.*.jsonl", "validation");

    let err = read_listed_files(&spec, &siblings(), |remote| {
        panic!("nothing should be resolved, got {remote}")
    })
    .unwrap_err();

    assert!(matches!(err, PipelineError::SourceUnavailable { .. }));
}

#[test]
fn resolved_path_that_does_not_exist_is_unavailable() {
    let temp = tempfile::tempdir().unwrap();
    let spec = CorpusSpec::new("allenai/c4", "en", "en/c4-train.00000.jsonl", "train");

    let err = read_listed_files(&spec, &siblings(), |remote| {
        Ok(temp.path().join("cache").join(remote))
    })
    .unwrap_err();

    match err {
        PipelineError::SourceUnavailable { source_id, reason } => {
            assert_eq!(source_id, "allenai/c4:en");
            assert!(reason.contains("does not exist"), "{reason}");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn resolver_failure_aborts_the_fetch() {
    let spec = CorpusSpec::new("allenai/c4", "en", "en/c4-train.*.jsonl", "train");

    let err = read_listed_files(&spec, &siblings(), |remote| -> Result<PathBuf, PipelineError> {
        Err(PipelineError::SourceUnavailable {
            source_id: "allenai/c4:en".to_string(),
            reason: format!("download of {remote} failed"),
        })
    })
    .unwrap_err();

    assert!(err.to_string().contains("download of en/c4-train.00000.jsonl failed"));
}
