use std::error::Error;
use std::path::PathBuf;

use clap::{Parser, error::ErrorKind};

use crate::config::{FetchTarget, ParamOverrides, RegistryTarget, RunConfig, RunContext};
use crate::constants::registry::REGISTRY_TOKEN_ENV;
use crate::pipeline::{RunReport, run};
use crate::registry::LineagePolicy;
use crate::splits::SplitRatios;

#[derive(Debug, Parser)]
#[command(
    name = "publish_corpus",
    version,
    disable_help_subcommand = true,
    about = "Build and publish a clean/raw paired corpus",
    long_about = "Fetch the clean and raw variants of a corpus, round-trip them through disk shards, join them on url, split 60/20/20 with a fixed seed, and publish train/validate/test parquet files as a new dataset version.",
    after_help = "Values resolve in order: built-in defaults, then --params file, then individual flags."
)]
struct PublishCorpusCli {
    #[arg(
        long,
        value_name = "FILE",
        help = "JSON parameter file (clean_dataset_name, clean_dataset_variant_name, clean_dataset_split, unclean_dataset_name, unclean_dataset_variant_name, unclean_dataset_split); *_dataset_name only labels row counts"
    )]
    params: Option<PathBuf>,
    #[arg(long = "clean-dataset", value_name = "REPO", help = "Dataset repository of the clean variant")]
    clean_dataset: Option<String>,
    #[arg(long = "clean-variant", value_name = "NAME", help = "Clean variant name")]
    clean_variant: Option<String>,
    #[arg(long = "clean-files", value_name = "GLOB", help = "Shard file glob for the clean variant")]
    clean_files: Option<String>,
    #[arg(long = "raw-dataset", value_name = "REPO", help = "Dataset repository of the raw variant")]
    raw_dataset: Option<String>,
    #[arg(long = "raw-variant", value_name = "NAME", help = "Raw variant name")]
    raw_variant: Option<String>,
    #[arg(long = "raw-files", value_name = "GLOB", help = "Shard file glob for the raw variant")]
    raw_files: Option<String>,
    #[arg(long, value_name = "NAME", help = "Split requested from both variants")]
    split: Option<String>,
    #[arg(
        long = "num-shards",
        value_parser = parse_positive_usize,
        help = "Shards per fetched table"
    )]
    num_shards: Option<usize>,
    #[arg(long = "no-shards", help = "Skip the shard round-trip stage")]
    no_shards: bool,
    #[arg(long = "keep-shards", help = "Leave shard directories on disk after reload")]
    keep_shards: bool,
    #[arg(long, help = "Shuffle seed")]
    seed: Option<u64>,
    #[arg(
        long = "split-ratios",
        value_name = "TRAIN,VALIDATION,TEST",
        value_parser = parse_split_ratios_arg,
        help = "Comma-separated split ratios that must sum to 1.0"
    )]
    split_ratios: Option<SplitRatios>,
    #[arg(long = "output-dir", value_name = "DIR", help = "Directory receiving the partition files")]
    output_dir: Option<PathBuf>,
    #[arg(long = "registry-dir", value_name = "DIR", help = "Filesystem registry root")]
    registry_dir: Option<PathBuf>,
    #[arg(
        long = "registry-url",
        value_name = "URL",
        conflicts_with = "registry_dir",
        help = "Remote registry base URL"
    )]
    registry_url: Option<String>,
    #[arg(
        long = "registry-token",
        value_name = "TOKEN",
        requires = "registry_url",
        help = "Bearer token for the remote registry (falls back to CORPUS_PAIRS_REGISTRY_TOKEN)"
    )]
    registry_token: Option<String>,
    #[arg(long, value_name = "PROJECT", help = "Registry project")]
    project: Option<String>,
    #[arg(long = "dataset-name", value_name = "NAME", help = "Registry dataset name")]
    dataset_name: Option<String>,
    #[arg(
        long,
        value_name = "POLICY",
        help = "Parent selection: latest-created or latest-finalized"
    )]
    lineage: Option<LineagePolicy>,
    #[arg(
        long = "local-snapshot",
        value_name = "DIR",
        help = "Read corpus files from a local snapshot instead of the Hugging Face Hub"
    )]
    local_snapshot: Option<PathBuf>,
}

fn build_config(cli: PublishCorpusCli) -> Result<RunConfig, Box<dyn Error>> {
    let mut config = RunConfig::default();
    // Repositories first so a label from the parameter file survives.
    if let Some(repo) = cli.clean_dataset {
        config.clean.set_dataset(repo);
    }
    if let Some(repo) = cli.raw_dataset {
        config.raw.set_dataset(repo);
    }
    if let Some(path) = &cli.params {
        ParamOverrides::load(path)?.apply(&mut config);
    }

    // A new variant or split invalidates the default file glob; explicit
    // --clean-files/--raw-files win over the reset.
    let overrides = ParamOverrides {
        clean_dataset_variant_name: cli.clean_variant,
        clean_dataset_split: cli.split.clone(),
        unclean_dataset_variant_name: cli.raw_variant,
        unclean_dataset_split: cli.split,
        ..ParamOverrides::default()
    };
    overrides.apply(&mut config);
    if let Some(files) = cli.clean_files {
        config.clean.data_files = files;
    }
    if let Some(files) = cli.raw_files {
        config.raw.data_files = files;
    }

    if let Some(num_shards) = cli.num_shards {
        config.shards.num_shards = num_shards;
    }
    config.shards.enabled = !cli.no_shards;
    config.shards.cleanup = !cli.keep_shards;
    config.seed = cli.seed.unwrap_or(config.seed);
    config.split = cli.split_ratios.unwrap_or(config.split);
    if let Some(dir) = cli.output_dir {
        config.output_dir = dir;
    }

    if let Some(base_url) = cli.registry_url {
        let token = cli
            .registry_token
            .or_else(|| std::env::var(REGISTRY_TOKEN_ENV).ok())
            .filter(|token| !token.trim().is_empty());
        config.registry = RegistryTarget::Http { base_url, token };
    } else if let Some(root) = cli.registry_dir {
        config.registry = RegistryTarget::Local { root };
    }
    if let Some(project) = cli.project {
        config.publish.project = project;
    }
    if let Some(name) = cli.dataset_name {
        config.publish.name = name;
    }
    config.publish.lineage = cli.lineage.unwrap_or(config.publish.lineage);

    if let Some(root) = cli.local_snapshot {
        config.fetch = FetchTarget::Local { root };
    }

    config.validate()?;
    Ok(config)
}

/// Parse `publish_corpus` arguments into a validated configuration.
///
/// Returns `Ok(None)` when `--help` or `--version` was printed.
pub fn resolve_config<I>(args_iter: I) -> Result<Option<RunConfig>, Box<dyn Error>>
where
    I: Iterator<Item = String>,
{
    let Some(cli) = parse_cli::<PublishCorpusCli, _>(
        std::iter::once("publish_corpus".to_string()).chain(args_iter),
    )?
    else {
        return Ok(None);
    };
    build_config(cli).map(Some)
}

fn print_parameters(config: &RunConfig) {
    println!("=== publish_corpus parameters ===");
    for (label, spec) in [("clean", &config.clean), ("raw", &config.raw)] {
        println!(
            "{label:<6} dataset={} ({}) variant={} split={} files={}",
            spec.dataset,
            spec.label,
            spec.variant,
            spec.split,
            spec.effective_pattern()
        );
    }
    if config.shards.enabled {
        println!(
            "shards {} per table under {} and {} (cleanup: {})",
            config.shards.num_shards,
            config.shards.clean_root.display(),
            config.shards.raw_root.display(),
            config.shards.cleanup
        );
    } else {
        println!("shards disabled");
    }
    println!(
        "split  train={:.2} validation={:.2} test={:.2} seed={}",
        config.split.train, config.split.validation, config.split.test, config.seed
    );
    println!(
        "target {}/{} lineage={}",
        config.publish.project, config.publish.name, config.publish.lineage
    );
}

fn print_summary(report: &RunReport) {
    println!("=== publish_corpus summary ===");
    println!(
        "rows   clean={} raw={} joined={}",
        report.clean_rows,
        report.raw_rows,
        report.joined_rows()
    );
    println!(
        "split  train={} validate={} test={}",
        report.train_rows, report.validate_rows, report.test_rows
    );
    println!(
        "version {} (parent: {})",
        report.version_id,
        report.parent_id.as_deref().unwrap_or("none")
    );
    for file in &report.files {
        println!("file   {}", file.display());
    }
}

/// Entry point of the `publish_corpus` binary.
pub fn run_publish_corpus<I>(args_iter: I) -> Result<(), Box<dyn Error>>
where
    I: Iterator<Item = String>,
{
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let Some(config) = resolve_config(args_iter)? else {
        return Ok(());
    };
    print_parameters(&config);
    let context = RunContext::from_config(config)?;
    let report = run(&context)?;
    print_summary(&report);
    Ok(())
}

fn parse_cli<T, I>(args: I) -> Result<Option<T>, Box<dyn Error>>
where
    T: Parser,
    I: IntoIterator,
    I::Item: Into<std::ffi::OsString> + Clone,
{
    match T::try_parse_from(args) {
        Ok(cli) => Ok(Some(cli)),
        Err(err) => match err.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                err.print()?;
                Ok(None)
            }
            _ => Err(err.into()),
        },
    }
}

fn parse_positive_usize(raw: &str) -> Result<usize, String> {
    let value = raw
        .parse::<usize>()
        .map_err(|_| format!("invalid value '{raw}': expected a positive integer"))?;
    if value == 0 {
        return Err("value must be at least 1".to_string());
    }
    Ok(value)
}

fn parse_split_ratios_arg(raw: &str) -> Result<SplitRatios, String> {
    let parts: Vec<&str> = raw.split(',').map(str::trim).collect();
    let [train, validation, test] = parts.as_slice() else {
        return Err("--split-ratios expects exactly 3 comma-separated values".to_string());
    };
    let parse = |label: &str, value: &str| {
        value
            .parse::<f32>()
            .map_err(|_| format!("invalid {label} ratio '{value}': must be a float"))
    };
    SplitRatios {
        train: parse("train", *train)?,
        validation: parse("validation", *validation)?,
        test: parse("test", *test)?,
    }
    .normalized()
    .map_err(|err| err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn args(list: &[&str]) -> impl Iterator<Item = String> {
        list.iter()
            .map(|value| value.to_string())
            .collect::<Vec<_>>()
            .into_iter()
    }

    #[test]
    fn no_flags_resolve_to_defaults() {
        let config = resolve_config(args(&[])).unwrap().unwrap();
        assert_eq!(config, RunConfig::default());
    }

    #[test]
    fn help_and_version_exit_cleanly() {
        assert!(resolve_config(args(&["--help"])).unwrap().is_none());
        assert!(resolve_config(args(&["--version"])).unwrap().is_none());
    }

    #[test]
    fn flags_override_params_file() {
        let dir = tempdir().unwrap();
        let params = dir.path().join("params.json");
        fs::write(
            &params,
            r#"{"clean_dataset_name": "c4", "unclean_dataset_name": "c4"}"#,
        )
        .unwrap();
        let params = params.to_string_lossy().to_string();

        let config = resolve_config(args(&[
            "--params",
            &params,
            "--raw-dataset",
            "other/corpus",
            "--num-shards",
            "3",
            "--keep-shards",
            "--split-ratios",
            "0.8,0.1,0.1",
            "--lineage",
            "latest-finalized",
            "--registry-dir",
            "/tmp/registry",
        ]))
        .unwrap()
        .unwrap();

        assert_eq!(config.clean.dataset, "allenai/c4");
        assert_eq!(config.raw.dataset, "other/corpus");
        assert_eq!(config.raw.label, "c4");
        assert_eq!(config.shards.num_shards, 3);
        assert!(!config.shards.cleanup);
        assert_eq!(config.split.train, 0.8);
        assert_eq!(config.publish.lineage, LineagePolicy::LatestFinalized);
        assert_eq!(
            config.registry,
            RegistryTarget::Local {
                root: PathBuf::from("/tmp/registry")
            }
        );
    }

    #[test]
    fn variant_flag_resets_glob_unless_files_given() {
        let config = resolve_config(args(&["--clean-variant", "realnewslike"]))
            .unwrap()
            .unwrap();
        assert_eq!(
            config.clean.effective_pattern(),
            "realnewslike/c4-train.*.json.gz"
        );

        let config = resolve_config(args(&[
            "--raw-variant",
            "en.noblocklist",
            "--raw-files",
            "en.noblocklist/c4-train.00000-*.json.gz",
        ]))
        .unwrap()
        .unwrap();
        assert_eq!(
            config.raw.effective_pattern(),
            "en.noblocklist/c4-train.00000-*.json.gz"
        );
    }

    #[test]
    fn registry_url_builds_http_target() {
        let config = resolve_config(args(&[
            "--registry-url",
            "http://registry.local",
            "--registry-token",
            "abc",
            "--local-snapshot",
            "/data/c4",
        ]))
        .unwrap()
        .unwrap();

        assert_eq!(
            config.registry,
            RegistryTarget::Http {
                base_url: "http://registry.local".to_string(),
                token: Some("abc".to_string()),
            }
        );
        assert_eq!(
            config.fetch,
            FetchTarget::Local {
                root: PathBuf::from("/data/c4")
            }
        );
    }

    #[test]
    fn invalid_flags_are_rejected() {
        assert!(resolve_config(args(&["--split-ratios", "0.5,0.5"])).is_err());
        assert!(resolve_config(args(&["--split-ratios", "0.5,0.4,0.4"])).is_err());
        assert!(resolve_config(args(&["--num-shards", "0"])).is_err());
        assert!(resolve_config(args(&["--lineage", "oldest"])).is_err());
        assert!(
            resolve_config(args(&["--registry-dir", "a", "--registry-url", "http://b"])).is_err()
        );
    }

    #[test]
    fn split_ratio_parser_trims_whitespace() {
        let ratios = parse_split_ratios_arg(" 0.6, 0.2 ,0.2").unwrap();
        assert_eq!(ratios, SplitRatios::default());
    }
}
