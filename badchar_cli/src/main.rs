use badchar_core::bad_chars::BadCharSet;
use badchar_core::batch::{BatchOptions, BatchSummary, batch_verify, default_pattern};
use badchar_core::config::HarnessConfig;
use badchar_core::corpus::{self, discover};
use badchar_core::executor::TransformerExecutor;
use badchar_core::orchestrator::{Orchestrator, OrchestratorError};
use badchar_core::report::{self, AssessmentReport, ReportMetadata};
use badchar_core::stats::CorpusStatistics;
use badchar_core::verify::{VerificationVerdict, VerifyError, verify_files};

use clap::{Parser, Subcommand};
use std::io::{self, Write};
use std::path::PathBuf;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check transformer output (or a raw input) for bad characters.
    Verify {
        /// Input file, or directory for batch mode.
        input: PathBuf,
        /// Processed output file, or output directory in batch mode.
        output: Option<PathBuf>,
        #[clap(short = 'o', long = "output")]
        output_flag: Option<PathBuf>,
        #[clap(long, default_value = "00")]
        bad_chars: String,
        #[clap(short, long)]
        recursive: bool,
        #[clap(long, default_value_t = default_pattern())]
        pattern: String,
        #[clap(long)]
        continue_on_error: bool,
        #[clap(short, long)]
        verbose: bool,
    },
    /// Run the transformer over a corpus in every configured mode and compare.
    Assess {
        #[clap(short, long, value_parser)]
        config_file: Option<PathBuf>,
        #[clap(long)]
        transformer: Option<String>,
        #[clap(long)]
        corpus_dir: Option<PathBuf>,
        #[clap(long)]
        timeout_secs: Option<u64>,
        #[clap(long)]
        report_dir: Option<PathBuf>,
        #[clap(long)]
        bad_chars: Option<String>,
        #[clap(short, long)]
        verbose: bool,
    },
}

fn init_logging(verbose: bool) {
    let filter = if verbose { "badchar=debug" } else { "badchar=info" };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    let passed = match cli.command {
        Command::Verify {
            input,
            output,
            output_flag,
            bad_chars,
            recursive,
            pattern,
            continue_on_error,
            verbose,
        } => {
            init_logging(verbose);
            let bad_chars = BadCharSet::parse(&bad_chars);
            let output = resolve_output(output_flag, output);
            if input.is_dir() {
                let options = BatchOptions {
                    input_dir: input,
                    output_dir: output,
                    recursive,
                    pattern,
                    continue_on_error,
                };
                run_batch(&options, &bad_chars)?
            } else {
                run_single(input, output, &bad_chars)?
            }
        }
        Command::Assess {
            config_file,
            transformer,
            corpus_dir,
            timeout_secs,
            report_dir,
            bad_chars,
            verbose,
        } => {
            init_logging(verbose);
            let mut config = load_config(config_file)?;
            if let Some(transformer) = transformer {
                if config.transformer.command.is_empty() {
                    config.transformer.command.push(transformer);
                } else {
                    config.transformer.command[0] = transformer;
                }
            }
            if let Some(dir) = corpus_dir {
                config.corpus.directory = dir;
            }
            if let Some(secs) = timeout_secs {
                config.transformer.timeout_ms = secs.saturating_mul(1000);
            }
            if let Some(dir) = report_dir {
                config.report.directory = dir;
            }
            if let Some(list) = bad_chars {
                config.bad_chars = list;
            }
            run_assessment(&config)?
        }
    };

    if !passed {
        std::process::exit(1);
    }
    Ok(())
}

/// `-o/--output` takes precedence over the positional output path.
fn resolve_output(flag: Option<PathBuf>, positional: Option<PathBuf>) -> Option<PathBuf> {
    flag.or(positional)
}

/// Single-file mode passes only on a passing verdict; environment errors fail.
fn single_exit_ok(result: &Result<VerificationVerdict, VerifyError>) -> bool {
    result.as_ref().is_ok_and(|verdict| verdict.passed)
}

/// Directory mode passes when no file errored, whatever the individual verdicts.
fn batch_exit_ok(summary: &BatchSummary) -> bool {
    summary.errors == 0
}

/// A corpus run fails the process only when the transformer could not be started.
fn assessment_exit_ok<T>(result: &Result<T, OrchestratorError>) -> bool {
    !matches!(result, Err(OrchestratorError::Misconfigured(_)))
}

fn load_config(config_file: Option<PathBuf>) -> Result<HarnessConfig, anyhow::Error> {
    match config_file {
        Some(config_path) => {
            info!("Loading configuration from specified path: {config_path:?}");
            HarnessConfig::load_from_file(&config_path)
        }
        None => {
            let default_config_path = PathBuf::from("badchar.toml");
            if default_config_path.exists() {
                info!("No config file specified, loading default: {default_config_path:?}");
                HarnessConfig::load_from_file(&default_config_path)
            } else {
                info!("No config file specified and 'badchar.toml' not found, using defaults");
                Ok(HarnessConfig::default())
            }
        }
    }
}

fn run_single(
    input: PathBuf,
    output: Option<PathBuf>,
    bad_chars: &BadCharSet,
) -> Result<bool, anyhow::Error> {
    let mut stdout = io::stdout().lock();
    report::write_verify_header(&mut stdout, bad_chars)?;

    let result = verify_files(&input, output.as_deref(), bad_chars);
    match &result {
        Ok(verdict) => report::write_verdict(&mut stdout, &input, output.as_deref(), verdict)?,
        Err(e) => error!("{e}"),
    }
    Ok(single_exit_ok(&result))
}

fn run_batch(options: &BatchOptions, bad_chars: &BadCharSet) -> Result<bool, anyhow::Error> {
    let mut stdout = io::stdout().lock();
    report::write_verify_header(&mut stdout, bad_chars)?;

    let summary = batch_verify(options, bad_chars)?;
    report::write_batch_summary(&mut stdout, &summary)?;
    Ok(batch_exit_ok(&summary))
}

fn run_assessment(config: &HarnessConfig) -> Result<bool, anyhow::Error> {
    let bad_chars = config.bad_char_set();
    let files = discover(
        &config.corpus.directory,
        &config.corpus.pattern,
        config.corpus.recursive,
    )
    .map_err(|e| {
        anyhow::anyhow!(
            "Corpus directory {:?} is unusable: {}",
            config.corpus.directory,
            e
        )
    })?;

    let metadata = ReportMetadata {
        test_date: chrono::Local::now().to_rfc3339(),
        total_files: files.len(),
        total_size_bytes: corpus::total_size(&files),
        transformer_command: config.transformer.command.clone(),
        source_directory: config.corpus.directory.clone(),
        bad_chars: bad_chars.to_string(),
        modes: config.modes.clone(),
    };

    let mut stdout = io::stdout().lock();
    report::write_corpus_banner(&mut stdout, &metadata)?;
    if files.is_empty() {
        warn!(
            "No files matching '{}' found in {:?}",
            config.corpus.pattern, config.corpus.directory
        );
        return Ok(true);
    }

    let executor =
        TransformerExecutor::new(config.transformer.to_executor_config()).with_bad_chars(bad_chars);
    let stats = CorpusStatistics::new(config.modes.iter().map(|m| m.name.clone()));
    let mut orchestrator = Orchestrator::new(executor, config.modes.clone());

    let result = orchestrator.run_corpus(&files, stats);
    if !assessment_exit_ok(&result) {
        if let Err(e) = &result {
            error!("{e}");
        }
        return Ok(false);
    }
    let stats = result?;

    let assessment = AssessmentReport::new(metadata, stats);
    let paths = assessment.write_to_dir(&config.report.directory, chrono::Local::now())?;
    info!("Saved results to {:?} and {:?}", paths.json, paths.summary);

    writeln!(stdout, "{}", assessment.render_summary())?;
    writeln!(stdout, "Detailed results saved to: {}", paths.json.display())?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use badchar_core::batch::{BatchEntry, BatchStatus};
    use badchar_core::executor::ExecutorError;
    use badchar_core::verify::verify;

    fn entry(name: &str, status: BatchStatus) -> BatchEntry {
        BatchEntry {
            input: PathBuf::from(name),
            output: None,
            status,
            verdict: None,
            error: None,
        }
    }

    #[test]
    fn output_flag_wins_over_positional() {
        let flag = Some(PathBuf::from("flag.bin"));
        let positional = Some(PathBuf::from("positional.bin"));
        assert_eq!(resolve_output(flag.clone(), positional.clone()), flag);
        assert_eq!(resolve_output(None, positional.clone()), positional);
        assert_eq!(resolve_output(None, None), None);
    }

    #[test]
    fn single_file_exit_follows_verdict_and_environment() {
        let nulls = BadCharSet::default();
        assert!(single_exit_ok(&Ok(verify(b"\x00", Some(b"\x90"), &nulls))));
        assert!(!single_exit_ok(&Ok(verify(b"\x00", Some(b"\x00"), &nulls))));
        assert!(!single_exit_ok(&Err(VerifyError::MissingOutput(PathBuf::from(
            "out.bin"
        )))));
    }

    #[test]
    fn batch_with_failed_files_but_no_errors_passes() {
        let summary = BatchSummary {
            total: 2,
            successful: 1,
            failed: 1,
            errors: 0,
            entries: vec![
                entry("a.bin", BatchStatus::Success),
                entry("b.bin", BatchStatus::Failed),
            ],
            stopped_early: false,
        };
        assert!(batch_exit_ok(&summary));
    }

    #[test]
    fn batch_with_any_error_fails() {
        let summary = BatchSummary {
            total: 3,
            successful: 2,
            failed: 0,
            errors: 1,
            entries: vec![
                entry("a.bin", BatchStatus::Success),
                entry("b.bin", BatchStatus::Error),
                entry("c.bin", BatchStatus::Success),
            ],
            stopped_early: false,
        };
        assert!(!batch_exit_ok(&summary));
    }

    #[test]
    fn only_an_unstartable_transformer_fails_assessment() {
        let misconfigured: Result<(), _> = Err(OrchestratorError::Misconfigured(
            ExecutorError::EmptyCommand,
        ));
        assert!(!assessment_exit_ok(&misconfigured));
        assert!(assessment_exit_ok(&Ok::<(), OrchestratorError>(())));
        let workspace: Result<(), _> = Err(OrchestratorError::Workspace("full".to_string()));
        assert!(assessment_exit_ok(&workspace));
    }
}
