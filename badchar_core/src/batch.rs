use crate::bad_chars::BadCharSet;
use crate::corpus::{self, DiscoveryError};
use crate::verify::{VerificationVerdict, verify_files};
use std::fmt;
use std::path::PathBuf;
use tracing::{info, warn};

/// Where to look and how to react to per-file errors.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub input_dir: PathBuf,
    /// Mirror of `input_dir` holding processed files. `None` audits inputs only.
    pub output_dir: Option<PathBuf>,
    pub recursive: bool,
    pub pattern: String,
    pub continue_on_error: bool,
}

impl BatchOptions {
    pub fn new(input_dir: impl Into<PathBuf>) -> Self {
        Self {
            input_dir: input_dir.into(),
            output_dir: None,
            recursive: false,
            pattern: default_pattern(),
            continue_on_error: false,
        }
    }
}

pub fn default_pattern() -> String {
    "*.bin".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    Success,
    Failed,
    Error,
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BatchStatus::Success => "SUCCESS",
            BatchStatus::Failed => "FAILED",
            BatchStatus::Error => "ERROR",
        })
    }
}

#[derive(Debug, Clone)]
pub struct BatchEntry {
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    pub status: BatchStatus,
    pub verdict: Option<VerificationVerdict>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct BatchSummary {
    /// Number of files discovered, including any left unprocessed.
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub errors: usize,
    pub entries: Vec<BatchEntry>,
    /// Set when an error halted the batch before every file was attempted.
    pub stopped_early: bool,
}

impl BatchSummary {
    pub fn processed(&self) -> usize {
        self.entries.len()
    }

    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.successful as f64 / self.total as f64 * 100.0
        }
    }

    fn record(&mut self, entry: BatchEntry) {
        match entry.status {
            BatchStatus::Success => self.successful += 1,
            BatchStatus::Failed => self.failed += 1,
            BatchStatus::Error => self.errors += 1,
        }
        self.entries.push(entry);
    }
}

/// Verifies every file matching the options, in discovery order.
///
/// A per-file error is recorded and, unless `continue_on_error` is set, ends
/// the batch right there. Only a failure to enumerate the input directory is
/// returned as `Err`.
pub fn batch_verify(
    options: &BatchOptions,
    bad_chars: &BadCharSet,
) -> Result<BatchSummary, DiscoveryError> {
    let files = corpus::discover(&options.input_dir, &options.pattern, options.recursive)?;
    info!(
        "Found {} files matching pattern '{}'",
        files.len(),
        options.pattern
    );

    let mut summary = BatchSummary {
        total: files.len(),
        ..Default::default()
    };
    if files.is_empty() {
        warn!("No files found matching the pattern");
        return Ok(summary);
    }

    for (index, file) in files.iter().enumerate() {
        let output = options
            .output_dir
            .as_ref()
            .map(|dir| dir.join(&file.relative_path));
        info!("[{}/{}] Processing: {}", index + 1, files.len(), file.name);

        let entry = match verify_files(&file.path, output.as_deref(), bad_chars) {
            Ok(verdict) => BatchEntry {
                input: file.path.clone(),
                output,
                status: if verdict.passed {
                    BatchStatus::Success
                } else {
                    BatchStatus::Failed
                },
                verdict: Some(verdict),
                error: None,
            },
            Err(e) => BatchEntry {
                input: file.path.clone(),
                output,
                status: BatchStatus::Error,
                verdict: None,
                error: Some(e.to_string()),
            },
        };

        let is_error = entry.status == BatchStatus::Error;
        match &entry.error {
            Some(message) => info!("  Status: {} - {}", entry.status, message),
            None => info!("  Status: {}", entry.status),
        }
        summary.record(entry);

        if is_error && !options.continue_on_error {
            warn!("Stopping due to error (use --continue-on-error to continue)");
            summary.stopped_early = index + 1 < files.len();
            break;
        }
    }

    Ok(summary)
}
