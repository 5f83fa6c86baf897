use crate::analysis::ByteAnalysis;
use crate::bad_chars::BadCharSet;
use crate::batch::{BatchStatus, BatchSummary};
use crate::config::ModeConfig;
use crate::stats::{CorpusStatistics, FileRecord, ModeComparison, ModeStats};
use crate::verify::VerificationVerdict;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::fmt::Write as _;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Offsets listed per bad byte value before eliding the rest.
pub const MAX_LISTED_POSITIONS: usize = 10;
/// Strategies listed per mode in the text summary.
pub const TOP_STRATEGIES: usize = 20;

const RULE: &str = "================================================================================";
const THIN_RULE: &str = "--------------------------------------------------------------------------------";

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("I/O error writing report to {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to serialize assessment report: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

fn listed_positions(positions: &[usize]) -> String {
    let shown: Vec<String> = positions
        .iter()
        .take(MAX_LISTED_POSITIONS)
        .map(|p| p.to_string())
        .collect();
    let ellipsis = if positions.len() > MAX_LISTED_POSITIONS {
        "..."
    } else {
        ""
    };
    format!("[{}]{}", shown.join(", "), ellipsis)
}

fn write_analysis<W: Write>(
    out: &mut W,
    label: &str,
    path: &Path,
    analysis: &ByteAnalysis,
) -> io::Result<()> {
    writeln!(out, "{label} file: {}", path.display())?;
    writeln!(out, "{label} size: {} bytes", analysis.total_bytes)?;
    writeln!(
        out,
        "Bad characters in {}: {} ({:.2}%)",
        label.to_lowercase(),
        analysis.bad_char_count,
        analysis.bad_char_percentage
    )?;
    for (byte, positions) in &analysis.positions {
        writeln!(
            out,
            "  0x{byte:02x}: {} occurrences at positions {}",
            positions.len(),
            listed_positions(positions)
        )?;
    }
    if analysis.max_consecutive > 1 {
        writeln!(
            out,
            "Longest consecutive bad char sequence in {}: {} bytes",
            label.to_lowercase(),
            analysis.max_consecutive
        )?;
    }
    Ok(())
}

/// Human-readable rendering of one verification verdict.
pub fn write_verdict<W: Write>(
    out: &mut W,
    input: &Path,
    output: Option<&Path>,
    verdict: &VerificationVerdict,
) -> io::Result<()> {
    write_analysis(out, "Input", input, &verdict.original)?;

    let (Some(output), Some(processed)) = (output, verdict.processed.as_ref()) else {
        writeln!(out)?;
        writeln!(out, "No output file specified. Only analyzed input file.")?;
        let word = if verdict.passed { "PASS" } else { "FAIL" };
        writeln!(out, "Input file bad character check: {word}")?;
        return Ok(());
    };

    writeln!(out)?;
    write_analysis(out, "Output", output, processed)?;

    writeln!(out)?;
    writeln!(out, "{RULE}")?;
    writeln!(out, "VERIFICATION RESULTS")?;
    writeln!(out, "{RULE}")?;
    writeln!(out, "Original bad characters: {}", verdict.original.bad_char_count)?;
    writeln!(out, "Remaining bad characters: {}", processed.bad_char_count)?;
    if let Some(delta) = verdict.size_delta {
        writeln!(out, "Size change: {delta:+} bytes")?;
    }
    if verdict.passed {
        writeln!(out, "VERIFICATION PASSED: Output contains zero bad characters")
    } else {
        writeln!(
            out,
            "VERIFICATION FAILED: {} bad characters remain in the output",
            processed.bad_char_count
        )
    }
}

pub fn write_verify_header<W: Write>(out: &mut W, bad_chars: &BadCharSet) -> io::Result<()> {
    writeln!(out, "{RULE}")?;
    writeln!(out, "BAD CHARACTER ELIMINATION VERIFICATION")?;
    writeln!(out, "Bad characters: {bad_chars}")?;
    writeln!(out, "{RULE}")
}

pub fn write_batch_summary<W: Write>(out: &mut W, summary: &BatchSummary) -> io::Result<()> {
    for (i, entry) in summary.entries.iter().enumerate() {
        write!(out, "[{}/{}] {}: {}", i + 1, summary.total, entry.input.display(), entry.status)?;
        match (&entry.status, &entry.error) {
            (BatchStatus::Error, Some(message)) => writeln!(out, " - {message}")?,
            _ => writeln!(out)?,
        }
    }
    if summary.stopped_early {
        writeln!(out, "Stopped after first error (use --continue-on-error to continue)")?;
    }

    writeln!(out)?;
    writeln!(out, "{RULE}")?;
    writeln!(out, "BATCH VERIFICATION SUMMARY")?;
    writeln!(out, "{RULE}")?;
    writeln!(out, "Files discovered: {}", summary.total)?;
    writeln!(out, "Files processed: {}", summary.processed())?;
    writeln!(out, "Successful: {}", summary.successful)?;
    writeln!(out, "Failed: {}", summary.failed)?;
    writeln!(out, "Errors: {}", summary.errors)?;
    writeln!(out, "Success rate: {:.1}%", summary.success_rate())
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportMetadata {
    pub test_date: String,
    pub total_files: usize,
    pub total_size_bytes: u64,
    pub transformer_command: Vec<String>,
    pub source_directory: PathBuf,
    pub bad_chars: String,
    pub modes: Vec<ModeConfig>,
}

/// Everything written to disk after a corpus run.
#[derive(Debug, Clone, Serialize)]
pub struct AssessmentReport {
    pub metadata: ReportMetadata,
    pub tests: Vec<FileRecord>,
    pub statistics: Vec<ModeStats>,
    pub comparisons: Vec<ModeComparison>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportPaths {
    pub json: PathBuf,
    pub summary: PathBuf,
}

impl AssessmentReport {
    pub fn new(metadata: ReportMetadata, stats: CorpusStatistics) -> Self {
        let comparisons = stats.comparisons();
        Self {
            metadata,
            tests: stats.files,
            statistics: stats.modes,
            comparisons,
        }
    }

    /// Plain-text summary, identical to what is printed and saved.
    pub fn render_summary(&self) -> String {
        let total = self.tests.len() as u64;
        let mut s = String::new();
        let _ = writeln!(s, "{RULE}");
        let _ = writeln!(s, "BAD CHARACTER ELIMINATION ASSESSMENT SUMMARY");
        let modes: Vec<&str> = self.statistics.iter().map(|m| m.mode.as_str()).collect();
        let _ = writeln!(s, "Modes: {}", modes.join(", "));
        let _ = writeln!(s, "{RULE}");
        let _ = writeln!(s);
        let _ = writeln!(s, "Test Date: {}", self.metadata.test_date);
        let _ = writeln!(s, "Total Files Tested: {total}");
        let _ = writeln!(
            s,
            "Total Size: {:.2} MB",
            self.metadata.total_size_bytes as f64 / (1024.0 * 1024.0)
        );
        let _ = writeln!(s, "Bad characters: {}", self.metadata.bad_chars);
        let _ = writeln!(s);

        for mode in &self.statistics {
            let row = |count: u64| format!("{count} ({:.1}%)", percent(count, total));
            let _ = writeln!(s, "{} MODE RESULTS:", mode.mode.to_uppercase());
            let _ = writeln!(s, "  Successful (all eliminated): {}", row(mode.successful));
            let _ = writeln!(s, "  Bad bytes remaining:         {}", row(mode.nulls_remaining));
            let _ = writeln!(s, "  Failed (no output):          {}", row(mode.failed));
            let _ = writeln!(s, "  Errors:                      {}", row(mode.errors));
            let _ = writeln!(s, "  Timeouts:                    {}", row(mode.timed_out));
            let _ = writeln!(
                s,
                "  Average execution time:      {:.3} seconds",
                mode.average_execution_time()
            );
            let _ = writeln!(s);
        }

        let _ = writeln!(s, "BAD BYTE ANALYSIS:");
        for mode in &self.statistics {
            let _ = writeln!(
                s,
                "  Total bad bytes remaining ({}): {}",
                mode.mode, mode.total_null_bytes_found
            );
            let _ = writeln!(
                s,
                "  Files with bad bytes remaining ({}): {} ({:.1}%)",
                mode.mode,
                mode.files_with_nulls,
                percent(mode.files_with_nulls, total)
            );
        }
        let _ = writeln!(s);

        for mode in &self.statistics {
            let _ = writeln!(s, "STRATEGIES APPLIED ({}):", mode.mode.to_uppercase());
            for (strategy, count) in mode.top_strategies(TOP_STRATEGIES) {
                let _ = writeln!(s, "  {strategy}: {count} times");
            }
            let _ = writeln!(s);
        }

        for cmp in &self.comparisons {
            let _ = writeln!(s, "MODE COMPARISON ({} vs {}):", cmp.first, cmp.second);
            let _ = writeln!(
                s,
                "  {} better: {} files ({:.1}%)",
                cmp.first,
                cmp.first_better,
                percent(cmp.first_better, total)
            );
            let _ = writeln!(
                s,
                "  {} better: {} files ({:.1}%)",
                cmp.second,
                cmp.second_better,
                percent(cmp.second_better, total)
            );
            let _ = writeln!(
                s,
                "  Same result: {} files ({:.1}%)",
                cmp.same,
                percent(cmp.same, total)
            );
            let _ = writeln!(s);
            self.render_better_files(&mut s, &cmp.first, &cmp.second, &cmp.first_better_files);
            self.render_better_files(&mut s, &cmp.second, &cmp.first, &cmp.second_better_files);
        }

        let _ = writeln!(s, "{RULE}");
        s
    }

    fn render_better_files(&self, s: &mut String, winner: &str, loser: &str, files: &[String]) {
        if files.is_empty() {
            return;
        }
        let _ = writeln!(s, "FILES WHERE {} MODE WAS BETTER:", winner.to_uppercase());
        for record in self.tests.iter().filter(|t| files.contains(&t.filename)) {
            let status = |mode: &str| {
                record
                    .run_for(mode)
                    .map_or("MISSING", |run| run.status.as_str())
            };
            let _ = writeln!(s, "  {}: {} vs {}", record.filename, status(winner), status(loser));
        }
        let _ = writeln!(s);
    }

    /// Writes `assessment_<ts>.json` and `summary_<ts>.txt` into `dir`.
    pub fn write_to_dir(
        &self,
        dir: &Path,
        timestamp: DateTime<Local>,
    ) -> Result<ReportPaths, ReportError> {
        fs::create_dir_all(dir).map_err(|source| ReportError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let stamp = timestamp.format("%Y%m%d_%H%M%S");
        let paths = ReportPaths {
            json: dir.join(format!("assessment_{stamp}.json")),
            summary: dir.join(format!("summary_{stamp}.txt")),
        };

        let json = serde_json::to_string_pretty(self)?;
        fs::write(&paths.json, json).map_err(|source| ReportError::Io {
            path: paths.json.clone(),
            source,
        })?;

        let mut summary = self.render_summary();
        let _ = writeln!(summary, "Detailed results saved to: {}", paths.json.display());
        fs::write(&paths.summary, summary).map_err(|source| ReportError::Io {
            path: paths.summary.clone(),
            source,
        })?;

        Ok(paths)
    }
}

pub fn write_corpus_banner<W: Write>(
    out: &mut W,
    metadata: &ReportMetadata,
) -> io::Result<()> {
    writeln!(out, "{RULE}")?;
    writeln!(out, "BAD CHARACTER ELIMINATION ASSESSMENT")?;
    writeln!(out, "Transformer: {}", metadata.transformer_command.join(" "))?;
    writeln!(out, "{RULE}")?;
    writeln!(out, "Found {} files", metadata.total_files)?;
    writeln!(
        out,
        "Total size: {:.2} MB",
        metadata.total_size_bytes as f64 / (1024.0 * 1024.0)
    )?;
    writeln!(out, "{THIN_RULE}")
}
