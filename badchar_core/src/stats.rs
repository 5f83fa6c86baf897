use crate::executor::ProcessOutcome;
use crate::observer::TransformerStats;
use crate::oracle::RunStatus;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Longest stderr excerpt kept per run.
pub const MAX_STDERR_LEN: usize = 2000;

/// One transformer run for one file under one mode, as recorded in the report.
#[derive(Debug, Clone, Serialize)]
pub struct ModeRun {
    pub mode: String,
    pub status: RunStatus,
    pub execution_time: f64,
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
    pub timed_out: bool,
    pub output: String,
    pub error: String,
    pub nulls_in_original: Option<usize>,
    pub nulls_remaining: Option<usize>,
    pub parsed_stats: TransformerStats,
    /// Set when the harness itself failed around this run.
    pub harness_error: Option<String>,
}

impl ModeRun {
    pub fn from_outcome(
        mode: &str,
        status: RunStatus,
        outcome: ProcessOutcome,
        parsed_stats: TransformerStats,
    ) -> Self {
        Self {
            mode: mode.to_string(),
            status,
            execution_time: outcome.duration.as_secs_f64(),
            exit_code: outcome.exit_code,
            signal: outcome.signal,
            timed_out: outcome.timed_out,
            output: outcome.stdout,
            error: outcome.stderr.chars().take(MAX_STDERR_LEN).collect(),
            nulls_in_original: outcome.bad_bytes_in_original,
            nulls_remaining: outcome.bad_bytes_remaining,
            parsed_stats,
            harness_error: None,
        }
    }

    /// A run that never produced an outcome because the harness failed.
    pub fn harness_failure(mode: &str, message: String) -> Self {
        Self {
            mode: mode.to_string(),
            status: RunStatus::Error,
            execution_time: 0.0,
            exit_code: None,
            signal: None,
            timed_out: false,
            output: String::new(),
            error: message.clone(),
            nulls_in_original: None,
            nulls_remaining: None,
            parsed_stats: TransformerStats::default(),
            harness_error: Some(message),
        }
    }
}

/// All runs for one corpus file, in mode order.
#[derive(Debug, Clone, Serialize)]
pub struct FileRecord {
    /// 1-based position in the corpus.
    pub index: usize,
    pub filename: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    /// `None` when the file could not be read for hashing.
    pub md5: Option<String>,
    pub runs: Vec<ModeRun>,
}

impl FileRecord {
    pub fn run_for(&self, mode: &str) -> Option<&ModeRun> {
        self.runs.iter().find(|r| r.mode == mode)
    }

    fn succeeded_in(&self, mode: &str) -> bool {
        self.run_for(mode).is_some_and(|r| r.status.is_success())
    }
}

/// Corpus-wide totals for one mode.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ModeStats {
    pub mode: String,
    pub successful: u64,
    pub nulls_remaining: u64,
    pub failed: u64,
    pub errors: u64,
    pub timed_out: u64,
    pub total_instructions: u64,
    pub total_null_bytes_found: u64,
    pub files_with_nulls: u64,
    pub strategies_used: BTreeMap<String, u64>,
    pub total_execution_time: f64,
}

impl ModeStats {
    pub fn new(mode: impl Into<String>) -> Self {
        Self {
            mode: mode.into(),
            ..Default::default()
        }
    }

    pub fn runs(&self) -> u64 {
        self.successful + self.nulls_remaining + self.failed + self.errors + self.timed_out
    }

    pub fn average_execution_time(&self) -> f64 {
        match self.runs() {
            0 => 0.0,
            n => self.total_execution_time / n as f64,
        }
    }

    /// Strategies by descending use, ties broken by name.
    pub fn top_strategies(&self, limit: usize) -> Vec<(&str, u64)> {
        let mut ranked: Vec<(&str, u64)> = self
            .strategies_used
            .iter()
            .map(|(name, count)| (name.as_str(), *count))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
        ranked.truncate(limit);
        ranked
    }

    fn record(&mut self, run: &ModeRun) {
        match run.status {
            RunStatus::Success => self.successful += 1,
            RunStatus::NullsRemaining => self.nulls_remaining += 1,
            RunStatus::Failed => self.failed += 1,
            RunStatus::Error => self.errors += 1,
            RunStatus::Timeout => self.timed_out += 1,
        }
        self.total_instructions += run.parsed_stats.instructions_disassembled;
        if let Some(remaining) = run.nulls_remaining {
            self.total_null_bytes_found += remaining as u64;
            if remaining > 0 {
                self.files_with_nulls += 1;
            }
        }
        for strategy in &run.parsed_stats.strategies_applied {
            *self.strategies_used.entry(strategy.clone()).or_insert(0) += 1;
        }
        self.total_execution_time += run.execution_time;
    }
}

/// How two modes fared against each other across the corpus.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ModeComparison {
    pub first: String,
    pub second: String,
    pub first_better: u64,
    pub second_better: u64,
    /// Both succeeded, or neither did, whatever the failure kind.
    pub same: u64,
    pub first_better_files: Vec<String>,
    pub second_better_files: Vec<String>,
}

/// Accumulator owned by one orchestration run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CorpusStatistics {
    pub modes: Vec<ModeStats>,
    pub files: Vec<FileRecord>,
}

impl CorpusStatistics {
    pub fn new<S: Into<String>>(mode_names: impl IntoIterator<Item = S>) -> Self {
        Self {
            modes: mode_names.into_iter().map(ModeStats::new).collect(),
            files: Vec::new(),
        }
    }

    pub fn mode(&self, name: &str) -> Option<&ModeStats> {
        self.modes.iter().find(|m| m.mode == name)
    }

    /// Folds a fully classified file into the per-mode totals.
    ///
    /// Runs for modes not seen before get a fresh [`ModeStats`] entry.
    pub fn record_file(&mut self, record: FileRecord) {
        for run in &record.runs {
            match self.modes.iter_mut().find(|m| m.mode == run.mode) {
                Some(stats) => stats.record(run),
                None => {
                    let mut stats = ModeStats::new(run.mode.clone());
                    stats.record(run);
                    self.modes.push(stats);
                }
            }
        }
        self.files.push(record);
    }

    pub fn total_files(&self) -> usize {
        self.files.len()
    }

    pub fn compare(&self, first: &str, second: &str) -> ModeComparison {
        let mut comparison = ModeComparison {
            first: first.to_string(),
            second: second.to_string(),
            ..Default::default()
        };
        for record in &self.files {
            match (record.succeeded_in(first), record.succeeded_in(second)) {
                (true, false) => {
                    comparison.first_better += 1;
                    comparison.first_better_files.push(record.filename.clone());
                }
                (false, true) => {
                    comparison.second_better += 1;
                    comparison.second_better_files.push(record.filename.clone());
                }
                _ => comparison.same += 1,
            }
        }
        comparison
    }

    /// One comparison per pair of modes, in configuration order.
    pub fn comparisons(&self) -> Vec<ModeComparison> {
        let mut out = Vec::new();
        for (i, first) in self.modes.iter().enumerate() {
            for second in &self.modes[i + 1..] {
                out.push(self.compare(&first.mode, &second.mode));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(mode: &str, status: RunStatus, remaining: Option<usize>) -> ModeRun {
        let mut run = ModeRun::harness_failure(mode, String::new());
        run.status = status;
        run.harness_error = None;
        run.nulls_remaining = remaining;
        run
    }

    fn record(index: usize, name: &str, runs: Vec<ModeRun>) -> FileRecord {
        FileRecord {
            index,
            filename: name.to_string(),
            path: PathBuf::from(name),
            size_bytes: 0,
            md5: None,
            runs,
        }
    }

    #[test]
    fn comparison_buckets_success_differences() {
        let mut stats = CorpusStatistics::new(["biphasic", "non-biphasic"]);
        stats.record_file(record(
            1,
            "one.bin",
            vec![
                run("biphasic", RunStatus::Success, Some(0)),
                run("non-biphasic", RunStatus::NullsRemaining, Some(2)),
            ],
        ));
        stats.record_file(record(
            2,
            "two.bin",
            vec![
                run("biphasic", RunStatus::Success, Some(0)),
                run("non-biphasic", RunStatus::Success, Some(0)),
            ],
        ));

        let comparison = stats.compare("biphasic", "non-biphasic");
        assert_eq!(comparison.first_better, 1);
        assert_eq!(comparison.same, 1);
        assert_eq!(comparison.second_better, 0);
        assert_eq!(comparison.first_better_files, vec!["one.bin"]);
        assert_eq!(stats.comparisons(), vec![comparison]);
    }

    #[test]
    fn differing_failures_count_as_same() {
        let mut stats = CorpusStatistics::new(["a", "b"]);
        stats.record_file(record(
            1,
            "x.bin",
            vec![
                run("a", RunStatus::Error, None),
                run("b", RunStatus::Timeout, None),
            ],
        ));
        let comparison = stats.compare("a", "b");
        assert_eq!((comparison.first_better, comparison.second_better), (0, 0));
        assert_eq!(comparison.same, 1);
    }

    #[test]
    fn record_file_updates_per_mode_totals() {
        let mut stats = CorpusStatistics::new(["a"]);
        let mut first = run("a", RunStatus::NullsRemaining, Some(3));
        first.parsed_stats.instructions_disassembled = 10;
        first.parsed_stats.strategies_applied = vec!["xor".into(), "mov".into()];
        first.execution_time = 1.5;
        let mut second = run("a", RunStatus::Success, Some(0));
        second.parsed_stats.instructions_disassembled = 5;
        second.parsed_stats.strategies_applied = vec!["xor".into()];
        second.execution_time = 0.5;
        stats.record_file(record(1, "p.bin", vec![first]));
        stats.record_file(record(2, "q.bin", vec![second]));
        stats.record_file(record(3, "r.bin", vec![run("a", RunStatus::Failed, None)]));

        let a = stats.mode("a").unwrap();
        assert_eq!(a.successful, 1);
        assert_eq!(a.nulls_remaining, 1);
        assert_eq!(a.failed, 1);
        assert_eq!(a.runs(), 3);
        assert_eq!(a.total_instructions, 15);
        assert_eq!(a.total_null_bytes_found, 3);
        assert_eq!(a.files_with_nulls, 1);
        assert_eq!(a.top_strategies(20), vec![("xor", 2), ("mov", 1)]);
        assert!((a.average_execution_time() - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(stats.total_files(), 3);
    }

    #[test]
    fn stderr_is_truncated_in_records() {
        let outcome = ProcessOutcome {
            exit_code: Some(1),
            stderr: "e".repeat(MAX_STDERR_LEN + 500),
            ..Default::default()
        };
        let run =
            ModeRun::from_outcome("a", RunStatus::Error, outcome, TransformerStats::default());
        assert_eq!(run.error.len(), MAX_STDERR_LEN);
    }
}
