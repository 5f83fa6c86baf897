use crate::config::ModeConfig;
use crate::corpus::CorpusFile;
use crate::executor::{Executor, ExecutorError};
use crate::observer::observe;
use crate::oracle::classify;
use crate::stats::{CorpusStatistics, FileRecord, ModeRun};
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum OrchestratorError {
    /// The transformer cannot be launched at all; no run can succeed.
    #[error("Transformer could not be started: {0}")]
    Misconfigured(#[source] ExecutorError),

    #[error("Failed to create scratch directory for transformer output: {0}")]
    Workspace(String),
}

/// Drives every corpus file through every configured mode, one run at a time.
pub struct Orchestrator<E: Executor> {
    executor: E,
    modes: Vec<ModeConfig>,
}

impl<E: Executor> Orchestrator<E> {
    pub fn new(executor: E, modes: Vec<ModeConfig>) -> Self {
        Self { executor, modes }
    }

    pub fn modes(&self) -> &[ModeConfig] {
        &self.modes
    }

    /// Runs the corpus and folds each file into `stats`, which is handed back.
    ///
    /// Per-run failures (timeouts, bad exits, harness I/O errors) are recorded
    /// and the run moves on. Only a transformer that cannot be spawned aborts.
    pub fn run_corpus(
        &mut self,
        files: &[CorpusFile],
        mut stats: CorpusStatistics,
    ) -> Result<CorpusStatistics, OrchestratorError> {
        let scratch = tempfile::Builder::new()
            .prefix("badchar-")
            .tempdir()
            .map_err(|e| OrchestratorError::Workspace(e.to_string()))?;

        for (position, file) in files.iter().enumerate() {
            let index = position + 1;
            info!(
                "[{}/{}] Testing: {} ({:.1} KB)",
                index,
                files.len(),
                file.name,
                file.size_bytes as f64 / 1024.0
            );

            let md5 = match file.md5_digest() {
                Ok(digest) => Some(digest),
                Err(e) => {
                    warn!("Could not hash {}: {}", file.name, e);
                    None
                }
            };

            let mut runs = Vec::with_capacity(self.modes.len());
            for (mode_index, mode) in self.modes.iter().enumerate() {
                let output = scratch
                    .path()
                    .join(format!("{index:06}_{mode_index}.bin"));
                let run = Self::run_mode(&mut self.executor, file, mode, &output)?;
                runs.push(run);
            }

            stats.record_file(FileRecord {
                index,
                filename: file.name.clone(),
                path: file.path.clone(),
                size_bytes: file.size_bytes,
                md5,
                runs,
            });
        }

        Ok(stats)
    }

    fn run_mode(
        executor: &mut E,
        file: &CorpusFile,
        mode: &ModeConfig,
        output: &Path,
    ) -> Result<ModeRun, OrchestratorError> {
        let result = executor.execute(&file.path, output, &mode.args);
        if let Err(e) = fs::remove_file(output) {
            debug!("Cleanup of {:?} skipped: {}", output, e);
        }

        let run = match result {
            Ok(outcome) => {
                let status = classify(&outcome);
                let parsed = observe(&outcome.stdout, &outcome.stderr);
                ModeRun::from_outcome(&mode.name, status, outcome, parsed)
            }
            Err(e @ (ExecutorError::Spawn { .. } | ExecutorError::EmptyCommand)) => {
                return Err(OrchestratorError::Misconfigured(e));
            }
            Err(e) => {
                warn!("Harness error on {} ({}): {}", file.name, mode.name, e);
                ModeRun::harness_failure(&mode.name, e.to_string())
            }
        };

        info!(
            "  {}: {} ({:.3}s, {} insns, {}->{} nulls)",
            mode.name,
            run.status,
            run.execution_time,
            run.parsed_stats.instructions_disassembled,
            count_or_dash(run.nulls_in_original),
            count_or_dash(run.nulls_remaining)
        );
        Ok(run)
    }
}

fn count_or_dash(count: Option<usize>) -> String {
    count.map_or_else(|| "-".to_string(), |c| c.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ProcessOutcome;
    use crate::oracle::RunStatus;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::time::Duration;

    /// What the scripted transformer should do for one (file, mode flag) pair.
    #[derive(Clone)]
    enum Script {
        Clean,
        Dirty,
        Crash,
        HarnessFault,
        Unstartable,
    }

    struct ScriptedExecutor {
        scripts: HashMap<(String, String), Script>,
        outputs_seen: Vec<PathBuf>,
    }

    impl ScriptedExecutor {
        fn new(entries: &[(&str, &str, Script)]) -> Self {
            Self {
                scripts: entries
                    .iter()
                    .map(|(f, m, s)| ((f.to_string(), m.to_string()), s.clone()))
                    .collect(),
                outputs_seen: Vec::new(),
            }
        }
    }

    impl Executor for ScriptedExecutor {
        fn execute(
            &mut self,
            input: &Path,
            output: &Path,
            mode_args: &[String],
        ) -> Result<ProcessOutcome, ExecutorError> {
            self.outputs_seen.push(output.to_path_buf());
            let file = input.file_name().unwrap().to_string_lossy().into_owned();
            let flag = mode_args.first().cloned().unwrap_or_default();
            let script = self.scripts.get(&(file, flag)).cloned().unwrap_or(Script::Clean);

            let written = |bytes: &[u8], remaining| {
                fs::write(output, bytes).unwrap();
                ProcessOutcome {
                    exit_code: Some(0),
                    stderr: "[DISASM] Disassembled 3 instructions\n\
                             [TRACE] Using strategy 'xor_zero_reg' for xor"
                        .to_string(),
                    duration: Duration::from_millis(5),
                    output_bytes: Some(bytes.to_vec()),
                    bad_bytes_in_original: Some(1),
                    bad_bytes_remaining: Some(remaining),
                    ..Default::default()
                }
            };

            match script {
                Script::Clean => Ok(written(&[0x90, 0xc3], 0)),
                Script::Dirty => Ok(written(&[0x90, 0x00], 1)),
                Script::Crash => Ok(ProcessOutcome {
                    exit_code: Some(2),
                    ..Default::default()
                }),
                Script::HarnessFault => Err(ExecutorError::Io {
                    path: output.to_path_buf(),
                    message: "permission denied".to_string(),
                }),
                Script::Unstartable => Err(ExecutorError::Spawn {
                    command: vec!["byvalver".to_string()],
                    source: std::io::Error::from(std::io::ErrorKind::NotFound),
                }),
            }
        }
    }

    fn corpus(names: &[&str]) -> Vec<CorpusFile> {
        names
            .iter()
            .map(|n| CorpusFile {
                name: n.to_string(),
                path: PathBuf::from("/corpus").join(n),
                relative_path: PathBuf::from(n),
                size_bytes: 2048,
            })
            .collect()
    }

    fn run(executor: ScriptedExecutor, files: &[CorpusFile]) -> (CorpusStatistics, Vec<PathBuf>) {
        let modes = crate::config::default_modes();
        let stats = CorpusStatistics::new(modes.iter().map(|m| m.name.clone()));
        let mut orchestrator = Orchestrator::new(executor, modes);
        let stats = orchestrator.run_corpus(files, stats).unwrap();
        (stats, orchestrator.executor.outputs_seen)
    }

    #[test]
    fn each_file_runs_once_per_mode_in_order() {
        let files = corpus(&["a.bin", "b.bin"]);
        let (stats, outputs) = run(ScriptedExecutor::new(&[]), &files);

        assert_eq!(outputs.len(), 4);
        assert_eq!(stats.total_files(), 2);
        let modes: Vec<&str> = stats.files[0].runs.iter().map(|r| r.mode.as_str()).collect();
        assert_eq!(modes, vec!["biphasic", "non-biphasic"]);
        assert_eq!(stats.files[1].index, 2);
        for output in outputs {
            assert!(!output.exists(), "scratch output {output:?} was not removed");
        }
    }

    #[test]
    fn mode_comparison_over_two_files() {
        let files = corpus(&["one.bin", "two.bin"]);
        let executor = ScriptedExecutor::new(&[("one.bin", "", Script::Dirty)]);
        let (stats, _) = run(executor, &files);

        let comparison = stats.compare("biphasic", "non-biphasic");
        assert_eq!(comparison.first_better, 1);
        assert_eq!(comparison.same, 1);
        assert_eq!(comparison.second_better, 0);

        let baseline = stats.mode("non-biphasic").unwrap();
        assert_eq!(baseline.successful, 1);
        assert_eq!(baseline.nulls_remaining, 1);
        assert_eq!(baseline.total_null_bytes_found, 1);
        let biphasic = stats.mode("biphasic").unwrap();
        assert_eq!(biphasic.total_instructions, 6);
        assert_eq!(biphasic.strategies_used.get("xor_zero_reg"), Some(&2));
    }

    #[test]
    fn harness_faults_are_recorded_and_the_run_continues() {
        let files = corpus(&["a.bin", "b.bin"]);
        let executor = ScriptedExecutor::new(&[
            ("a.bin", "--biphasic", Script::HarnessFault),
            ("b.bin", "", Script::Crash),
        ]);
        let (stats, _) = run(executor, &files);

        assert_eq!(stats.total_files(), 2);
        let faulted = stats.files[0].run_for("biphasic").unwrap();
        assert_eq!(faulted.status, RunStatus::Error);
        assert!(faulted.harness_error.as_deref().unwrap().contains("permission denied"));
        assert_eq!(
            stats.files[1].run_for("non-biphasic").unwrap().status,
            RunStatus::Error
        );
        assert_eq!(stats.mode("biphasic").unwrap().errors, 1);
        assert_eq!(stats.mode("non-biphasic").unwrap().errors, 1);
    }

    #[test]
    fn unreadable_inputs_are_run_and_recorded_without_digest() {
        // The fixture paths under /corpus do not exist, so hashing fails per file.
        let files = corpus(&["gone.bin", "also_gone.bin"]);
        let (stats, outputs) = run(ScriptedExecutor::new(&[]), &files);

        assert_eq!(outputs.len(), 4);
        assert_eq!(stats.total_files(), 2);
        assert!(stats.files.iter().all(|f| f.md5.is_none()));
        assert_eq!(stats.mode("biphasic").unwrap().successful, 2);
    }

    #[test]
    fn unstartable_transformer_aborts_the_run() {
        let files = corpus(&["a.bin"]);
        let executor = ScriptedExecutor::new(&[("a.bin", "--biphasic", Script::Unstartable)]);
        let mut orchestrator = Orchestrator::new(executor, crate::config::default_modes());
        let result = orchestrator.run_corpus(&files, CorpusStatistics::default());
        assert!(matches!(result, Err(OrchestratorError::Misconfigured(_))));
    }

    #[cfg(unix)]
    #[test]
    fn real_transformer_script_end_to_end() {
        use crate::executor::{TransformerConfig, TransformerExecutor};

        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("x.bin"), [0x31, 0xc0, 0x00, 0x50]).unwrap();
        let files = crate::corpus::discover(dir.path(), "*.bin", false).unwrap();

        let script = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("../test_targets")
            .join("transformer_modal.sh");
        let executor = TransformerExecutor::new(TransformerConfig {
            command: vec!["sh".to_string(), script.to_string_lossy().into_owned()],
            output_flag: "-o".to_string(),
            timeout: Duration::from_secs(5),
            working_dir: None,
        });
        let modes = crate::config::default_modes();
        let stats = CorpusStatistics::new(modes.iter().map(|m| m.name.clone()));
        let stats = Orchestrator::new(executor, modes)
            .run_corpus(&files, stats)
            .unwrap();

        let record = &stats.files[0];
        assert_eq!(
            record.md5.as_deref(),
            Some(format!("{:x}", md5::compute([0x31u8, 0xc0, 0x00, 0x50])).as_str())
        );
        let biphasic = record.run_for("biphasic").unwrap();
        assert_eq!(biphasic.status, RunStatus::Success);
        assert_eq!(biphasic.nulls_in_original, Some(1));
        assert_eq!(biphasic.parsed_stats.strategies_applied, vec!["biphasic_rewrite"]);
        let baseline = record.run_for("non-biphasic").unwrap();
        assert_eq!(baseline.status, RunStatus::NullsRemaining);
        assert_eq!(baseline.nulls_remaining, Some(1));
        assert_eq!(stats.compare("biphasic", "non-biphasic").first_better, 1);
    }
}
