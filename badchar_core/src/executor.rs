use crate::analysis::count_bad_bytes;
use crate::bad_chars::BadCharSet;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("Transformer command is empty")]
    EmptyCommand,

    /// The transformer could not be started at all. Callers treat this as fatal.
    #[error("Failed to spawn command '{command:?}': {source}")]
    Spawn {
        command: Vec<String>,
        #[source]
        source: std::io::Error,
    },

    #[error("Error waiting for child: {0}")]
    Wait(String),

    #[error("Failed to kill timed-out process: {0}")]
    Kill(String),

    #[error("Failed to read {path:?} after run: {message}")]
    Io { path: PathBuf, message: String },
}

/// How to invoke the external transformer.
#[derive(Debug, Clone)]
pub struct TransformerConfig {
    /// Executable followed by any fixed leading arguments.
    pub command: Vec<String>,
    /// Flag that precedes the output path, `-o` for byvalver.
    pub output_flag: String,
    pub timeout: Duration,
    pub working_dir: Option<PathBuf>,
}

/// Everything observed about one transformer invocation.
///
/// Exit status, captured streams and timing come from the process; the two
/// bad-byte counts are recomputed here from the files on disk.
#[derive(Debug, Clone, Default)]
pub struct ProcessOutcome {
    pub pid: Option<u32>,
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
    pub timed_out: bool,
    /// Present only when the process exited zero and left an output file.
    pub output_bytes: Option<Vec<u8>>,
    pub bad_bytes_in_original: Option<usize>,
    pub bad_bytes_remaining: Option<usize>,
}

/// Runs the transformer against one input for one mode.
pub trait Executor {
    fn execute(
        &mut self,
        input: &Path,
        output: &Path,
        mode_args: &[String],
    ) -> Result<ProcessOutcome, ExecutorError>;
}

pub struct TransformerExecutor {
    config: TransformerConfig,
    bad_chars: BadCharSet,
}

impl TransformerExecutor {
    pub fn new(config: TransformerConfig) -> Self {
        Self {
            config,
            bad_chars: BadCharSet::default(),
        }
    }

    pub fn with_bad_chars(mut self, bad_chars: BadCharSet) -> Self {
        self.bad_chars = bad_chars;
        self
    }

    pub fn config(&self) -> &TransformerConfig {
        &self.config
    }

    fn build_command(&self, input: &Path, output: &Path, mode_args: &[String]) -> Command {
        let mut cmd = Command::new(&self.config.command[0]);
        cmd.args(&self.config.command[1..]);
        cmd.args(mode_args);
        cmd.arg(input);
        cmd.arg(&self.config.output_flag);
        cmd.arg(output);

        if let Some(cwd) = &self.config.working_dir {
            cmd.current_dir(cwd);
        }
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        // Own process group, so a timeout can take down anything the transformer forked.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }
        cmd
    }

    /// Polls the child until it exits or the budget runs out.
    ///
    /// Returns `Ok(None)` on timeout; by then the child has been killed and reaped.
    fn run_and_wait_with_timeout(
        &self,
        child: &mut Child,
        timeout: Duration,
    ) -> Result<Option<ExitStatus>, ExecutorError> {
        let start_time = Instant::now();

        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Ok(Some(status)),
                Ok(None) => {
                    if start_time.elapsed() > timeout {
                        warn!("Transformer timed out after {:?}, killing...", timeout);
                        if let Err(e) = kill_process_group(child.id()) {
                            debug!("Process group kill failed ({}), killing child only", e);
                            child
                                .kill()
                                .map_err(|e| ExecutorError::Kill(e.to_string()))?;
                        }
                        child
                            .wait()
                            .map_err(|e| ExecutorError::Wait(e.to_string()))?;
                        return Ok(None);
                    }
                    thread::sleep(POLL_INTERVAL);
                }
                Err(e) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(ExecutorError::Wait(e.to_string()));
                }
            }
        }
    }

    fn read_file(path: &Path) -> Result<Vec<u8>, ExecutorError> {
        fs::read(path).map_err(|e| ExecutorError::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            buf
        })
    })
}

fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .map(|buf| String::from_utf8_lossy(&buf).into_owned())
        .unwrap_or_default()
}

/// SIGKILL to every process in the group led by `pid`.
#[cfg(unix)]
fn kill_process_group(pid: u32) -> Result<(), std::io::Error> {
    let ret = unsafe { libc::kill(-(pid as libc::pid_t), libc::SIGKILL) };
    if ret == -1 {
        Err(std::io::Error::last_os_error())
    } else {
        Ok(())
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: u32) -> Result<(), std::io::Error> {
    Err(std::io::Error::from(std::io::ErrorKind::Unsupported))
}

#[cfg(unix)]
fn exit_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &ExitStatus) -> Option<i32> {
    None
}

impl Executor for TransformerExecutor {
    fn execute(
        &mut self,
        input: &Path,
        output: &Path,
        mode_args: &[String],
    ) -> Result<ProcessOutcome, ExecutorError> {
        if self.config.command.is_empty() {
            return Err(ExecutorError::EmptyCommand);
        }

        let start_time = Instant::now();
        let mut child = self
            .build_command(input, output, mode_args)
            .spawn()
            .map_err(|source| ExecutorError::Spawn {
                command: self.config.command.clone(),
                source,
            })?;

        let mut outcome = ProcessOutcome {
            pid: Some(child.id()),
            ..Default::default()
        };
        // Drained concurrently so a chatty transformer cannot stall on a full pipe.
        let stdout_reader = drain(child.stdout.take());
        let stderr_reader = drain(child.stderr.take());

        let exit_status = self.run_and_wait_with_timeout(&mut child, self.config.timeout)?;
        outcome.duration = start_time.elapsed();

        let Some(status) = exit_status else {
            // Reader threads are left to finish on their own; a partial stream is not kept.
            outcome.timed_out = true;
            outcome.stderr = format!(
                "Process timed out after {} seconds",
                self.config.timeout.as_secs_f64()
            );
            return Ok(outcome);
        };

        outcome.stdout = collect(stdout_reader);
        outcome.stderr = collect(stderr_reader);
        outcome.exit_code = status.code();
        outcome.signal = exit_signal(&status);

        if !status.success() {
            debug!(
                "Transformer exited with {:?} (signal {:?}) for {:?}",
                outcome.exit_code, outcome.signal, input
            );
            return Ok(outcome);
        }

        if output.exists() {
            let produced = Self::read_file(output)?;
            let original = Self::read_file(input)?;
            outcome.bad_bytes_remaining = Some(count_bad_bytes(&produced, &self.bad_chars));
            outcome.bad_bytes_in_original = Some(count_bad_bytes(&original, &self.bad_chars));
            outcome.output_bytes = Some(produced);
        } else {
            debug!("Transformer exited 0 but produced no file at {:?}", output);
        }

        Ok(outcome)
    }
}
