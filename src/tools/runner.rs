//! Blocking subprocess execution with output capture and a hard timeout.

use std::ffi::OsString;
use std::io::Read;
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use log::debug;
use thiserror::Error;

/// How often the child is polled for exit while waiting.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How many trailing stderr lines are kept in a failure message.
const STDERR_TAIL_LINES: usize = 5;

/// Errors that can occur while running an external tool.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} failed with {status}: {stderr_tail}")]
    NonZeroExit {
        program: String,
        status: ExitStatus,
        stderr_tail: String,
    },

    #[error("{program} did not finish within {timeout_secs} s and was killed")]
    Timeout { program: String, timeout_secs: u64 },

    #[error("IO error while running {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Captured output of a successful invocation.
#[derive(Debug)]
pub struct RunOutput {
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

/// Run an external program to completion, capturing its output.
///
/// Blocks until the child exits or `timeout` elapses, whichever comes
/// first. On timeout the child is killed and an error is returned. A
/// non-zero exit is an error carrying the last stderr lines.
///
/// # Arguments
///
/// * `program` - Resolved executable path
/// * `args` - Full argument list
/// * `timeout` - Hard wall-clock limit for this invocation
pub fn run_command(
    program: &Path,
    args: &[OsString],
    timeout: Duration,
) -> Result<RunOutput, RunnerError> {
    let program_name = short_name(program);
    debug!("Running: {}", render_command(program, args));

    let start = Instant::now();
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| RunnerError::Spawn {
            program: program_name.clone(),
            source,
        })?;

    // Drain both pipes on their own threads so the child can never block
    // on a full pipe buffer while we poll for exit.
    let stdout_reader = spawn_reader(child.stdout.take());
    let stderr_reader = spawn_reader(child.stderr.take());

    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {
                if start.elapsed() >= timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    let _ = stdout_reader.join();
                    let _ = stderr_reader.join();
                    return Err(RunnerError::Timeout {
                        program: program_name,
                        timeout_secs: timeout.as_secs(),
                    });
                }
                thread::sleep(POLL_INTERVAL);
            }
            Err(source) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(RunnerError::Io {
                    program: program_name,
                    source,
                });
            }
        }
    };

    let stdout = stdout_reader.join().unwrap_or_default();
    let stderr = stderr_reader.join().unwrap_or_default();
    let elapsed = start.elapsed();

    if !status.success() {
        return Err(RunnerError::NonZeroExit {
            program: program_name,
            status,
            stderr_tail: stderr_tail(&stderr),
        });
    }

    debug!(
        "{} finished in {:.1} s",
        program_name,
        elapsed.as_secs_f64()
    );
    Ok(RunOutput {
        stdout,
        stderr,
        elapsed,
    })
}

/// Render a command line for debug logging.
pub fn render_command(program: &Path, args: &[OsString]) -> String {
    let mut line = program.display().to_string();
    for arg in args {
        line.push(' ');
        line.push_str(&arg.to_string_lossy());
    }
    line
}

fn short_name(program: &Path) -> String {
    program
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| program.display().to_string())
}

fn spawn_reader<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut bytes = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut bytes);
        }
        String::from_utf8_lossy(&bytes).into_owned()
    })
}

fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .collect();
    if lines.is_empty() {
        return "(no stderr output)".to_string();
    }
    let skip = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[skip..].join("; ")
}
