//! External command execution
//!
//! Runs a program with captured output. stdout and stderr are drained
//! concurrently by one reader thread each, and their lines are multiplexed
//! over a single channel until both streams reach end-of-file. Every line is
//! forwarded to `log::debug!` as it arrives, so long-running model
//! invocations stay observable.

use std::io::{BufRead, BufReader, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, RecvTimeoutError};

use crate::error::{AcappellaError, Result};

/// Number of trailing stderr lines kept in error messages
const STDERR_TAIL_LINES: usize = 20;

/// How often a child with closed output streams is checked for exit
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
    Stdout,
    Stderr,
}

/// Captured result of a successful command
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Printable command line used in logs and errors
pub fn command_line(program: &str, args: &[String]) -> String {
    std::iter::once(program.to_string())
        .chain(args.iter().cloned())
        .collect::<Vec<_>>()
        .join(" ")
}

fn spawn_reader<R: Read + Send + 'static>(
    reader: R,
    stream: Stream,
    tx: channel::Sender<(Stream, String)>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf).trim_end_matches(['\r', '\n']).to_string();
                    if tx.send((stream, line)).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    log::warn!("run_command: Failed to read {:?}: {}", stream, e);
                    break;
                }
            }
        }
    })
}

fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

fn kill(child: &mut Child, command: &str) {
    if let Err(e) = child.kill() {
        log::warn!("run_command: Failed to kill '{}': {}", command, e);
    }
    let _ = child.wait();
}

/// Wait for the child to exit. Output streams may close long before the
/// process does, so the deadline still applies here.
fn wait_for_exit(
    child: &mut Child,
    command: &str,
    started: Instant,
    deadline: Option<Instant>,
) -> Result<ExitStatus> {
    let wait_err = |e: std::io::Error| AcappellaError::ExternalProcess {
        command: command.to_string(),
        status: None,
        stderr: format!("failed to wait: {}", e),
    };

    let Some(deadline) = deadline else {
        return child.wait().map_err(wait_err);
    };

    loop {
        if let Some(status) = child.try_wait().map_err(wait_err)? {
            return Ok(status);
        }
        let now = Instant::now();
        if now >= deadline {
            kill(child, command);
            let seconds = started.elapsed().as_secs_f64();
            log::warn!("run_command: '{}' timed out after {:.1}s", command, seconds);
            return Err(AcappellaError::Timeout {
                command: command.to_string(),
                seconds,
            });
        }
        thread::sleep(EXIT_POLL_INTERVAL.min(deadline - now));
    }
}

/// Run `program` with `args`, failing on a non-zero exit.
///
/// With a `timeout`, the process is killed once the deadline passes and
/// [`AcappellaError::Timeout`] is returned.
pub fn run_command(program: &str, args: &[String], timeout: Option<Duration>) -> Result<CommandOutput> {
    let command = command_line(program, args);
    log::info!("run_command: {}", command);
    let started = Instant::now();

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| AcappellaError::ExternalProcess {
            command: command.clone(),
            status: None,
            stderr: format!("failed to start: {}", e),
        })?;

    let (tx, rx) = channel::unbounded();
    let mut readers = Vec::with_capacity(2);
    if let Some(stdout) = child.stdout.take() {
        readers.push(spawn_reader(stdout, Stream::Stdout, tx.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(spawn_reader(stderr, Stream::Stderr, tx.clone()));
    }
    drop(tx);

    let deadline = timeout.map(|t| started + t);
    let mut stdout = String::new();
    let mut stderr = String::new();

    loop {
        let received = match deadline {
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                rx.recv_timeout(remaining)
            }
            None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };

        match received {
            Ok((stream, line)) => {
                log::debug!("[{:?}] {}", stream, line);
                let sink = match stream {
                    Stream::Stdout => &mut stdout,
                    Stream::Stderr => &mut stderr,
                };
                sink.push_str(&line);
                sink.push('\n');
            }
            Err(RecvTimeoutError::Timeout) => {
                kill(&mut child, &command);
                let seconds = started.elapsed().as_secs_f64();
                log::warn!("run_command: '{}' timed out after {:.1}s", command, seconds);
                return Err(AcappellaError::Timeout { command, seconds });
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    for reader in readers {
        let _ = reader.join();
    }

    let status = wait_for_exit(&mut child, &command, started, deadline)?;

    log::debug!(
        "run_command: '{}' finished with {:?} in {:.2}s",
        command,
        status.code(),
        started.elapsed().as_secs_f64()
    );

    if !status.success() {
        return Err(AcappellaError::ExternalProcess {
            command,
            status: status.code(),
            stderr: stderr_tail(&stderr),
        });
    }

    Ok(CommandOutput {
        status: status.code(),
        stdout,
        stderr,
    })
}
