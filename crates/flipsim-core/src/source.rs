//! Outcome sources: where raw coin-flip outcomes come from.
//!
//! The production source is an external generator process speaking a line
//! protocol on its stdin/stdout:
//!
//! ```text
//! -> 3            request three tokens
//! <- 1
//! <- -1
//! <- 1
//! <-              blank line terminates the chunk
//! ```
//!
//! Anything other than exactly `n` numeric lines followed by one blank line is
//! a failed chunk. Partial chunks are never returned.

use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{Duration, Instant};

use crate::config::{DEFAULT_TERMINATE_GRACE, GeneratorCommand};
use crate::error::SourceError;

/// A stream of raw outcomes pulled in chunks.
///
/// One source serves one run: the orchestrator calls [`start`](Self::start)
/// once, any number of [`request_chunk`](Self::request_chunk) calls, then
/// [`stop`](Self::stop) no matter how the run ended.
pub trait OutcomeSource: Send {
    /// Human-readable name for logs.
    fn name(&self) -> String;

    fn start(&mut self) -> Result<(), SourceError>;

    /// Exactly `n` outcomes, or an error. Never a short read.
    fn request_chunk(&mut self, n: usize) -> Result<Vec<f64>, SourceError>;

    /// Release the source. Must be safe to call more than once.
    fn stop(&mut self);
}

/// Creates a fresh source for every run.
pub trait SourceLauncher: Send + Sync {
    fn create(&self) -> Box<dyn OutcomeSource>;
}

impl<F> SourceLauncher for F
where
    F: Fn() -> Box<dyn OutcomeSource> + Send + Sync,
{
    fn create(&self) -> Box<dyn OutcomeSource> {
        self()
    }
}

/// Write one request line.
pub fn write_request<W: Write>(writer: &mut W, n: usize) -> std::io::Result<()> {
    writeln!(writer, "{n}")?;
    writer.flush()
}

/// Upfront allocation for one response; larger chunks grow as lines arrive.
const CHUNK_PREALLOC: usize = 1 << 16;

/// Read one response: `expected` token lines and a blank terminator.
pub fn read_chunk<R: BufRead>(reader: &mut R, expected: usize) -> Result<Vec<f64>, SourceError> {
    let mut tokens = Vec::with_capacity(expected.min(CHUNK_PREALLOC));
    let mut line = String::new();
    let mut line_no = 0usize;

    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Err(SourceError::Closed {
                expected,
                received: tokens.len(),
            });
        }
        line_no += 1;

        let token = line.trim();
        if token.is_empty() {
            if tokens.len() < expected {
                return Err(SourceError::ShortChunk {
                    expected,
                    received: tokens.len(),
                });
            }
            return Ok(tokens);
        }
        if tokens.len() == expected {
            return Err(SourceError::Overlong { expected });
        }

        match token.parse::<f64>() {
            Ok(v) if v.is_finite() => tokens.push(v),
            _ => {
                return Err(SourceError::Malformed {
                    line: line_no,
                    token: token.to_string(),
                });
            }
        }
    }
}

struct RunningGenerator {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
}

/// Generator process spawned from a [`GeneratorCommand`].
pub struct ProcessSource {
    command: GeneratorCommand,
    terminate_grace: Duration,
    running: Option<RunningGenerator>,
}

impl ProcessSource {
    pub fn new(command: GeneratorCommand) -> Self {
        Self {
            command,
            terminate_grace: DEFAULT_TERMINATE_GRACE,
            running: None,
        }
    }

    pub fn with_terminate_grace(mut self, grace: Duration) -> Self {
        self.terminate_grace = grace;
        self
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// OS process id while running.
    pub fn pid(&self) -> Option<u32> {
        self.running.as_ref().map(|r| r.child.id())
    }
}

impl OutcomeSource for ProcessSource {
    fn name(&self) -> String {
        self.command.to_string()
    }

    fn start(&mut self) -> Result<(), SourceError> {
        if self.running.is_some() {
            return Ok(());
        }

        let mut child = Command::new(&self.command.program)
            .args(&self.command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| SourceError::Spawn {
                command: self.command.to_string(),
                source,
            })?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(SourceError::NotRunning);
        };

        if let Some(stderr) = child.stderr.take() {
            let pid = child.id();
            std::thread::spawn(move || {
                for line in BufReader::new(stderr).lines() {
                    match line {
                        Ok(line) => log::debug!("generator[{pid}] stderr: {line}"),
                        Err(_) => break,
                    }
                }
            });
        }

        log::debug!("started generator `{}` (pid {})", self.command, child.id());
        self.running = Some(RunningGenerator {
            child,
            stdin: Some(stdin),
            stdout: BufReader::new(stdout),
        });
        Ok(())
    }

    fn request_chunk(&mut self, n: usize) -> Result<Vec<f64>, SourceError> {
        let running = self.running.as_mut().ok_or(SourceError::NotRunning)?;
        let stdin = running.stdin.as_mut().ok_or(SourceError::NotRunning)?;
        write_request(stdin, n)?;
        read_chunk(&mut running.stdout, n)
    }

    fn stop(&mut self) {
        let Some(mut running) = self.running.take() else {
            return;
        };
        // Closing stdin is the protocol's end-of-session signal.
        drop(running.stdin.take());

        let pid = running.child.id();
        match running.child.try_wait() {
            Ok(Some(status)) => {
                log::debug!("generator {pid} already exited: {status}");
                return;
            }
            Ok(None) => request_terminate(&running.child),
            Err(e) => log::warn!("generator {pid}: wait failed: {e}"),
        }

        let deadline = Instant::now() + self.terminate_grace;
        loop {
            match running.child.try_wait() {
                Ok(Some(status)) => {
                    log::debug!("generator {pid} exited: {status}");
                    return;
                }
                Ok(None) if Instant::now() < deadline => {
                    std::thread::sleep(Duration::from_millis(10));
                }
                Ok(None) | Err(_) => break,
            }
        }

        log::warn!("generator {pid} ignored terminate, killing");
        if let Err(e) = running.child.kill() {
            log::warn!("generator {pid}: kill failed: {e}");
        }
        let _ = running.child.wait();
    }
}

impl Drop for ProcessSource {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(unix)]
fn request_terminate(child: &Child) {
    let Ok(pid) = libc::pid_t::try_from(child.id()) else {
        return;
    };
    // SAFETY: `pid` belongs to a child we have not reaped yet, so it cannot
    // have been recycled for another process.
    let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
    if rc != 0 {
        log::debug!("SIGTERM to generator {pid} failed");
    }
}

#[cfg(not(unix))]
fn request_terminate(_child: &Child) {}

/// Launches a [`ProcessSource`] per run.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    command: GeneratorCommand,
    terminate_grace: Duration,
}

impl ProcessLauncher {
    pub fn new(command: GeneratorCommand, terminate_grace: Duration) -> Self {
        Self {
            command,
            terminate_grace,
        }
    }
}

impl SourceLauncher for ProcessLauncher {
    fn create(&self) -> Box<dyn OutcomeSource> {
        Box::new(
            ProcessSource::new(self.command.clone()).with_terminate_grace(self.terminate_grace),
        )
    }
}
