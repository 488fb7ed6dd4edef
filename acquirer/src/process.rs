//! Bounded-time execution of external programs.
//!
//! The [`ProcessExecutor`] starts a program, streams its output into sinks as
//! lines arrive, and polls for exit. A process still running when the hang
//! timeout elapses is killed and reported with `forced_termination` set. The
//! executor never decides whether a failure is fatal; callers inspect the
//! returned [`ProcessResult`].

use crate::command_line::CommandLineInvocation;
use crate::error::{AcquireError, Result};
use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, warn};
use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, ErrorKind, Read};
use std::process::{Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};
use wait_timeout::ChildExt;

/// Default hang timeout for a single invocation.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default interval between liveness checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Default interval between "still waiting" warnings.
pub const DEFAULT_WARN_INTERVAL: Duration = Duration::from_secs(10);

/// How long to keep draining output after the process has gone.
const DRAIN_GRACE: Duration = Duration::from_secs(1);

/// Exit code reported when the process did not exit on its own.
pub const FORCED_EXIT_CODE: i32 = -1;

/// Outcome of running an external program.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessResult {
    /// Exit code; [`FORCED_EXIT_CODE`] if the process was killed or
    /// terminated by a signal.
    pub exit_code: i32,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// True when the process was killed after the hang timeout.
    pub forced_termination: bool,
}

impl ProcessResult {
    /// Returns true when the process exited on its own with code zero.
    ///
    /// A forced termination is never a success, whatever the exit code.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        !self.forced_termination && self.exit_code == 0
    }
}

/// Working directory and environment overlay for one invocation.
#[derive(Debug, Clone, Default)]
pub struct ProcessOptions {
    /// Directory the program starts in; the current directory when `None`.
    pub working_dir: Option<Utf8PathBuf>,
    /// Variables set for the child only, overriding inherited values.
    pub env: BTreeMap<String, String>,
}

impl ProcessOptions {
    /// Options that run the program in `dir`.
    #[must_use]
    pub fn in_dir(dir: &Utf8Path) -> Self {
        Self {
            working_dir: Some(dir.to_owned()),
            env: BTreeMap::new(),
        }
    }

    /// Add a child-scoped environment variable.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

/// Receives output lines from a running process.
pub trait OutputSink {
    /// Called once per line, without the trailing newline.
    fn line(&mut self, line: &str);
}

impl<F: FnMut(&str)> OutputSink for F {
    fn line(&mut self, line: &str) {
        self(line);
    }
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

/// Runs programs with a hang timeout.
#[derive(Debug, Clone, Copy)]
pub struct ProcessExecutor {
    timeout: Duration,
    poll_interval: Duration,
    warn_interval: Duration,
}

impl Default for ProcessExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl ProcessExecutor {
    /// Create an executor with the given hang timeout.
    #[must_use]
    pub const fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            poll_interval: DEFAULT_POLL_INTERVAL,
            warn_interval: DEFAULT_WARN_INTERVAL,
        }
    }

    /// Override the liveness polling interval.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Override how often "still waiting" warnings are logged.
    #[must_use]
    pub const fn with_warn_interval(mut self, interval: Duration) -> Self {
        self.warn_interval = interval;
        self
    }

    /// The hang timeout applied to each invocation.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `invocation`, streaming output into the sinks.
    ///
    /// # Errors
    ///
    /// Returns [`AcquireError::Spawn`] if the program cannot be started and
    /// [`AcquireError::Io`] if waiting on or killing it fails. Non-zero exits
    /// and timeouts are reported through the returned [`ProcessResult`].
    pub fn run(
        &self,
        invocation: &CommandLineInvocation,
        options: &ProcessOptions,
        stdout_sink: &mut dyn OutputSink,
        stderr_sink: &mut dyn OutputSink,
    ) -> Result<ProcessResult> {
        let mut cmd = Command::new(invocation.executable());
        cmd.args(invocation.arguments())
            .envs(&options.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &options.working_dir {
            cmd.current_dir(dir.as_std_path());
        }

        debug!("running {invocation}");
        let mut child = cmd.spawn().map_err(|source| AcquireError::Spawn {
            program: invocation.executable().to_owned(),
            source,
        })?;

        let (tx, rx) = mpsc::channel();
        if let Some(out) = child.stdout.take() {
            spawn_reader(out, Stream::Stdout, tx.clone());
        }
        if let Some(err) = child.stderr.take() {
            spawn_reader(err, Stream::Stderr, tx.clone());
        }
        drop(tx);

        let mut captured = Captured::default();
        let mut sinks = Sinks {
            stdout: stdout_sink,
            stderr: stderr_sink,
        };
        let started = Instant::now();
        let mut last_warning = started;

        let status = loop {
            if let Some(status) = child.wait_timeout(self.poll_interval)? {
                break Some(status);
            }
            captured.drain(&rx, &mut sinks);

            let elapsed = started.elapsed();
            if elapsed >= self.timeout {
                warn!(
                    "{invocation} [PID:{}] did not exit within {} sec; killing it",
                    child.id(),
                    self.timeout.as_secs()
                );
                // The process may exit between the last poll and the kill.
                if let Err(err) = child.kill() {
                    debug!("kill failed: {err}");
                }
                let _status = child.wait()?;
                break None;
            }
            if last_warning.elapsed() >= self.warn_interval {
                warn!(
                    "still waiting for {invocation} [PID:{}] to exit after waiting {:.1?}...",
                    child.id(),
                    elapsed
                );
                last_warning = Instant::now();
            }
        };

        captured.finish(&rx, &mut sinks);

        Ok(match status {
            Some(status) => ProcessResult {
                exit_code: status.code().unwrap_or(FORCED_EXIT_CODE),
                stdout: captured.stdout,
                stderr: captured.stderr,
                forced_termination: false,
            },
            None => ProcessResult {
                exit_code: FORCED_EXIT_CODE,
                stdout: captured.stdout,
                stderr: captured.stderr,
                forced_termination: true,
            },
        })
    }
}

/// Forward each line of `source` until EOF. Bytes that are not UTF-8 are
/// replaced rather than ending the read, and the pipe keeps draining after
/// the receiver hangs up so the child never writes into a closed pipe.
fn spawn_reader<R: Read + Send + 'static>(source: R, stream: Stream, tx: Sender<(Stream, String)>) {
    thread::spawn(move || {
        let mut reader = BufReader::new(source);
        let mut buf = Vec::new();
        let mut forwarding = true;
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => break,
                Ok(_) => {
                    if forwarding && tx.send((stream, decode_line(&buf))).is_err() {
                        forwarding = false;
                    }
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => {}
                Err(err) => {
                    debug!("stopped reading child output: {err}");
                    break;
                }
            }
        }
    });
}

fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

struct Sinks<'a> {
    stdout: &'a mut dyn OutputSink,
    stderr: &'a mut dyn OutputSink,
}

#[derive(Default)]
struct Captured {
    stdout: String,
    stderr: String,
}

impl Captured {
    fn drain(&mut self, rx: &Receiver<(Stream, String)>, sinks: &mut Sinks<'_>) {
        while let Ok(message) = rx.try_recv() {
            self.record(message, sinks);
        }
    }

    /// Collect output until both pipes close or the grace period ends. A
    /// grandchild that inherited the pipes can keep them open indefinitely.
    fn finish(&mut self, rx: &Receiver<(Stream, String)>, sinks: &mut Sinks<'_>) {
        let deadline = Instant::now() + DRAIN_GRACE;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match rx.recv_timeout(remaining) {
                Ok(message) => self.record(message, sinks),
                Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {
                    debug!("output pipes still open after exit; stopped reading");
                    break;
                }
            }
        }
    }

    fn record(&mut self, (stream, line): (Stream, String), sinks: &mut Sinks<'_>) {
        let (buffer, sink) = match stream {
            Stream::Stdout => (&mut self.stdout, &mut *sinks.stdout),
            Stream::Stderr => (&mut self.stderr, &mut *sinks.stderr),
        };
        sink.line(&line);
        buffer.push_str(&line);
        buffer.push('\n');
    }
}

/// Abstraction for running external commands.
///
/// Backends depend on this seam so their command sequences can be tested
/// without starting real tools.
#[cfg_attr(test, mockall::automock)]
pub trait CommandRunner {
    /// Run the invocation and return its captured result.
    ///
    /// # Errors
    ///
    /// Returns an error if the program cannot be started or waited on.
    fn run(
        &self,
        invocation: &CommandLineInvocation,
        options: &ProcessOptions,
    ) -> Result<ProcessResult>;

    /// The hang timeout applied to each invocation.
    fn timeout(&self) -> Duration;
}

/// Runs commands on the host system, logging output as it streams.
///
/// Standard output is logged at debug level and standard error at warn level.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandRunner {
    executor: ProcessExecutor,
}

impl SystemCommandRunner {
    /// Create a runner around the given executor.
    #[must_use]
    pub const fn new(executor: ProcessExecutor) -> Self {
        Self { executor }
    }
}

impl CommandRunner for SystemCommandRunner {
    fn run(
        &self,
        invocation: &CommandLineInvocation,
        options: &ProcessOptions,
    ) -> Result<ProcessResult> {
        let program = invocation.executable().to_owned();
        let mut on_stdout = |line: &str| debug!("{program}: {line}");
        let mut on_stderr = |line: &str| warn!("{program}: {line}");
        self.executor
            .run(invocation, options, &mut on_stdout, &mut on_stderr)
    }

    fn timeout(&self) -> Duration {
        self.executor.timeout()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command_line::CommandLine;

    fn sh(script: &str) -> CommandLineInvocation {
        CommandLine::new("sh")
            .raw("-c")
            .positional(script)
            .build()
            .expect("invocation should build")
    }

    fn quick_executor(timeout: Duration) -> ProcessExecutor {
        ProcessExecutor::new(timeout)
            .with_poll_interval(Duration::from_millis(20))
            .with_warn_interval(Duration::from_millis(100))
    }

    #[test]
    fn forced_termination_is_never_success() {
        let result = ProcessResult {
            exit_code: 0,
            forced_termination: true,
            ..ProcessResult::default()
        };
        assert!(!result.succeeded());
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let invocation = CommandLine::new("stevedore-definitely-not-installed")
            .build()
            .expect("invocation should build");
        let err = ProcessExecutor::default()
            .run(
                &invocation,
                &ProcessOptions::default(),
                &mut |_: &str| {},
                &mut |_: &str| {},
            )
            .expect_err("spawn should fail");
        assert!(matches!(err, AcquireError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn captures_and_streams_both_streams() {
        let mut streamed_out = Vec::new();
        let mut streamed_err = Vec::new();
        let result = quick_executor(Duration::from_secs(10))
            .run(
                &sh("echo one; echo two; echo oops >&2; exit 3"),
                &ProcessOptions::default(),
                &mut |line: &str| streamed_out.push(line.to_owned()),
                &mut |line: &str| streamed_err.push(line.to_owned()),
            )
            .expect("process should run");

        assert_eq!(result.exit_code, 3);
        assert!(!result.succeeded());
        assert!(!result.forced_termination);
        assert_eq!(result.stdout, "one\ntwo\n");
        assert_eq!(result.stderr, "oops\n");
        assert_eq!(streamed_out, ["one", "two"]);
        assert_eq!(streamed_err, ["oops"]);
    }

    #[cfg(unix)]
    #[test]
    fn invalid_utf8_output_does_not_stop_capture() {
        let script = "printf 'caf\\351\\n'; sleep 0.3; \
                      i=0; while [ $i -lt 3000 ]; do echo line $i; i=$((i+1)); done; \
                      echo done";
        let mut streamed = 0_usize;
        let result = quick_executor(Duration::from_secs(20))
            .run(
                &sh(script),
                &ProcessOptions::default(),
                &mut |_: &str| streamed += 1,
                &mut |_: &str| {},
            )
            .expect("process should run");

        assert_eq!(result.exit_code, 0, "stderr: {}", result.stderr);
        assert!(result.succeeded());
        let lines: Vec<&str> = result.stdout.lines().collect();
        assert_eq!(lines.first().copied(), Some("caf\u{FFFD}"));
        assert_eq!(lines.last().copied(), Some("done"));
        assert_eq!(lines.len(), 3002);
        assert_eq!(streamed, 3002);
    }

    #[test]
    fn decode_line_strips_line_endings_and_replaces_invalid_bytes() {
        assert_eq!(decode_line(b"plain\n"), "plain");
        assert_eq!(decode_line(b"crlf\r\n"), "crlf");
        assert_eq!(decode_line(b"caf\xe9"), "caf\u{FFFD}");
    }

    #[cfg(unix)]
    #[test]
    fn applies_working_directory_and_environment() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = Utf8PathBuf::try_from(dir.path().to_owned()).expect("utf-8 temp dir");
        let options = ProcessOptions::in_dir(&path).with_env("STEVEDORE_MARKER", "marker-value");

        let result = quick_executor(Duration::from_secs(10))
            .run(
                &sh("pwd; echo \"$STEVEDORE_MARKER\""),
                &options,
                &mut |_: &str| {},
                &mut |_: &str| {},
            )
            .expect("process should run");

        assert!(result.succeeded());
        let canonical = std::fs::canonicalize(dir.path()).expect("canonical temp dir");
        let lines: Vec<&str> = result.stdout.lines().collect();
        assert_eq!(
            std::fs::canonicalize(lines.first().copied().unwrap_or_default()).ok(),
            Some(canonical)
        );
        assert_eq!(lines.get(1).copied(), Some("marker-value"));
    }

    #[cfg(unix)]
    #[test]
    fn kills_process_that_outlives_timeout() {
        let invocation = CommandLine::new("sleep")
            .positional(30)
            .build()
            .expect("invocation should build");
        let started = Instant::now();
        let result = quick_executor(Duration::from_millis(300))
            .run(
                &invocation,
                &ProcessOptions::default(),
                &mut |_: &str| {},
                &mut |_: &str| {},
            )
            .expect("process should run");

        assert!(result.forced_termination);
        assert_eq!(result.exit_code, FORCED_EXIT_CODE);
        assert!(!result.succeeded());
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
