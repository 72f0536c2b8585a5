//! Process runner for the external tool.
//!
//! The runner quotes a request for the host's shell, makes sure the working
//! directory exists, streams stdout and stderr line by line while the
//! process runs, and turns the exit code into a result. When a process
//! fails it checks whether the executable is on the host's `PATH` so the
//! error can say so.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{format_exit_code, ProcessError, Result};
use crate::host::ExecutionHost;

use super::escape::ShellFlavor;
use super::request::ExecutionRequest;

/// One line of process output, tagged with the stream it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputLine {
    /// A line written to standard output.
    Stdout(String),
    /// A line written to standard error.
    Stderr(String),
}

/// How a process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    /// Exit code, absent when the process could not report one
    /// (e.g. killed by a signal).
    pub exit_code: Option<i32>,
    /// Whether the runner killed the process because of cancellation.
    pub cancelled: bool,
}

impl Completion {
    /// Returns true if the process exited with code zero.
    #[must_use]
    pub const fn succeeded(&self) -> bool {
        matches!(self.exit_code, Some(0))
    }
}

/// Receiver for streamed process output.
///
/// Lines are delivered on the task that drives the process, in the order
/// each stream produced them. Implementations must not block.
pub trait LineSink: Send {
    /// Handles a line of standard output.
    fn stdout(&mut self, line: &str);

    /// Handles a line of standard error.
    fn stderr(&mut self, line: &str);
}

/// Default sink: stdout as info logs, stderr as error logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl LineSink for LogSink {
    fn stdout(&mut self, line: &str) {
        info!("{line}");
    }

    fn stderr(&mut self, line: &str) {
        error!("{line}");
    }
}

/// Sink that captures stdout into a string and logs stderr.
#[derive(Debug, Default, Clone)]
pub struct CaptureSink {
    captured: String,
}

impl CaptureSink {
    /// Creates an empty capture sink.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            captured: String::new(),
        }
    }

    /// Consumes the sink, returning the captured text.
    #[must_use]
    pub fn into_captured(self) -> String {
        self.captured
    }
}

impl LineSink for CaptureSink {
    fn stdout(&mut self, line: &str) {
        self.captured.push_str(line);
        self.captured.push('\n');
    }

    fn stderr(&mut self, line: &str) {
        error!("{line}");
    }
}

/// Predicate that may accept an exit code before the default rule
/// (zero means success) is applied.
pub type ExitOverride<'a> = &'a (dyn Fn(Option<i32>) -> bool + Send + Sync);

/// Runs the external tool on an execution host.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    /// Host the tool runs on.
    host: Arc<dyn ExecutionHost>,
}

/// A started process whose output has not been consumed yet.
#[derive(Debug)]
pub struct RunningProcess {
    child: Child,
    lines: mpsc::UnboundedReceiver<OutputLine>,
    command_line: String,
}

impl ProcessRunner {
    /// Creates a runner for the given host.
    #[must_use]
    pub fn new(host: Arc<dyn ExecutionHost>) -> Self {
        Self { host }
    }

    /// Returns the execution host.
    #[must_use]
    pub fn host(&self) -> &Arc<dyn ExecutionHost> {
        &self.host
    }

    /// Returns the host's shell convention.
    #[must_use]
    pub fn shell(&self) -> ShellFlavor {
        self.host.shell()
    }

    /// Starts a process and begins streaming its output.
    ///
    /// # Errors
    ///
    /// Returns an error if the working directory cannot be created or the
    /// process cannot be spawned.
    pub async fn start(&self, request: &ExecutionRequest) -> Result<RunningProcess> {
        let shell = self.shell();
        let command_line = request.command_line(shell);

        debug!("Working directory: {}", request.working_directory.display());
        self.host.create_dir(&request.working_directory).await?;
        debug!("Running command: {command_line}");

        let mut cmd = self.host.command(
            &request.command,
            &request.escaped_arguments(shell),
            &request.working_directory,
        );
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| ProcessError::SpawnFailed {
            command_line: command_line.clone(),
            message: e.to_string(),
        })?;

        let (tx, lines) = mpsc::unbounded_channel();
        if let Some(stdout) = child.stdout.take() {
            spawn_line_reader(stdout, tx.clone(), OutputLine::Stdout);
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_line_reader(stderr, tx, OutputLine::Stderr);
        }

        Ok(RunningProcess {
            child,
            lines,
            command_line,
        })
    }

    /// Runs a request to completion, streaming its output into `sink`.
    ///
    /// A cancelled process is reported as [`ProcessError::Cancelled`] unless
    /// `exit_override` accepts its exit code. A non-zero exit is reported as
    /// [`ProcessError::ExecutionFailed`], with a hint when the executable
    /// does not appear to be installed.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be started, was cancelled, or
    /// exited with a failure code.
    pub async fn run<S: LineSink + ?Sized>(
        &self,
        request: &ExecutionRequest,
        sink: &mut S,
        cancel: &CancellationToken,
        exit_override: Option<ExitOverride<'_>>,
    ) -> Result<Completion> {
        let process = self.start(request).await?;
        let command_line = process.command_line.clone();
        let completion = process.drive(sink, cancel).await?;

        if exit_override.is_some_and(|accepts| accepts(completion.exit_code)) {
            return Ok(completion);
        }

        if completion.cancelled {
            debug!("Process was cancelled: {command_line}");
            return Err(ProcessError::Cancelled { command_line }.into());
        }

        if completion.succeeded() {
            info!("Process exit code indicates success.");
            return Ok(completion);
        }

        error!(
            "Process exit code indicates failure. ({})",
            format_exit_code(completion.exit_code)
        );

        let hint = self.diagnose_missing_executable(request, cancel).await;

        Err(ProcessError::ExecutionFailed {
            command_line,
            exit_code: completion.exit_code,
            working_directory: request.working_directory.clone(),
            hint,
        }
        .into())
    }

    /// Runs a request and returns its captured stdout.
    ///
    /// # Errors
    ///
    /// Same as [`ProcessRunner::run`].
    pub async fn capture(&self, request: &ExecutionRequest, cancel: &CancellationToken) -> Result<String> {
        let mut sink = CaptureSink::new();
        self.run(request, &mut sink, cancel, None).await?;
        Ok(sink.into_captured())
    }

    /// Checks whether the request's executable is on the host's `PATH`.
    ///
    /// Returns a hint when the locator reports the executable as missing.
    /// Any problem running the locator itself is logged and ignored.
    async fn diagnose_missing_executable(
        &self,
        request: &ExecutionRequest,
        cancel: &CancellationToken,
    ) -> Option<String> {
        let probe = match self.probe_request(request).await {
            Ok(probe) => probe,
            Err(e) => {
                debug!("Could not build executable probe: {e}");
                return None;
            }
        };

        let completion = match self.start(&probe).await {
            Ok(process) => process.drive(&mut DiscardSink, cancel).await,
            Err(e) => Err(e),
        };

        match completion {
            // 0 = found, 1 = not found, anything else = the locator itself failed
            Ok(Completion {
                exit_code: Some(1),
                cancelled: false,
            }) => {
                let hint = format!("Is {} installed and in the PATH?", request.command);
                warn!("{hint}");
                Some(hint)
            }
            Ok(completion) => {
                debug!(
                    "Executable probe exited with {}",
                    format_exit_code(completion.exit_code)
                );
                None
            }
            Err(e) => {
                debug!("Executable probe failed: {e}");
                None
            }
        }
    }

    async fn probe_request(&self, request: &ExecutionRequest) -> Result<ExecutionRequest> {
        let probe = match self.shell() {
            ShellFlavor::Posix => ExecutionRequest::new("/usr/bin/which", &request.working_directory)
                .arg("--")
                .arg(&request.command),
            ShellFlavor::Windows => {
                let system_root = self
                    .host
                    .environment_variable("SystemRoot")
                    .await?
                    .unwrap_or_else(|| String::from("C:\\Windows"));
                let locator: PathBuf = [system_root.as_str(), "System32", "where.exe"].iter().collect();
                ExecutionRequest::new(locator.to_string_lossy(), &request.working_directory)
                    .arg(&request.command)
            }
        };
        Ok(probe)
    }
}

impl RunningProcess {
    /// Feeds output into `sink` until the process exits or `cancel` fires.
    ///
    /// On cancellation the process is killed and output still in flight is
    /// discarded.
    ///
    /// # Errors
    ///
    /// Returns an error if waiting on the process fails.
    pub async fn drive<S: LineSink + ?Sized>(
        mut self,
        sink: &mut S,
        cancel: &CancellationToken,
    ) -> Result<Completion> {
        let mut cancelled = false;

        loop {
            tokio::select! {
                biased;

                () = cancel.cancelled() => {
                    self.kill();
                    cancelled = true;
                    break;
                }
                line = self.lines.recv() => match line {
                    Some(OutputLine::Stdout(text)) => sink.stdout(&text),
                    Some(OutputLine::Stderr(text)) => sink.stderr(&text),
                    None => break,
                },
            }
        }

        let status = loop {
            tokio::select! {
                status = self.child.wait() => break status,
                () = cancel.cancelled(), if !cancelled => {
                    self.kill();
                    cancelled = true;
                }
            }
        }
        .map_err(|e| ProcessError::SpawnFailed {
            command_line: self.command_line.clone(),
            message: format!("Failed to wait for process: {e}"),
        })?;

        Ok(Completion {
            exit_code: status.code(),
            cancelled,
        })
    }

    fn kill(&mut self) {
        debug!("Stopping process: {}", self.command_line);
        if let Err(e) = self.child.start_kill() {
            debug!("Process already exited: {e}");
        }
    }
}

/// Sink for the executable probe, whose output is irrelevant.
struct DiscardSink;

impl LineSink for DiscardSink {
    fn stdout(&mut self, _line: &str) {}

    fn stderr(&mut self, _line: &str) {}
}

fn spawn_line_reader<R>(
    reader: R,
    tx: mpsc::UnboundedSender<OutputLine>,
    wrap: fn(String) -> OutputLine,
) where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if tx.send(wrap(line)).is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    debug!("Stopped reading process output: {e}");
                    break;
                }
            }
        }
    });
}
