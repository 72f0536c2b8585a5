//! External process execution.
//!
//! This module turns an [`ExecutionRequest`] into a running process on an
//! execution host:
//! - Per-argument quoting for POSIX and Windows command lines
//! - Line-by-line streaming of stdout and stderr
//! - Cooperative cancellation
//! - Diagnosis of a missing executable on failure

mod escape;
mod request;
mod runner;

pub use escape::{escape_posix_arg, escape_windows_arg, ShellFlavor};
pub use request::ExecutionRequest;
pub use runner::{
    CaptureSink, Completion, ExitOverride, LineSink, LogSink, OutputLine, ProcessRunner,
    RunningProcess,
};
