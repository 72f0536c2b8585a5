//! Error types for the kube-ensure reconciliation system.
//!
//! This module provides the error hierarchy for every stage of a
//! reconciliation cycle: configuration, process execution, document
//! parsing, condition watching, and convergence.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for the kube-ensure system.
#[derive(Debug, Error)]
pub enum KubeEnsureError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// External process errors.
    #[error("Process error: {0}")]
    Process(#[from] ProcessError),

    /// Structured document errors.
    #[error("Document error: {0}")]
    Document(#[from] DocumentError),

    /// Condition watch errors.
    #[error("Watch error: {0}")]
    Watch(#[from] WatchError),

    /// Reconciliation errors.
    #[error("Reconciliation error: {0}")]
    Reconcile(#[from] ReconcileError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// Two entries share the same (type, namespace, name) identity.
    #[error("Duplicate {section} entry: {identity}")]
    DuplicateIdentity {
        /// Configuration section (resources, waits).
        section: String,
        /// The duplicated identity.
        identity: String,
    },

    /// No entry matched a name filter.
    #[error("No {section} entry named '{name}'")]
    UnknownEntry {
        /// Configuration section (resources, waits).
        section: String,
        /// The requested name.
        name: String,
    },
}

/// External process errors.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The process could not be started.
    #[error("Failed to start '{command_line}': {message}")]
    SpawnFailed {
        /// Command line that was attempted.
        command_line: String,
        /// Description of the spawn failure.
        message: String,
    },

    /// The process exited with a failure code.
    #[error("{}", execution_failure_message(.command_line, .exit_code, .working_directory, .hint.as_deref()))]
    ExecutionFailed {
        /// Command line that was run.
        command_line: String,
        /// Exit code, if the process reported one.
        exit_code: Option<i32>,
        /// Working directory the process ran in.
        working_directory: PathBuf,
        /// Extra diagnosis, e.g. the executable is missing.
        hint: Option<String>,
    },

    /// The process was cancelled before it finished.
    #[error("Process '{command_line}' was cancelled")]
    Cancelled {
        /// Command line that was cancelled.
        command_line: String,
    },

    /// The execution host failed a filesystem operation.
    #[error("Execution host error on {path}: {message}")]
    HostIo {
        /// Path involved in the failing operation.
        path: PathBuf,
        /// Description of the failure.
        message: String,
    },
}

/// Structured document errors.
#[derive(Debug, Error)]
pub enum DocumentError {
    /// A captured document is not valid structured data.
    #[error("Failed to parse {document} document: {message}")]
    Parse {
        /// Which document failed (applied, template, actual).
        document: String,
        /// Parser message.
        message: String,
    },

    /// A manifest could not be rendered.
    #[error("Failed to render manifest: {message}")]
    Render {
        /// Description of the rendering failure.
        message: String,
    },
}

/// Condition watch errors.
#[derive(Debug, Error)]
pub enum WatchError {
    /// The watch was cancelled before the expected status was observed.
    #[error("Cancelled while waiting for {condition} to be \"{expected}\" on {resource}")]
    CancelledBeforeMatch {
        /// Condition type.
        condition: String,
        /// Expected status.
        expected: String,
        /// Resource being watched.
        resource: String,
    },

    /// The watch process ended without the expected status appearing.
    #[error("{resource} never reported {condition} = \"{expected}\" (exit code {})", exit_code_text(.exit_code))]
    ConditionNotReached {
        /// Condition type.
        condition: String,
        /// Expected status.
        expected: String,
        /// Resource being watched.
        resource: String,
        /// Exit code of the watch process.
        exit_code: Option<i32>,
    },
}

/// Reconciliation errors.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Reconciliation failed for a specific resource.
    #[error("Failed to reconcile {resource}: {reason}")]
    ResourceReconcileFailed {
        /// Resource description.
        resource: String,
        /// Reason for failure.
        reason: String,
    },

    /// Drift detected but convergence was not requested.
    #[error("Drift detected for {resource}: {count} difference(s)")]
    DriftDetected {
        /// Resource with drift.
        resource: String,
        /// Number of differences.
        count: usize,
    },

    /// Reconciliation was aborted.
    #[error("Reconciliation aborted: {reason}")]
    Aborted {
        /// Reason for abort.
        reason: String,
    },
}

/// Result type alias for kube-ensure operations.
pub type Result<T> = std::result::Result<T, KubeEnsureError>;

/// Formats an optional exit code, `(unknown)` when absent.
#[must_use]
pub fn format_exit_code(exit_code: Option<i32>) -> String {
    exit_code.map_or_else(|| String::from("(unknown)"), |code| code.to_string())
}

#[allow(clippy::ref_option)]
fn exit_code_text(exit_code: &Option<i32>) -> String {
    format_exit_code(*exit_code)
}

#[allow(clippy::ref_option)]
fn execution_failure_message(
    command_line: &str,
    exit_code: &Option<i32>,
    working_directory: &std::path::Path,
    hint: Option<&str>,
) -> String {
    let mut message = format!(
        "'{command_line}' exited with code {} (working directory: {})",
        format_exit_code(*exit_code),
        working_directory.display()
    );
    if let Some(hint) = hint {
        message.push_str(". ");
        message.push_str(hint);
    }
    message
}

impl KubeEnsureError {
    /// Returns true if this error is a cancellation rather than a failure.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Self::Process(ProcessError::Cancelled { .. })
                | Self::Watch(WatchError::CancelledBeforeMatch { .. })
        )
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }
}

impl ProcessError {
    /// Creates a host filesystem error.
    #[must_use]
    pub fn host_io(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::HostIo {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl DocumentError {
    /// Creates a parse error for the named document.
    #[must_use]
    pub fn parse(document: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            document: document.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_failure_includes_hint() {
        let err = ProcessError::ExecutionFailed {
            command_line: String::from("kubectl apply"),
            exit_code: Some(127),
            working_directory: PathBuf::from("/tmp/work"),
            hint: Some(String::from("Is kubectl installed and in the PATH?")),
        };

        let message = err.to_string();
        assert!(message.contains("exited with code 127"));
        assert!(message.contains("/tmp/work"));
        assert!(message.ends_with("Is kubectl installed and in the PATH?"));
    }

    #[test]
    fn test_unknown_exit_code() {
        assert_eq!(format_exit_code(None), "(unknown)");
        assert_eq!(format_exit_code(Some(2)), "2");
    }

    #[test]
    fn test_cancellation_classification() {
        let cancelled = KubeEnsureError::from(ProcessError::Cancelled {
            command_line: String::from("kubectl get"),
        });
        assert!(cancelled.is_cancelled());
        let invalid = KubeEnsureError::from(ConfigError::validation("boom", "tool.executable"));
        assert!(!invalid.is_cancelled());
    }
}
