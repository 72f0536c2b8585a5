//! Convergence actions.
//!
//! Once drift is found, one command brings the cluster in line with the
//! descriptor: `delete` when it should not exist, `replace` when forced,
//! `apply` otherwise.

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::ResourceDescriptor;
use crate::error::Result;
use crate::kubectl::KubectlClient;
use crate::process::{Completion, LogSink};

/// Command used to converge a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "action")]
pub enum ConvergenceAction {
    /// Idempotent upsert.
    Apply,
    /// Save the current config and overwrite.
    Replace,
    /// Remove the resource.
    Delete {
        /// Pass `--force`.
        force: bool,
    },
}

impl ConvergenceAction {
    /// Chooses the action for a descriptor.
    #[must_use]
    pub const fn for_descriptor(descriptor: &ResourceDescriptor) -> Self {
        match (descriptor.exists, descriptor.force) {
            (false, force) => Self::Delete { force },
            (true, true) => Self::Replace,
            (true, false) => Self::Apply,
        }
    }

    /// Returns the subcommand.
    #[must_use]
    pub const fn verb(&self) -> &'static str {
        match self {
            Self::Apply => "apply",
            Self::Replace => "replace",
            Self::Delete { .. } => "delete",
        }
    }

    /// Returns the arguments placed after the manifest.
    #[must_use]
    pub const fn arguments(&self) -> &'static [&'static str] {
        match self {
            Self::Apply => &[],
            Self::Replace => &["--save-config", "--force"],
            Self::Delete { force: false } => &["--ignore-not-found"],
            Self::Delete { force: true } => &["--ignore-not-found", "--force"],
        }
    }
}

impl std::fmt::Display for ConvergenceAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Delete { force: true } => write!(f, "delete (forced)"),
            _ => write!(f, "{}", self.verb()),
        }
    }
}

/// Runs convergence actions.
#[derive(Debug, Clone)]
pub struct Converger<'a> {
    client: &'a KubectlClient,
}

impl<'a> Converger<'a> {
    /// Creates a converger using the given client.
    #[must_use]
    pub const fn new(client: &'a KubectlClient) -> Self {
        Self { client }
    }

    /// Runs the action chosen for a descriptor, logging the tool's output.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails or is cancelled.
    pub async fn converge(
        &self,
        descriptor: &ResourceDescriptor,
        cancel: &CancellationToken,
    ) -> Result<ConvergenceAction> {
        let action = ConvergenceAction::for_descriptor(descriptor);
        self.run(action, descriptor, cancel).await?;
        Ok(action)
    }

    /// Runs a specific action.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails or is cancelled.
    pub async fn run(
        &self,
        action: ConvergenceAction,
        descriptor: &ResourceDescriptor,
        cancel: &CancellationToken,
    ) -> Result<Completion> {
        info!("Running {action} for {}", descriptor.display_name());
        self.client
            .run_with_manifest(action.verb(), descriptor, action.arguments(), &mut LogSink, cancel)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(exists: bool, force: bool) -> ResourceDescriptor {
        let mut descriptor = ResourceDescriptor::new("deployment", "default", "web", "replicas: 3");
        descriptor.exists = exists;
        descriptor.force = force;
        descriptor
    }

    #[test]
    fn test_action_selection() {
        assert_eq!(
            ConvergenceAction::for_descriptor(&descriptor(true, false)),
            ConvergenceAction::Apply
        );
        assert_eq!(
            ConvergenceAction::for_descriptor(&descriptor(true, true)),
            ConvergenceAction::Replace
        );
        assert_eq!(
            ConvergenceAction::for_descriptor(&descriptor(false, true)),
            ConvergenceAction::Delete { force: true }
        );
    }

    #[test]
    fn test_action_arguments() {
        assert_eq!(ConvergenceAction::Replace.arguments(), ["--save-config", "--force"]);
        assert_eq!(
            ConvergenceAction::Delete { force: false }.arguments(),
            ["--ignore-not-found"]
        );
        assert_eq!(ConvergenceAction::Delete { force: true }.to_string(), "delete (forced)");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_converge_runs_delete() {
        use crate::kubectl::tests::{fake_client, recorded_calls};

        let temp = tempfile::TempDir::new().expect("Failed to create temp dir");
        let client = fake_client(&temp, "echo 'deployment.apps \"web\" deleted'");

        let action = Converger::new(&client)
            .converge(&descriptor(false, false), &CancellationToken::new())
            .await
            .expect("converge failed");

        assert_eq!(action, ConvergenceAction::Delete { force: false });
        let calls = recorded_calls(&temp);
        assert_eq!(calls[0][0], "delete");
        assert_eq!(calls[0][1], "--filename");
        assert_eq!(&calls[0][3..], ["--ignore-not-found"]);
    }
}
