//! Reconciler for maintaining desired state.
//!
//! This module drives reconciliation cycles: for each resource it collects
//! the dry-run previews and live state, compares them, and converges the
//! resource when they differ. Resources are handled one after another and
//! share nothing between cycles.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::ResourceDescriptor;
use crate::converge::{ConvergenceAction, Converger};
use crate::diff::{compare, Difference};
use crate::error::{KubeEnsureError, ReconcileError, Result};
use crate::kubectl::KubectlClient;
use crate::snapshot::Snapshotter;

/// Reconciler for a list of resources.
#[derive(Debug, Clone)]
pub struct Reconciler<'a> {
    /// Collects previews and live state.
    snapshotter: Snapshotter<'a>,
    /// Runs convergence actions.
    converger: Converger<'a>,
    /// Keep going after a resource fails.
    continue_on_error: bool,
}

/// Outcome of inspecting (and possibly converging) one resource.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceReport {
    /// `type namespace::name` label.
    pub resource: String,
    /// Whether the resource should exist.
    pub desired_exists: bool,
    /// Whether the resource existed when inspected.
    pub exists: bool,
    /// Differences found, empty when in sync.
    pub differences: Vec<Difference>,
    /// Action taken, if any.
    pub action: Option<ConvergenceAction>,
    /// Live YAML rendering, when the resource exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_spec: Option<String>,
}

impl ResourceReport {
    /// Returns true if the resource drifted from its descriptor.
    #[must_use]
    pub fn has_drift(&self) -> bool {
        !self.differences.is_empty()
    }
}

/// Result of a reconciliation run.
#[derive(Debug, Serialize)]
pub struct ReconciliationResult {
    /// Identifier of this run, for correlating logs.
    pub run_id: Uuid,
    /// Whether every resource ended in sync.
    pub success: bool,
    /// Number of resources applied.
    pub applied: usize,
    /// Number of resources replaced.
    pub replaced: usize,
    /// Number of resources deleted.
    pub deleted: usize,
    /// Number of resources already in sync.
    pub unchanged: usize,
    /// Errors encountered.
    pub errors: Vec<String>,
    /// Per-resource reports, in configuration order.
    pub resources: Vec<ResourceReport>,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished.
    pub finished_at: DateTime<Utc>,
}

/// Report of drift detection.
#[derive(Debug, Serialize)]
pub struct DriftReport {
    /// Whether drift was detected.
    pub has_drift: bool,
    /// Resources that have drifted.
    pub drifted_resources: Vec<String>,
    /// Total number of resources checked.
    pub total_resources: usize,
    /// Per-resource reports, in configuration order.
    pub resources: Vec<ResourceReport>,
    /// When the check ran.
    pub checked_at: DateTime<Utc>,
}

impl<'a> Reconciler<'a> {
    /// Creates a new reconciler.
    #[must_use]
    pub const fn new(client: &'a KubectlClient) -> Self {
        Self {
            snapshotter: Snapshotter::new(client),
            converger: Converger::new(client),
            continue_on_error: false,
        }
    }

    /// Keeps reconciling the remaining resources after one fails.
    #[must_use]
    pub const fn with_continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    /// Collects state for one resource and compares it.
    ///
    /// # Errors
    ///
    /// Returns an error if collecting state fails.
    pub async fn inspect(
        &self,
        descriptor: &ResourceDescriptor,
        cancel: &CancellationToken,
    ) -> Result<ResourceReport> {
        let state = self.snapshotter.collect(descriptor, cancel).await?;
        let differences = compare(descriptor, &state);

        debug!(
            "{}: {} difference(s)",
            descriptor.display_name(),
            differences.len()
        );

        Ok(ResourceReport {
            resource: descriptor.display_name(),
            desired_exists: descriptor.exists,
            exists: state.exists,
            differences,
            action: None,
            display_spec: state.display_spec,
        })
    }

    /// Runs one reconciliation cycle for a resource.
    ///
    /// # Errors
    ///
    /// Returns an error if collecting state or converging fails.
    pub async fn reconcile_resource(
        &self,
        descriptor: &ResourceDescriptor,
        cancel: &CancellationToken,
    ) -> Result<ResourceReport> {
        info!("{}", descriptor.describe());
        let mut report = self.inspect(descriptor, cancel).await?;

        if report.has_drift() {
            for difference in &report.differences {
                info!("{difference}");
            }
            report.action = Some(self.converger.converge(descriptor, cancel).await?);
        } else {
            info!("{} is up to date", descriptor.display_name());
        }

        Ok(report)
    }

    /// Reconciles every resource in order.
    ///
    /// # Errors
    ///
    /// Returns an error if the run is cancelled, or if a resource fails and
    /// `continue_on_error` is not set.
    pub async fn reconcile(
        &self,
        resources: &[ResourceDescriptor],
        cancel: &CancellationToken,
    ) -> Result<ReconciliationResult> {
        let mut result = ReconciliationResult {
            run_id: Uuid::new_v4(),
            success: true,
            applied: 0,
            replaced: 0,
            deleted: 0,
            unchanged: 0,
            errors: vec![],
            resources: Vec::with_capacity(resources.len()),
            started_at: Utc::now(),
            finished_at: Utc::now(),
        };

        info!(
            "Starting reconciliation {} of {} resource(s)",
            result.run_id,
            resources.len()
        );

        for descriptor in resources {
            match self.reconcile_resource(descriptor, cancel).await {
                Ok(report) => {
                    match report.action {
                        Some(ConvergenceAction::Apply) => result.applied += 1,
                        Some(ConvergenceAction::Replace) => result.replaced += 1,
                        Some(ConvergenceAction::Delete { .. }) => result.deleted += 1,
                        None => result.unchanged += 1,
                    }
                    result.resources.push(report);
                }
                Err(err) if err.is_cancelled() => {
                    return Err(KubeEnsureError::Reconcile(ReconcileError::Aborted {
                        reason: format!("cancelled while reconciling {}", descriptor.display_name()),
                    }));
                }
                Err(err) => {
                    error!("Failed to reconcile {}: {err}", descriptor.display_name());
                    let failure = ReconcileError::ResourceReconcileFailed {
                        resource: descriptor.display_name(),
                        reason: err.to_string(),
                    };
                    if !self.continue_on_error {
                        return Err(failure.into());
                    }
                    result.success = false;
                    result.errors.push(failure.to_string());
                }
            }
        }

        result.finished_at = Utc::now();
        Ok(result)
    }

    /// Checks every resource for drift without changing anything.
    ///
    /// # Errors
    ///
    /// Returns an error if collecting state for any resource fails.
    pub async fn check_drift(
        &self,
        resources: &[ResourceDescriptor],
        cancel: &CancellationToken,
    ) -> Result<DriftReport> {
        info!("Checking {} resource(s) for drift", resources.len());

        let mut reports = Vec::with_capacity(resources.len());
        for descriptor in resources {
            let report = self.inspect(descriptor, cancel).await?;
            if report.has_drift() {
                warn!("{} has drifted", report.resource);
            }
            reports.push(report);
        }

        let drifted_resources: Vec<String> = reports
            .iter()
            .filter(|r| r.has_drift())
            .map(|r| r.resource.clone())
            .collect();

        Ok(DriftReport {
            has_drift: !drifted_resources.is_empty(),
            drifted_resources,
            total_resources: resources.len(),
            resources: reports,
            checked_at: Utc::now(),
        })
    }
}

impl DriftReport {
    /// Returns true if the state is converged (no drift).
    #[must_use]
    pub const fn is_converged(&self) -> bool {
        !self.has_drift
    }

    /// Converts a drifted report into [`ReconcileError::DriftDetected`] for
    /// the first drifted resource.
    ///
    /// # Errors
    ///
    /// Returns an error if any resource drifted.
    pub fn ensure_converged(&self) -> Result<()> {
        match self.resources.iter().find(|r| r.has_drift()) {
            Some(report) => Err(ReconcileError::DriftDetected {
                resource: report.resource.clone(),
                count: report.differences.len(),
            }
            .into()),
            None => Ok(()),
        }
    }
}

impl std::fmt::Display for DriftReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.has_drift {
            writeln!(f, "Drift detected:")?;
            for resource in &self.drifted_resources {
                writeln!(f, "  - {resource}")?;
            }
        } else {
            write!(f, "No drift detected - state is converged")?;
        }
        Ok(())
    }
}

impl std::fmt::Display for ReconciliationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = if self.success { "successful" } else { "failed" };
        writeln!(f, "Reconciliation {status}:")?;
        writeln!(f, "  Applied: {}", self.applied)?;
        writeln!(f, "  Replaced: {}", self.replaced)?;
        writeln!(f, "  Deleted: {}", self.deleted)?;
        writeln!(f, "  Unchanged: {}", self.unchanged)?;

        if !self.errors.is_empty() {
            writeln!(f, "  Errors:")?;
            for error in &self.errors {
                writeln!(f, "    - {error}")?;
            }
        }

        Ok(())
    }
}
