//! State snapshotter.
//!
//! Collects the three documents a reconciliation decision needs: what an
//! `apply` would produce, what a `create` would produce, and what is live
//! right now. The calls are strictly sequential.

use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::ResourceDescriptor;
use crate::error::{DocumentError, Result};
use crate::kubectl::KubectlClient;

/// Parsed documents describing one resource.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    /// Live document, absent when the resource does not exist.
    pub normalized_actual: Option<Value>,
    /// Dry-run `apply` preview.
    pub normalized_applied: Value,
    /// Dry-run `create` preview.
    pub normalized_template: Value,
}

/// Everything the snapshotter collected for one resource.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectedState {
    /// Whether the resource currently exists.
    pub exists: bool,
    /// Parsed documents.
    pub snapshot: Snapshot,
    /// Live YAML rendering, for display only.
    pub display_spec: Option<String>,
}

/// Collects snapshots through the external tool.
#[derive(Debug, Clone)]
pub struct Snapshotter<'a> {
    client: &'a KubectlClient,
}

impl<'a> Snapshotter<'a> {
    /// Creates a snapshotter using the given client.
    #[must_use]
    pub const fn new(client: &'a KubectlClient) -> Self {
        Self { client }
    }

    /// Collects the previews and live state for a descriptor.
    ///
    /// # Errors
    ///
    /// Returns an error if any invocation fails or its output is not valid
    /// JSON.
    pub async fn collect(
        &self,
        descriptor: &ResourceDescriptor,
        cancel: &CancellationToken,
    ) -> Result<CollectedState> {
        info!("Collecting state for {}", descriptor.display_name());
        let dry_run = self.client.dry_run_arg();

        let applied = self
            .client
            .capture_with_manifest("apply", descriptor, &[dry_run, "--output", "json"], cancel)
            .await?;
        let normalized_applied = parse_document("applied", &applied)?;

        let template = self
            .client
            .capture_with_manifest("create", descriptor, &[dry_run, "--output", "json"], cancel)
            .await?;
        let normalized_template = parse_document("template", &template)?;

        let actual = self.read_live(descriptor, "json", cancel).await?;
        let normalized_actual = if actual.trim().is_empty() {
            None
        } else {
            Some(parse_document("actual", &actual)?)
        };

        let exists = normalized_actual.is_some();
        let display_spec = if exists {
            Some(self.read_live(descriptor, "yaml", cancel).await?)
        } else {
            debug!("{} does not exist", descriptor.display_name());
            None
        };

        Ok(CollectedState {
            exists,
            snapshot: Snapshot {
                normalized_actual,
                normalized_applied,
                normalized_template,
            },
            display_spec,
        })
    }

    /// Reads the live resource; a missing resource yields empty output.
    async fn read_live(
        &self,
        descriptor: &ResourceDescriptor,
        format: &str,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let request = self
            .client
            .request()
            .arg("get")
            .args(&descriptor.add_args)
            .arg("--output")
            .arg(format)
            .arg("--ignore-not-found")
            .arg("--namespace")
            .arg(&descriptor.namespace)
            .arg("--")
            .arg(&descriptor.resource_type)
            .arg(&descriptor.name);

        self.client.capture(&request, cancel).await
    }
}

fn parse_document(document: &str, text: &str) -> Result<Value> {
    serde_json::from_str(text).map_err(|e| DocumentError::parse(document, e.to_string()).into())
}
