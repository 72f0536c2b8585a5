//! Resource materialization.
//!
//! Renders a [`ResourceDescriptor`] into a manifest the external tool can
//! read with `--filename`, writes it to a uniquely named file on the
//! execution host, and removes that file once the dependent command is done.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::ResourceDescriptor;
use crate::error::{DocumentError, Result};
use crate::host::ExecutionHost;

/// Subdirectory of the scratch directory that holds transient manifests.
const SCRIPTS_DIR: &str = "scripts";

/// Renders the manifest for a descriptor.
///
/// Kind, namespace, name and labels are written as JSON scalars/objects,
/// which YAML accepts verbatim, so no value can break the document
/// structure. The spec body is inserted as-is, indented under `spec:`.
///
/// # Errors
///
/// Returns an error if a value cannot be serialized.
pub fn render_manifest(descriptor: &ResourceDescriptor, api_version: &str) -> Result<String> {
    let kind = to_json(&descriptor.resource_type)?;
    let labels = to_json(&descriptor.labels)?;
    let namespace = to_json(&descriptor.namespace)?;
    let name = to_json(&descriptor.name)?;
    let spec = descriptor.spec.trim_end().replace('\n', "\n  ");

    Ok(format!(
        "apiVersion: {api_version}\n\
         kind: {kind}\n\
         metadata:\n  \
         labels: {labels}\n  \
         namespace: {namespace}\n  \
         name: {name}\n\
         spec:\n  \
         {spec}\n"
    ))
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| {
        DocumentError::Render {
            message: e.to_string(),
        }
        .into()
    })
}

/// Writes manifests for descriptors to transient files.
#[derive(Debug, Clone)]
pub struct Materializer {
    /// Host the manifests are written to.
    host: Arc<dyn ExecutionHost>,
    /// Scratch directory on the host.
    scratch_dir: PathBuf,
    /// `apiVersion` written into manifests.
    api_version: String,
}

impl Materializer {
    /// Creates a materializer writing under `scratch_dir` on `host`.
    #[must_use]
    pub fn new(
        host: Arc<dyn ExecutionHost>,
        scratch_dir: impl Into<PathBuf>,
        api_version: impl Into<String>,
    ) -> Self {
        Self {
            host,
            scratch_dir: scratch_dir.into(),
            api_version: api_version.into(),
        }
    }

    /// Renders the manifest for a descriptor without writing it.
    ///
    /// # Errors
    ///
    /// Returns an error if rendering fails.
    pub fn render(&self, descriptor: &ResourceDescriptor) -> Result<String> {
        render_manifest(descriptor, &self.api_version)
    }

    /// Renders and writes the manifest for a descriptor.
    ///
    /// The returned [`TransientDocument`] owns the file; call
    /// [`TransientDocument::cleanup`] when the dependent command finishes.
    ///
    /// # Errors
    ///
    /// Returns an error if rendering or writing fails.
    pub async fn materialize(&self, descriptor: &ResourceDescriptor) -> Result<TransientDocument> {
        let manifest = self.render(descriptor)?;

        let dir = self.scratch_dir.join(SCRIPTS_DIR);
        self.host.create_dir(&dir).await?;

        let path = dir.join(Uuid::new_v4().simple().to_string());
        let document = TransientDocument {
            path,
            host: Arc::clone(&self.host),
            removed: false,
        };

        debug!("Writing manifest for {} to {}", descriptor.display_name(), document.path.display());
        self.host.write_file(&document.path, &manifest).await?;

        Ok(document)
    }
}

/// A manifest file that exists only for the duration of one command.
///
/// The file is removed by [`cleanup`](Self::cleanup). If the owner is
/// dropped first (an error path or a cancelled future), removal is handed
/// to the runtime instead.
#[derive(Debug)]
pub struct TransientDocument {
    path: PathBuf,
    host: Arc<dyn ExecutionHost>,
    removed: bool,
}

impl TransientDocument {
    /// Returns the path of the manifest on the host.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Deletes the manifest.
    ///
    /// # Errors
    ///
    /// Returns an error if the host cannot delete the file.
    pub async fn cleanup(mut self) -> Result<()> {
        self.removed = true;
        self.host.remove_file(&self.path).await
    }
}

impl Drop for TransientDocument {
    fn drop(&mut self) {
        if self.removed {
            return;
        }

        let path = std::mem::take(&mut self.path);
        let host = Arc::clone(&self.host);

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = host.remove_file(&path).await {
                        warn!("Failed to remove transient manifest {}: {e}", path.display());
                    }
                });
            }
            Err(_) => warn!("Transient manifest left behind: {}", path.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::LocalHost;
    use tempfile::TempDir;

    fn descriptor() -> ResourceDescriptor {
        let mut descriptor = ResourceDescriptor::new(
            "job",
            "batch",
            "nightly \"report\"",
            "template:\n  spec:\n    restartPolicy: Never\n\n",
        );
        descriptor.labels.insert(String::from("app"), String::from("report"));
        descriptor
    }

    #[test]
    fn test_render_manifest() {
        let manifest = render_manifest(&descriptor(), "batch/v1").expect("render failed");

        assert_eq!(
            manifest,
            "apiVersion: batch/v1\n\
             kind: \"job\"\n\
             metadata:\n  \
             labels: {\"app\":\"report\"}\n  \
             namespace: \"batch\"\n  \
             name: \"nightly \\\"report\\\"\"\n\
             spec:\n  \
             template:\n    \
             spec:\n      \
             restartPolicy: Never\n"
        );
    }

    #[test]
    fn test_render_keeps_label_order() {
        let mut descriptor = ResourceDescriptor::new("job", "batch", "nightly", "x: 1");
        descriptor.labels.insert("zone", "eu");
        descriptor.labels.insert("app", "report");

        let manifest = render_manifest(&descriptor, "batch/v1").expect("render failed");
        assert!(manifest.contains("labels: {\"zone\":\"eu\",\"app\":\"report\"}\n"));
    }

    #[test]
    fn test_rendered_manifest_is_valid_yaml() {
        let manifest = render_manifest(&descriptor(), "batch/v1").expect("render failed");
        let parsed: serde_json::Value = serde_yaml::from_str(&manifest).expect("invalid yaml");

        assert_eq!(parsed["metadata"]["name"], "nightly \"report\"");
        assert_eq!(parsed["metadata"]["labels"]["app"], "report");
        assert_eq!(parsed["spec"]["template"]["spec"]["restartPolicy"], "Never");
    }

    #[tokio::test]
    async fn test_materialize_and_cleanup() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let materializer = Materializer::new(Arc::new(LocalHost::new()), temp.path(), "batch/v1");

        let document = materializer.materialize(&descriptor()).await.expect("materialize failed");
        let path = document.path().to_path_buf();

        assert!(path.starts_with(temp.path().join("scripts")));
        assert!(std::fs::read_to_string(&path).expect("read failed").contains("kind: \"job\""));

        document.cleanup().await.expect("cleanup failed");
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_unique_file_names() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let materializer = Materializer::new(Arc::new(LocalHost::new()), temp.path(), "batch/v1");

        let first = materializer.materialize(&descriptor()).await.expect("materialize failed");
        let second = materializer.materialize(&descriptor()).await.expect("materialize failed");
        assert_ne!(first.path(), second.path());

        first.cleanup().await.expect("cleanup failed");
        second.cleanup().await.expect("cleanup failed");
    }

    #[tokio::test]
    async fn test_drop_removes_file() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let materializer = Materializer::new(Arc::new(LocalHost::new()), temp.path(), "batch/v1");

        let document = materializer.materialize(&descriptor()).await.expect("materialize failed");
        let path = document.path().to_path_buf();
        drop(document);

        for _ in 0..50 {
            if !path.exists() {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("transient manifest was not removed: {}", path.display());
    }
}
