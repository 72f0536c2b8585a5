//! Client for the external cluster tool.
//!
//! Every invocation shares the same executable, working directory and
//! execution host. Invocations that read a descriptor's manifest go through
//! [`KubectlClient::run_with_manifest`], which materializes the manifest,
//! passes it with `--filename` and removes it again whatever the outcome.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::{ResourceDescriptor, ToolConfig};
use crate::error::Result;
use crate::host::{ExecutionHost, LocalHost, SshHost};
use crate::materialize::Materializer;
use crate::process::{CaptureSink, Completion, ExecutionRequest, LineSink, ProcessRunner};

/// Builds the execution host described by a tool configuration.
#[must_use]
pub fn host_for(tool: &ToolConfig) -> Arc<dyn ExecutionHost> {
    match &tool.remote {
        Some(remote) => {
            Arc::new(SshHost::new(&remote.host).with_options(remote.options.iter().cloned()))
        }
        None => match tool.shell {
            Some(shell) => Arc::new(LocalHost::with_shell(shell)),
            None => Arc::new(LocalHost::new()),
        },
    }
}

/// Client for the external cluster tool.
#[derive(Debug, Clone)]
pub struct KubectlClient {
    /// Process runner bound to the execution host.
    runner: ProcessRunner,
    /// Writes transient manifests on the same host.
    materializer: Materializer,
    /// Executable name or path.
    executable: String,
    /// Working directory for every invocation.
    working_dir: PathBuf,
    /// `--dry-run` flag used for previews.
    dry_run_arg: &'static str,
}

impl KubectlClient {
    /// Creates a client.
    #[must_use]
    pub fn new(
        runner: ProcessRunner,
        materializer: Materializer,
        executable: impl Into<String>,
        working_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            runner,
            materializer,
            executable: executable.into(),
            working_dir: working_dir.into(),
            dry_run_arg: "--dry-run",
        }
    }

    /// Creates a client from a tool configuration.
    ///
    /// Relative directories are resolved against `base`.
    #[must_use]
    pub fn from_config(tool: &ToolConfig, base: &Path) -> Self {
        let host = host_for(tool);
        let materializer = Materializer::new(
            Arc::clone(&host),
            tool.resolve_scratch_dir(base),
            tool.api_version.clone(),
        );

        Self::new(
            ProcessRunner::new(host),
            materializer,
            tool.executable.clone(),
            tool.resolve_working_dir(base),
        )
        .with_dry_run_arg(tool.dry_run_arg())
    }

    /// Sets the `--dry-run` flag used for previews.
    #[must_use]
    pub const fn with_dry_run_arg(mut self, arg: &'static str) -> Self {
        self.dry_run_arg = arg;
        self
    }

    /// Returns the process runner.
    #[must_use]
    pub const fn runner(&self) -> &ProcessRunner {
        &self.runner
    }

    /// Returns the manifest materializer.
    #[must_use]
    pub const fn materializer(&self) -> &Materializer {
        &self.materializer
    }

    /// Returns the executable name.
    #[must_use]
    pub fn executable(&self) -> &str {
        &self.executable
    }

    /// Returns the `--dry-run` flag used for previews.
    #[must_use]
    pub const fn dry_run_arg(&self) -> &'static str {
        self.dry_run_arg
    }

    /// Starts a request for the tool with no arguments.
    #[must_use]
    pub fn request(&self) -> ExecutionRequest {
        ExecutionRequest::new(&self.executable, &self.working_dir)
    }

    /// Runs `<verb> <add_args…> --filename <manifest> <verb_args…>`.
    ///
    /// The manifest exists only while the command runs.
    ///
    /// # Errors
    ///
    /// Returns an error if the manifest cannot be written or the command
    /// fails. Failing to remove the manifest afterwards is only logged.
    pub async fn run_with_manifest<S: LineSink + ?Sized>(
        &self,
        verb: &str,
        descriptor: &ResourceDescriptor,
        verb_args: &[&str],
        sink: &mut S,
        cancel: &CancellationToken,
    ) -> Result<Completion> {
        let document = self.materializer.materialize(descriptor).await?;

        let request = self
            .request()
            .arg(verb)
            .args(&descriptor.add_args)
            .arg("--filename")
            .arg(document.path().to_string_lossy())
            .args(verb_args.iter().copied());

        let result = self.runner.run(&request, sink, cancel, None).await;

        let path = document.path().to_path_buf();
        match document.cleanup().await {
            Ok(()) => debug!("Removed manifest {}", path.display()),
            Err(e) => warn!("Failed to remove manifest {}: {e}", path.display()),
        }

        result
    }

    /// Same as [`run_with_manifest`](Self::run_with_manifest), returning
    /// the captured stdout.
    ///
    /// # Errors
    ///
    /// Same as [`run_with_manifest`](Self::run_with_manifest).
    pub async fn capture_with_manifest(
        &self,
        verb: &str,
        descriptor: &ResourceDescriptor,
        verb_args: &[&str],
        cancel: &CancellationToken,
    ) -> Result<String> {
        let mut sink = CaptureSink::new();
        self.run_with_manifest(verb, descriptor, verb_args, &mut sink, cancel)
            .await?;
        Ok(sink.into_captured())
    }

    /// Runs a request built from [`request`](Self::request) and returns its
    /// captured stdout.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails or is cancelled.
    pub async fn capture(&self, request: &ExecutionRequest, cancel: &CancellationToken) -> Result<String> {
        self.runner.capture(request, cancel).await
    }
}

#[cfg(all(test, unix))]
pub(crate) mod tests {
    use super::*;
    use crate::process::ShellFlavor;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    /// Line written after each recorded call. No test passes it as an argument.
    pub(crate) const END_OF_CALL: &str = "=== end of call ===";

    /// Writes an executable fake tool script and returns a client using it.
    ///
    /// The script appends its arguments, one per line followed by
    /// [`END_OF_CALL`], to `calls.log` in the temp directory, copies any
    /// `--filename` manifest to `last-manifest.yaml`, then runs `body`.
    pub(crate) fn fake_client(temp: &TempDir, body: &str) -> KubectlClient {
        let script = temp.path().join("fake-kubectl");
        let log = temp.path().join("calls.log");
        let manifest_copy = temp.path().join("last-manifest.yaml");
        let contents = format!(
            "#!/bin/sh\n\
             for a in \"$@\"; do printf '%s\\n' \"$a\" >> '{log}'; done\n\
             echo '{end}' >> '{log}'\n\
             prev=''\n\
             for a in \"$@\"; do\n\
               if [ \"$prev\" = '--filename' ]; then cp \"$a\" '{copy}'; fi\n\
               prev=\"$a\"\n\
             done\n\
             {body}\n",
            log = log.display(),
            copy = manifest_copy.display(),
            end = END_OF_CALL,
        );
        std::fs::write(&script, contents).expect("Failed to write fake tool");
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755))
            .expect("Failed to mark fake tool executable");

        let host: Arc<dyn ExecutionHost> = Arc::new(LocalHost::with_shell(ShellFlavor::Posix));
        let materializer = Materializer::new(Arc::clone(&host), temp.path().join("scratch"), "apps/v1");
        KubectlClient::new(
            ProcessRunner::new(host),
            materializer,
            script.to_string_lossy(),
            temp.path().join("work"),
        )
    }

    /// Returns the recorded invocations, one argument list per call.
    pub(crate) fn recorded_calls(temp: &TempDir) -> Vec<Vec<String>> {
        let log = std::fs::read_to_string(temp.path().join("calls.log")).unwrap_or_default();
        let mut calls = Vec::new();
        let mut current = Vec::new();
        for line in log.lines() {
            if line == END_OF_CALL {
                calls.push(std::mem::take(&mut current));
            } else {
                current.push(line.to_string());
            }
        }
        calls
    }

    fn descriptor() -> ResourceDescriptor {
        let mut descriptor = ResourceDescriptor::new("deployment", "default", "web", "replicas: 3");
        descriptor.add_args = vec![String::from("--context"), String::from("staging")];
        descriptor
    }

    #[tokio::test]
    async fn test_manifest_invocation_shape() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let client = fake_client(&temp, "echo '{}'");

        let output = client
            .capture_with_manifest("apply", &descriptor(), &["--output", "json"], &CancellationToken::new())
            .await
            .expect("invocation failed");

        assert_eq!(output.trim(), "{}");

        let calls = recorded_calls(&temp);
        assert_eq!(calls.len(), 1);
        let args = &calls[0];
        assert_eq!(&args[..3], ["apply", "--context", "staging"]);
        assert_eq!(args[3], "--filename");
        assert!(args[4].contains("scripts"));
        assert_eq!(&args[5..], ["--output", "json"]);

        let manifest = std::fs::read_to_string(temp.path().join("last-manifest.yaml"))
            .expect("manifest was not passed");
        assert!(manifest.starts_with("apiVersion: apps/v1\n"));
        assert!(!Path::new(&args[4]).exists(), "manifest must be removed");
    }

    #[tokio::test]
    async fn test_double_dash_argument_stays_in_one_call() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let client = fake_client(&temp, "true");
        let request = client.request().args(["get", "--namespace", "default", "--", "deployment", "web"]);

        client
            .capture(&request, &CancellationToken::new())
            .await
            .expect("invocation failed");

        let calls = recorded_calls(&temp);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], ["get", "--namespace", "default", "--", "deployment", "web"]);
    }

    #[tokio::test]
    async fn test_manifest_removed_on_failure() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let client = fake_client(&temp, "exit 4");

        let err = client
            .capture_with_manifest("apply", &descriptor(), &[], &CancellationToken::new())
            .await
            .expect_err("should fail");
        assert!(err.to_string().contains("exited with code 4"));

        let calls = recorded_calls(&temp);
        assert!(!Path::new(&calls[0][4]).exists(), "manifest must be removed");
    }

    #[test]
    fn test_host_for_remote() {
        let mut tool = ToolConfig::default();
        assert_eq!(host_for(&tool).host_type(), "local");

        tool.remote = Some(crate::config::RemoteConfig {
            host: String::from("deploy@box"),
            options: vec![],
        });
        assert_eq!(host_for(&tool).host_type(), "ssh");
    }
}
