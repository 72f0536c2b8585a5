//! Remote execution host reached over `ssh`.
//!
//! The remote login shell is assumed to be POSIX. Every operation is a
//! separate `ssh` invocation, so the only remote state is the filesystem.
//!
//! Tool invocations get a forced pseudo-terminal (`-tt`). Killing the local
//! `ssh` client then hangs up the remote session, and the tool receives
//! `SIGHUP` instead of running on unattended. The pty merges the tool's
//! stderr into stdout. File transfers and other short commands run without
//! one so their streams stay untouched.

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::error::{ProcessError, Result};
use crate::process::{escape_posix_arg, ShellFlavor};

use super::ExecutionHost;

/// Execution host for a machine reachable with `ssh`.
#[derive(Debug, Clone)]
pub struct SshHost {
    /// Destination passed to ssh (`user@host` or a config alias).
    destination: String,
    /// Extra options passed to ssh before the destination.
    options: Vec<String>,
}

impl SshHost {
    /// Creates a remote host for the given ssh destination.
    #[must_use]
    pub fn new(destination: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            options: vec![String::from("-o"), String::from("BatchMode=yes")],
        }
    }

    /// Adds extra ssh options (e.g. `-p 2222`).
    #[must_use]
    pub fn with_options(mut self, options: impl IntoIterator<Item = String>) -> Self {
        self.options.extend(options);
        self
    }

    /// Returns the ssh destination.
    #[must_use]
    pub fn destination(&self) -> &str {
        &self.destination
    }

    fn ssh(&self, remote_line: &str) -> Command {
        self.ssh_with(&[], remote_line)
    }

    fn ssh_with(&self, extra: &[&str], remote_line: &str) -> Command {
        let mut cmd = Command::new("ssh");
        cmd.args(&self.options)
            .args(extra)
            .arg(&self.destination)
            .arg("--")
            .arg(remote_line);
        cmd
    }

    /// Runs a short remote command and returns its trimmed stdout.
    async fn run_remote(&self, remote_line: &str, stdin: Option<&str>, path: &Path) -> Result<String> {
        debug!("ssh {}: {remote_line}", self.destination);

        let mut cmd = self.ssh(remote_line);
        cmd.stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|e| ProcessError::host_io(path, format!("Failed to start ssh: {e}")))?;

        if let (Some(contents), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(contents.as_bytes())
                .await
                .map_err(|e| ProcessError::host_io(path, format!("Failed to send file over ssh: {e}")))?;
            drop(pipe);
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| ProcessError::host_io(path, format!("ssh failed: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProcessError::host_io(path, format!("Remote command failed: {}", stderr.trim())).into());
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// Quotes a path for the remote shell.
fn quote_path(path: &Path) -> String {
    escape_posix_arg(&path.to_string_lossy())
}

#[async_trait]
impl ExecutionHost for SshHost {
    fn shell(&self) -> ShellFlavor {
        ShellFlavor::Posix
    }

    fn command(&self, program: &str, arguments: &str, working_directory: &Path) -> Command {
        let mut line = format!(
            "cd {} && exec {}",
            quote_path(working_directory),
            escape_posix_arg(program)
        );
        if !arguments.is_empty() {
            line.push(' ');
            line.push_str(arguments);
        }
        self.ssh_with(&["-tt"], &line)
    }

    async fn create_dir(&self, path: &Path) -> Result<()> {
        self.run_remote(&format!("mkdir -p -- {}", quote_path(path)), None, path)
            .await
            .map(|_| ())
    }

    async fn write_file(&self, path: &Path, contents: &str) -> Result<()> {
        self.run_remote(&format!("cat > {}", quote_path(path)), Some(contents), path)
            .await
            .map(|_| ())
    }

    async fn remove_file(&self, path: &Path) -> Result<()> {
        self.run_remote(&format!("rm -f -- {}", quote_path(path)), None, path)
            .await
            .map(|_| ())
    }

    async fn environment_variable(&self, name: &str) -> Result<Option<String>> {
        let value = self
            .run_remote(&format!("printenv {}", escape_posix_arg(name)), None, Path::new("."))
            .await
            .ok();
        Ok(value.filter(|v| !v.is_empty()))
    }

    fn host_type(&self) -> &'static str {
        "ssh"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_changes_into_quoted_directory() {
        let host = SshHost::new("deploy@build-01");
        let cmd = host.command("kubectl", "get pods", Path::new("/srv/work dir"));
        let std_cmd = cmd.as_std();

        let args: Vec<String> = std_cmd
            .get_args()
            .map(|a| a.to_string_lossy().to_string())
            .collect();

        assert_eq!(std_cmd.get_program(), "ssh");
        assert_eq!(
            args,
            vec![
                "-o",
                "BatchMode=yes",
                "-tt",
                "deploy@build-01",
                "--",
                "cd '/srv/work dir' && exec kubectl get pods"
            ]
        );
    }

    #[test]
    fn test_file_transfer_has_no_pseudo_terminal() {
        let host = SshHost::new("box");
        let cmd = host.ssh(&format!("cat > {}", quote_path(Path::new("/tmp/m.yaml"))));

        let args: Vec<String> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().to_string())
            .collect();

        assert!(!args.iter().any(|a| a == "-tt"));
        assert_eq!(args.last().map(String::as_str), Some("cat > /tmp/m.yaml"));
    }

    #[test]
    fn test_remote_shell_is_posix() {
        let host = SshHost::new("box").with_options([String::from("-p"), String::from("2222")]);
        assert_eq!(host.shell(), ShellFlavor::Posix);
        assert_eq!(host.destination(), "box");
        assert_eq!(host.host_type(), "ssh");
    }
}
