//! Local execution host.
//!
//! On POSIX the quoted line runs through `sh -c` with `exec`, so the shell is
//! replaced by the tool. On Windows the tool is spawned directly and the
//! quoted argument string is handed to it verbatim, as no shell is involved.

use async_trait::async_trait;
use std::path::Path;
use tokio::fs;
use tokio::process::Command;
use tracing::debug;

use crate::error::{ProcessError, Result};
use crate::process::{escape_posix_arg, ShellFlavor};

use super::ExecutionHost;

/// Execution host for the local machine.
#[derive(Debug, Clone)]
pub struct LocalHost {
    /// Shell convention used for quoting.
    shell: ShellFlavor,
}

impl LocalHost {
    /// Creates a local host using the platform's native convention.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            shell: ShellFlavor::native(),
        }
    }

    /// Creates a local host with an explicit convention.
    #[must_use]
    pub const fn with_shell(shell: ShellFlavor) -> Self {
        Self { shell }
    }
}

impl Default for LocalHost {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExecutionHost for LocalHost {
    fn shell(&self) -> ShellFlavor {
        self.shell
    }

    fn command(&self, program: &str, arguments: &str, working_directory: &Path) -> Command {
        let mut cmd = match self.shell {
            ShellFlavor::Posix => posix_command(program, arguments),
            ShellFlavor::Windows => windows_command(program, arguments),
        };
        cmd.current_dir(working_directory);
        cmd
    }

    async fn create_dir(&self, path: &Path) -> Result<()> {
        if !path.exists() {
            debug!("Creating directory: {}", path.display());
            fs::create_dir_all(path)
                .await
                .map_err(|e| ProcessError::host_io(path, format!("Failed to create directory: {e}")))?;
        }
        Ok(())
    }

    async fn write_file(&self, path: &Path, contents: &str) -> Result<()> {
        fs::write(path, contents)
            .await
            .map_err(|e| ProcessError::host_io(path, format!("Failed to write file: {e}")))?;
        Ok(())
    }

    async fn remove_file(&self, path: &Path) -> Result<()> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ProcessError::host_io(path, format!("Failed to delete file: {e}")).into()),
        }
    }

    async fn environment_variable(&self, name: &str) -> Result<Option<String>> {
        Ok(std::env::var(name).ok())
    }

    fn host_type(&self) -> &'static str {
        "local"
    }
}

/// Runs the line through `sh`, which `exec`s into the tool.
fn posix_command(program: &str, arguments: &str) -> Command {
    let program = escape_posix_arg(program);
    let line = if arguments.is_empty() {
        format!("exec {program}")
    } else {
        format!("exec {program} {arguments}")
    };
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(line);
    cmd
}

#[cfg(windows)]
fn windows_command(program: &str, arguments: &str) -> Command {
    let mut cmd = Command::new(program);
    if !arguments.is_empty() {
        cmd.raw_arg(arguments);
    }
    cmd
}

/// Only Windows can pass a pre-quoted argument string through untouched;
/// elsewhere it is handed over as a single argument.
#[cfg(not(windows))]
fn windows_command(program: &str, arguments: &str) -> Command {
    let mut cmd = Command::new(program);
    if !arguments.is_empty() {
        cmd.arg(arguments);
    }
    cmd
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_and_remove_file() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let host = LocalHost::new();
        let dir = temp.path().join("scripts");
        let file = dir.join("manifest");

        host.create_dir(&dir).await.expect("create_dir failed");
        host.write_file(&file, "kind: Job\n").await.expect("write failed");
        assert_eq!(std::fs::read_to_string(&file).expect("read failed"), "kind: Job\n");

        host.remove_file(&file).await.expect("remove failed");
        assert!(!file.exists());

        // Removing twice is fine.
        host.remove_file(&file).await.expect("second remove failed");
    }

    fn program_and_args(cmd: &Command) -> (String, Vec<String>) {
        let std_cmd = cmd.as_std();
        let args = std_cmd
            .get_args()
            .map(|a| a.to_string_lossy().to_string())
            .collect();
        (std_cmd.get_program().to_string_lossy().to_string(), args)
    }

    #[test]
    fn test_posix_command_execs_tool() {
        let host = LocalHost::with_shell(ShellFlavor::Posix);
        let cmd = host.command("/opt/my tools/kubectl", "get 'a&b'", Path::new("/tmp"));

        let (program, args) = program_and_args(&cmd);
        assert_eq!(program, "sh");
        assert_eq!(args, ["-c", "exec '/opt/my tools/kubectl' get 'a&b'"]);
    }

    #[test]
    fn test_windows_command_spawns_tool_without_shell() {
        let host = LocalHost::with_shell(ShellFlavor::Windows);
        let arguments = ShellFlavor::Windows.join(["get", "--selector=tier=a&b", "%USERNAME%"]);
        let cmd = host.command("kubectl", &arguments, Path::new("C:\\work"));

        let (program, args) = program_and_args(&cmd);
        assert_eq!(program, "kubectl");
        assert_ne!(program, "cmd");
        assert!(!args.iter().any(|a| a == "/C"));
        assert_eq!(arguments, "get --selector=tier=a&b %USERNAME%");
    }

    #[tokio::test]
    async fn test_environment_variable() {
        let host = LocalHost::new();
        let value = host
            .environment_variable("KUBE_ENSURE_SURELY_UNSET_VARIABLE")
            .await
            .expect("lookup failed");
        assert!(value.is_none());
    }
}
