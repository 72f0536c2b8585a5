//! Execution hosts.
//!
//! An execution host is the machine an external tool runs on. It owns the
//! shell convention used to quote command lines and the filesystem that
//! transient manifests are written to.

mod local;
mod ssh;

use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::Result;
use crate::process::ShellFlavor;

pub use local::LocalHost;
pub use ssh::SshHost;

/// Trait for machines that can run the external tool.
#[async_trait]
pub trait ExecutionHost: Send + Sync + std::fmt::Debug {
    /// Shell convention used for quoting on this host.
    fn shell(&self) -> ShellFlavor;

    /// Builds a command that runs `program` with an argument string already
    /// quoted for [`ExecutionHost::shell`], in the given working directory.
    /// Standard streams are configured by the caller.
    fn command(&self, program: &str, arguments: &str, working_directory: &Path) -> Command;

    /// Creates a directory and its parents if they do not exist.
    async fn create_dir(&self, path: &Path) -> Result<()>;

    /// Writes a text file, replacing any existing content.
    async fn write_file(&self, path: &Path, contents: &str) -> Result<()>;

    /// Deletes a file. A missing file is not an error.
    async fn remove_file(&self, path: &Path) -> Result<()>;

    /// Reads an environment variable on the host.
    async fn environment_variable(&self, name: &str) -> Result<Option<String>>;

    /// Gets the host type name.
    fn host_type(&self) -> &'static str;
}
