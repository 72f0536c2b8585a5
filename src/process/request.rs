//! Execution request types.

use std::path::{Path, PathBuf};

use super::escape::ShellFlavor;

/// A single invocation of an external tool.
///
/// Arguments are optional so callers can build argument lists with
/// conditional flags; `None` entries are dropped before quoting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRequest {
    /// Executable name or path.
    pub command: String,
    /// Positional arguments, in order.
    pub arguments: Vec<Option<String>>,
    /// Directory the process runs in. Created if absent.
    pub working_directory: PathBuf,
}

impl ExecutionRequest {
    /// Creates a request with no arguments.
    #[must_use]
    pub fn new(command: impl Into<String>, working_directory: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            arguments: Vec::new(),
            working_directory: working_directory.into(),
        }
    }

    /// Appends one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.arguments.push(Some(arg.into()));
        self
    }

    /// Appends an argument only when present.
    #[must_use]
    pub fn arg_opt(mut self, arg: Option<impl Into<String>>) -> Self {
        self.arguments.push(arg.map(Into::into));
        self
    }

    /// Appends several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.arguments.extend(args.into_iter().map(|a| Some(a.into())));
        self
    }

    /// Returns the arguments that survive `None` filtering.
    pub fn present_arguments(&self) -> impl Iterator<Item = &str> {
        self.arguments.iter().filter_map(Option::as_deref)
    }

    /// Returns the quoted argument string, without the command.
    #[must_use]
    pub fn escaped_arguments(&self, flavor: ShellFlavor) -> String {
        flavor.join(self.present_arguments())
    }

    /// Returns the full quoted command line.
    #[must_use]
    pub fn command_line(&self, flavor: ShellFlavor) -> String {
        let args = self.escaped_arguments(flavor);
        let command = flavor.escape(&self.command);
        if args.is_empty() {
            command
        } else {
            format!("{command} {args}")
        }
    }

    /// Returns the working directory.
    #[must_use]
    pub fn working_directory(&self) -> &Path {
        &self.working_directory
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_arguments_are_dropped() {
        let request = ExecutionRequest::new("kubectl", "/tmp")
            .arg("delete")
            .arg_opt(None::<String>)
            .arg("--ignore-not-found")
            .arg_opt(Some("--force"));

        assert_eq!(
            request.command_line(ShellFlavor::Posix),
            "kubectl delete --ignore-not-found --force"
        );
    }

    #[test]
    fn test_command_line_quotes_arguments() {
        let request = ExecutionRequest::new("kubectl", "/tmp").args(["get", "my job"]);

        assert_eq!(request.command_line(ShellFlavor::Posix), "kubectl get 'my job'");
        assert_eq!(
            request.command_line(ShellFlavor::Windows),
            "kubectl get \"my job\""
        );
    }
}
