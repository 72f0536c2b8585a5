//! Per-argument quoting for the two shell conventions a command line can
//! be handed to.
//!
//! Quoting is always applied to one argument at a time; the command line
//! is the space-joined result.

use serde::{Deserialize, Serialize};

/// Shell convention used to interpret a command line on an execution host.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ShellFlavor {
    /// POSIX `sh` quoting rules.
    #[default]
    Posix,
    /// Windows `CommandLineToArgvW` quoting rules.
    Windows,
}

impl ShellFlavor {
    /// Returns the convention of the machine this process runs on.
    #[must_use]
    pub const fn native() -> Self {
        if cfg!(windows) { Self::Windows } else { Self::Posix }
    }

    /// Quotes a single argument for this convention.
    #[must_use]
    pub fn escape(self, arg: &str) -> String {
        match self {
            Self::Posix => escape_posix_arg(arg),
            Self::Windows => escape_windows_arg(arg),
        }
    }

    /// Quotes every argument and joins them with single spaces.
    #[must_use]
    pub fn join<I, S>(self, args: I) -> String
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        args.into_iter()
            .map(|arg| self.escape(arg.as_ref()))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl std::fmt::Display for ShellFlavor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Posix => write!(f, "posix"),
            Self::Windows => write!(f, "windows"),
        }
    }
}

/// Quotes an argument for a POSIX shell.
///
/// Letters, digits and `/ - _ .` pass through untouched. Anything else is
/// wrapped in single quotes, with embedded single quotes written as `'\''`.
#[must_use]
pub fn escape_posix_arg(arg: &str) -> String {
    let is_plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '/' | '-' | '_' | '.'));

    if is_plain {
        return arg.to_string();
    }

    format!("'{}'", arg.replace('\'', "'\\''"))
}

/// Quotes an argument for a Windows command line.
///
/// Backslashes are only special when they precede a double quote, so a run
/// of N backslashes before `"` becomes 2N+1 backslashes, and a trailing run
/// is doubled so it cannot escape the closing quote.
///
/// Arguments without whitespace, backslashes or double quotes pass through
/// unchanged. The empty argument is the exception: it becomes `""`, since
/// left bare it would vanish from the command line.
#[must_use]
pub fn escape_windows_arg(arg: &str) -> String {
    let needs_quoting =
        arg.is_empty() || arg.chars().any(|c| c.is_whitespace() || c == '\\' || c == '"');

    if !needs_quoting {
        return arg.to_string();
    }

    let mut quoted = String::with_capacity(arg.len() + 2);
    quoted.push('"');

    let mut slashes = 0usize;
    for c in arg.chars() {
        match c {
            '"' => {
                quoted.extend(std::iter::repeat_n('\\', slashes + 1));
                quoted.push('"');
                slashes = 0;
            }
            '\\' => {
                quoted.push('\\');
                slashes += 1;
            }
            _ => {
                quoted.push(c);
                slashes = 0;
            }
        }
    }

    quoted.extend(std::iter::repeat_n('\\', slashes));
    quoted.push('"');
    quoted
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal POSIX word parser: single quotes, backslash outside quotes.
    fn parse_posix_word(word: &str) -> String {
        let mut out = String::new();
        let mut in_single = false;
        let mut chars = word.chars();
        while let Some(c) = chars.next() {
            match c {
                '\'' => in_single = !in_single,
                '\\' if !in_single => {
                    if let Some(next) = chars.next() {
                        out.push(next);
                    }
                }
                _ => out.push(c),
            }
        }
        out
    }

    #[test]
    fn test_plain_arguments_pass_through() {
        for arg in ["apply", "--dry-run", "/tmp/scripts/abc_1.yaml", "v1.2-rc_3"] {
            assert_eq!(escape_posix_arg(arg), arg);
            assert_eq!(escape_windows_arg(arg), arg);
        }
    }

    #[test]
    fn test_posix_quotes_special_characters() {
        assert_eq!(escape_posix_arg("a b"), "'a b'");
        assert_eq!(escape_posix_arg("--output=json"), "'--output=json'");
        assert_eq!(escape_posix_arg(""), "''");
    }

    #[test]
    fn test_posix_single_quote_round_trip() {
        let original = "it's {.status.conditions[?(@.type==\"Ready\")]}";
        let escaped = escape_posix_arg(original);

        assert_eq!(
            escaped,
            "'it'\\''s {.status.conditions[?(@.type==\"Ready\")]}'"
        );
        assert_eq!(parse_posix_word(&escaped), original);
    }

    #[test]
    fn test_windows_whitespace_is_quoted() {
        assert_eq!(escape_windows_arg("a b"), "\"a b\"");
        assert_eq!(escape_windows_arg(""), "\"\"");
    }

    #[test]
    fn test_windows_quote_after_backslashes() {
        // a\\"b : two backslashes then a quote -> five backslashes then quote
        assert_eq!(escape_windows_arg("a\\\\\"b"), "\"a\\\\\\\\\\\"b\"");
        assert_eq!(escape_windows_arg("say \"hi\""), "\"say \\\"hi\\\"\"");
    }

    #[test]
    fn test_windows_trailing_backslashes_doubled() {
        assert_eq!(escape_windows_arg("C:\\Program Files\\"), "\"C:\\Program Files\\\\\"");
        // backslashes not followed by a quote are left alone
        assert_eq!(escape_windows_arg("C:\\dir\\file"), "\"C:\\dir\\file\"");
    }

    #[test]
    fn test_join_escapes_each_argument() {
        let line = ShellFlavor::Posix.join(["get", "--output", "json path"]);
        assert_eq!(line, "get --output 'json path'");

        let line = ShellFlavor::Windows.join(["get", "a b"]);
        assert_eq!(line, "get \"a b\"");
    }
}
