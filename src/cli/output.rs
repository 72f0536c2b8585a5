//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying
//! information to the user in various formats.

use colored::Colorize;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::config::{EnsureConfig, ValidationResult};
use crate::converge::ConvergenceAction;
use crate::reconciler::{DriftReport, ReconciliationResult, ResourceReport};
use crate::watch::{WaitReport, WatchOutcome};

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Difference row for table display.
#[derive(Tabled)]
struct DifferenceRow {
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Path")]
    path: String,
    #[tabled(rename = "Expected")]
    expected: String,
    #[tabled(rename = "Actual")]
    actual: String,
}

/// Resource row for table display.
#[derive(Tabled)]
struct ResourceRow {
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Action")]
    action: String,
}

/// Wait row for table display.
#[derive(Tabled)]
struct WaitRow {
    #[tabled(rename = "Wait")]
    wait: String,
    #[tabled(rename = "Outcome")]
    outcome: String,
}

/// Maximum width of a value in the difference table.
const MAX_VALUE_WIDTH: usize = 40;

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats a validation summary.
    #[must_use]
    pub fn format_validation(
        &self,
        config: &EnsureConfig,
        result: &ValidationResult,
        show_warnings: bool,
    ) -> String {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::json!({
                    "valid": result.is_valid(),
                    "resources": config.resources.len(),
                    "waits": config.waits.len(),
                    "warnings": result.warnings,
                });
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => {
                let mut output = format!("{} Configuration is valid!\n", "✓".green());

                if show_warnings && !result.warnings.is_empty() {
                    let _ = write!(output, "\n{} Warnings:\n", "⚠".yellow());
                    for warning in &result.warnings {
                        let _ = writeln!(output, "   - {warning}");
                    }
                }

                output.push_str("\nConfiguration summary:\n");
                let _ = writeln!(output, "   Executable: {}", config.tool.executable);
                let _ = writeln!(output, "   Resources: {}", config.resources.len());
                let _ = writeln!(output, "   Waits: {}", config.waits.len());
                if let Some(remote) = &config.tool.remote {
                    let _ = writeln!(output, "   Remote host: {}", remote.host);
                }

                output
            }
        }
    }

    /// Formats rendered manifests, each paired with its description.
    #[must_use]
    pub fn format_manifests(&self, manifests: &[(String, String)]) -> String {
        match self.format {
            OutputFormat::Json => {
                let json: Vec<serde_json::Value> = manifests
                    .iter()
                    .map(|(resource, manifest)| {
                        serde_json::json!({ "resource": resource, "manifest": manifest })
                    })
                    .collect();
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => {
                let mut output = String::new();
                for (resource, manifest) in manifests {
                    let _ = writeln!(output, "---\n# {resource}");
                    output.push_str(manifest);
                }
                output
            }
        }
    }

    /// Formats a drift report.
    #[must_use]
    pub fn format_drift(&self, report: &DriftReport) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(report).unwrap_or_default(),
            OutputFormat::Text => {
                if report.is_converged() {
                    return format!(
                        "{} No drift detected - {} resource(s) in sync.\n",
                        "✓".green(),
                        report.total_resources
                    );
                }

                let mut output = format!("{} Drift detected:\n\n", "⚠".yellow());
                output.push_str(&Self::difference_table(&report.resources));
                let _ = write!(
                    output,
                    "\n{}/{} resources have drifted.\n",
                    report.drifted_resources.len(),
                    report.total_resources
                );
                output
            }
        }
    }

    /// Formats a reconciliation result.
    #[must_use]
    pub fn format_reconciliation(&self, result: &ReconciliationResult) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(result).unwrap_or_default(),
            OutputFormat::Text => {
                let status = if result.success {
                    format!("{} Reconciliation successful", "✓".green())
                } else {
                    format!("{} Reconciliation failed", "✗".red())
                };

                let mut output = format!("{status}\n\n");

                let rows: Vec<ResourceRow> = result
                    .resources
                    .iter()
                    .map(|r| ResourceRow {
                        resource: r.resource.clone(),
                        status: Self::format_resource_status(r),
                        action: r.action.map_or_else(
                            || "none".dimmed().to_string(),
                            Self::format_action,
                        ),
                    })
                    .collect();
                if !rows.is_empty() {
                    output.push_str(&Table::new(rows).to_string());
                    output.push('\n');
                }

                let _ = write!(
                    output,
                    "\nApplied: {}, replaced: {}, deleted: {}, unchanged: {}\n",
                    result.applied.to_string().green(),
                    result.replaced.to_string().yellow(),
                    result.deleted.to_string().red(),
                    result.unchanged
                );

                if !result.errors.is_empty() {
                    let _ = write!(output, "\n{} Errors:\n", "⚠".yellow());
                    for error in &result.errors {
                        let _ = writeln!(output, "   - {error}");
                    }
                }

                output
            }
        }
    }

    /// Formats wait outcomes.
    #[must_use]
    pub fn format_waits(&self, reports: &[WaitReport]) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(reports).unwrap_or_default(),
            OutputFormat::Text => {
                if reports.is_empty() {
                    return String::from("No waits configured.\n");
                }
                let rows: Vec<WaitRow> = reports
                    .iter()
                    .map(|r| WaitRow {
                        wait: r.wait.clone(),
                        outcome: Self::format_outcome(r.outcome),
                    })
                    .collect();
                let mut output = Table::new(rows).to_string();
                output.push('\n');
                output
            }
        }
    }

    /// Builds the table of differences for drifted resources.
    fn difference_table(resources: &[ResourceReport]) -> String {
        let rows: Vec<DifferenceRow> = resources
            .iter()
            .flat_map(|r| {
                r.differences.iter().map(|d| DifferenceRow {
                    resource: r.resource.clone(),
                    path: d.path.clone(),
                    expected: Self::truncate(&d.expected, MAX_VALUE_WIDTH),
                    actual: Self::truncate(&d.actual, MAX_VALUE_WIDTH),
                })
            })
            .collect();

        let mut table = Table::new(rows).to_string();
        table.push('\n');
        table
    }

    /// Formats a resource's final status with color.
    fn format_resource_status(report: &ResourceReport) -> String {
        if !report.has_drift() {
            "in sync".green().to_string()
        } else if report.desired_exists != report.exists {
            if report.exists {
                "unwanted".red().to_string()
            } else {
                "missing".yellow().to_string()
            }
        } else {
            format!("{} difference(s)", report.differences.len())
                .yellow()
                .to_string()
        }
    }

    /// Formats a convergence action with color.
    fn format_action(action: ConvergenceAction) -> String {
        match action {
            ConvergenceAction::Apply => "~apply".green().to_string(),
            ConvergenceAction::Replace => "!replace".yellow().to_string(),
            ConvergenceAction::Delete { .. } => format!("-{action}").red().to_string(),
        }
    }

    /// Formats a watch outcome with color.
    fn format_outcome(outcome: WatchOutcome) -> String {
        match outcome {
            WatchOutcome::Matched => "matched".green().to_string(),
            WatchOutcome::Cancelled => "cancelled".yellow().to_string(),
            WatchOutcome::Failed { exit_code } => format!(
                "failed (exit code {})",
                crate::error::format_exit_code(exit_code)
            )
            .red()
            .to_string(),
        }
    }

    /// Truncates a string to a maximum number of characters, on one line.
    fn truncate(s: &str, max_len: usize) -> String {
        let flat = s.split_whitespace().collect::<Vec<_>>().join(" ");
        if flat.chars().count() <= max_len {
            flat
        } else {
            let kept: String = flat.chars().take(max_len.saturating_sub(3)).collect();
            format!("{kept}...")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::Difference;

    fn report(differences: Vec<Difference>) -> ResourceReport {
        ResourceReport {
            resource: String::from("deployment default::web"),
            desired_exists: true,
            exists: true,
            differences,
            action: None,
            display_spec: None,
        }
    }

    #[test]
    fn test_truncate_flattens_and_shortens() {
        assert_eq!(OutputFormatter::truncate("{\n  \"a\": 1\n}", 40), "{ \"a\": 1 }");
        assert_eq!(OutputFormatter::truncate("abcdefghij", 6), "abc...");
    }

    #[test]
    fn test_drift_json_lists_differences() {
        let drift = DriftReport {
            has_drift: true,
            drifted_resources: vec![String::from("deployment default::web")],
            total_resources: 1,
            resources: vec![report(vec![Difference {
                path: String::from("spec.replicas"),
                expected: String::from("3"),
                actual: String::from("1"),
            }])],
            checked_at: chrono::Utc::now(),
        };

        let output = OutputFormatter::new(OutputFormat::Json).format_drift(&drift);
        let parsed: serde_json::Value = serde_json::from_str(&output).expect("invalid json");

        assert_eq!(parsed["has_drift"], true);
        assert_eq!(parsed["resources"][0]["differences"][0]["path"], "spec.replicas");
    }

    #[test]
    fn test_drift_text_contains_paths() {
        colored::control::set_override(false);
        let drift = DriftReport {
            has_drift: true,
            drifted_resources: vec![String::from("deployment default::web")],
            total_resources: 1,
            resources: vec![report(vec![Difference::existence(true, false)])],
            checked_at: chrono::Utc::now(),
        };

        let output = OutputFormatter::new(OutputFormat::Text).format_drift(&drift);

        assert!(output.contains("Drift detected"));
        assert!(output.contains("exists"));
        assert!(output.contains("1/1 resources have drifted"));
    }

    #[test]
    fn test_wait_json_flattens_outcome() {
        let reports = vec![WaitReport {
            wait: String::from("Wait for Complete"),
            outcome: WatchOutcome::Failed { exit_code: Some(1) },
        }];

        let output = OutputFormatter::new(OutputFormat::Json).format_waits(&reports);
        let parsed: serde_json::Value = serde_json::from_str(&output).expect("invalid json");

        assert_eq!(parsed[0]["outcome"], "failed");
        assert_eq!(parsed[0]["exit_code"], 1);
    }
}
