//! Configuration validation.
//!
//! Checks identities, specs and conditions before any external tool is
//! invoked, so a bad configuration fails fast instead of halfway through a
//! reconciliation run.

use crate::error::{ConfigError, KubeEnsureError, Result};
use crate::process::ShellFlavor;
use std::collections::HashSet;
use tracing::debug;

use super::spec::{EnsureConfig, ResourceDescriptor, ToolConfig, WaitConfig};

/// Validator for ensure configurations.
#[derive(Debug, Default)]
pub struct ConfigValidator;

/// Validation result containing all errors found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl ConfigValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates an ensure configuration.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first problem found. Duplicate
    /// identities are reported as [`ConfigError::DuplicateIdentity`].
    pub fn validate(&self, config: &EnsureConfig) -> Result<ValidationResult> {
        let mut result = ValidationResult::default();

        Self::validate_tool(&config.tool, &mut result);
        Self::validate_resources(&config.resources, &mut result)?;
        Self::validate_waits(&config.waits, &mut result)?;

        if config.resources.is_empty() && config.waits.is_empty() {
            result
                .warnings
                .push(String::from("No resources or waits defined in configuration"));
        }

        if result.errors.is_empty() {
            debug!("Configuration validation passed");
            Ok(result)
        } else {
            let first_error = &result.errors[0];
            Err(ConfigError::validation(&first_error.message, &first_error.field).into())
        }
    }

    fn validate_tool(tool: &ToolConfig, result: &mut ValidationResult) {
        if tool.executable.trim().is_empty() {
            result.errors.push(ValidationError {
                field: String::from("tool.executable"),
                message: String::from("Executable cannot be empty"),
            });
        }

        if tool.api_version.trim().is_empty() {
            result.errors.push(ValidationError {
                field: String::from("tool.api_version"),
                message: String::from("apiVersion cannot be empty"),
            });
        }

        if let Some(remote) = &tool.remote {
            if remote.host.trim().is_empty() {
                result.errors.push(ValidationError {
                    field: String::from("tool.remote.host"),
                    message: String::from("Remote host cannot be empty"),
                });
            }
            if tool.shell == Some(ShellFlavor::Windows) {
                result.errors.push(ValidationError {
                    field: String::from("tool.shell"),
                    message: String::from("Remote hosts must use a POSIX shell"),
                });
            }
        }
    }

    fn validate_resources(
        resources: &[ResourceDescriptor],
        result: &mut ValidationResult,
    ) -> Result<()> {
        let mut seen = HashSet::new();

        for (i, resource) in resources.iter().enumerate() {
            let prefix = format!("resources[{i}]");

            Self::validate_identity(
                &prefix,
                &resource.resource_type,
                &resource.namespace,
                &resource.name,
                result,
            );

            if !seen.insert(resource.identity()) {
                return Err(KubeEnsureError::Config(ConfigError::DuplicateIdentity {
                    section: String::from("resources"),
                    identity: resource.display_name(),
                }));
            }

            if resource.exists && resource.spec.trim().is_empty() {
                result.errors.push(ValidationError {
                    field: format!("{prefix}.spec"),
                    message: format!("Spec is required for {}", resource.display_name()),
                });
            }

            if !resource.exists && resource.force {
                result.warnings.push(format!(
                    "{prefix}: force on a resource that should not exist deletes with --force"
                ));
            }

            for key in resource.labels.keys() {
                if key.trim().is_empty() {
                    result.errors.push(ValidationError {
                        field: format!("{prefix}.labels"),
                        message: String::from("Label keys cannot be empty"),
                    });
                }
            }
        }

        Ok(())
    }

    fn validate_waits(waits: &[WaitConfig], result: &mut ValidationResult) -> Result<()> {
        let mut seen = HashSet::new();

        for (i, wait) in waits.iter().enumerate() {
            let prefix = format!("waits[{i}]");

            Self::validate_identity(&prefix, &wait.resource_type, &wait.namespace, &wait.name, result);

            let key = (
                wait.resource_type.as_str(),
                wait.namespace.as_str(),
                wait.name.as_str(),
                wait.condition.condition_type.as_str(),
            );
            if !seen.insert(key) {
                return Err(KubeEnsureError::Config(ConfigError::DuplicateIdentity {
                    section: String::from("waits"),
                    identity: format!("{} ({})", wait.display_name(), wait.condition.condition_type),
                }));
            }

            if wait.condition.condition_type.trim().is_empty() {
                result.errors.push(ValidationError {
                    field: format!("{prefix}.condition"),
                    message: String::from("Condition type cannot be empty"),
                });
            }

            if wait.condition.expected_status.trim().is_empty() {
                result.errors.push(ValidationError {
                    field: format!("{prefix}.status"),
                    message: String::from("Expected status cannot be empty"),
                });
            }

            if wait.timeout_secs == Some(0) {
                result.errors.push(ValidationError {
                    field: format!("{prefix}.timeout_secs"),
                    message: String::from("Timeout must be greater than zero"),
                });
            }
        }

        Ok(())
    }

    fn validate_identity(
        prefix: &str,
        resource_type: &str,
        namespace: &str,
        name: &str,
        result: &mut ValidationResult,
    ) {
        for (field, value) in [("type", resource_type), ("namespace", namespace), ("name", name)] {
            if value.trim().is_empty() {
                result.errors.push(ValidationError {
                    field: format!("{prefix}.{field}"),
                    message: format!("Resource {field} cannot be empty"),
                });
            }
        }
    }
}

impl ValidationResult {
    /// Returns true if validation passed (no errors).
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the number of warnings.
    #[must_use]
    pub const fn warning_count(&self) -> usize {
        self.warnings.len()
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::spec::{Condition, RemoteConfig};

    fn config_with(resources: Vec<ResourceDescriptor>) -> EnsureConfig {
        EnsureConfig {
            resources,
            ..EnsureConfig::default()
        }
    }

    #[test]
    fn test_valid_config() {
        let config = config_with(vec![ResourceDescriptor::new(
            "deployment",
            "default",
            "web",
            "replicas: 1",
        )]);

        let result = ConfigValidator::new().validate(&config).expect("should be valid");
        assert!(result.is_valid());
        assert_eq!(result.warning_count(), 0);
    }

    #[test]
    fn test_missing_spec_rejected() {
        let config = config_with(vec![ResourceDescriptor::new("deployment", "default", "web", "  ")]);

        let err = ConfigValidator::new().validate(&config).expect_err("should fail");
        assert!(err.to_string().contains("Spec is required"));
        match err {
            KubeEnsureError::Config(ConfigError::ValidationError { field, .. }) => {
                assert_eq!(field.as_deref(), Some("resources[0].spec"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_absent_resource_needs_no_spec() {
        let mut descriptor = ResourceDescriptor::new("deployment", "default", "old", "");
        descriptor.exists = false;

        let result = ConfigValidator::new()
            .validate(&config_with(vec![descriptor]))
            .expect("should be valid");
        assert!(result.is_valid());
    }

    #[test]
    fn test_duplicate_identity_rejected() {
        let config = config_with(vec![
            ResourceDescriptor::new("deployment", "default", "web", "replicas: 1"),
            ResourceDescriptor::new("deployment", "default", "web", "replicas: 2"),
        ]);

        let err = ConfigValidator::new().validate(&config).expect_err("should fail");
        assert!(matches!(
            err,
            KubeEnsureError::Config(ConfigError::DuplicateIdentity { .. })
        ));
    }

    #[test]
    fn test_wait_requires_status() {
        let config = EnsureConfig {
            waits: vec![WaitConfig {
                resource_type: String::from("job"),
                namespace: String::from("default"),
                name: String::from("migrate"),
                condition: Condition::new("Complete", ""),
                timeout_secs: None,
                add_args: vec![],
            }],
            ..EnsureConfig::default()
        };

        let err = ConfigValidator::new().validate(&config).expect_err("should fail");
        assert!(err.to_string().contains("Expected status cannot be empty"));
    }

    #[test]
    fn test_remote_windows_shell_rejected() {
        let mut config = config_with(vec![]);
        config.tool.remote = Some(RemoteConfig {
            host: String::from("box"),
            options: vec![],
        });
        config.tool.shell = Some(ShellFlavor::Windows);

        let err = ConfigValidator::new().validate(&config).expect_err("should fail");
        assert!(err.to_string().contains("POSIX"));
    }
}
