//! Configuration specification types.
//!
//! This module defines the structs that map to `kube-ensure.yaml`. A
//! [`ResourceDescriptor`] fully describes the desired state of one resource;
//! a [`WaitConfig`] describes a condition to wait for.

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::path::{Path, PathBuf};

use crate::error::{ConfigError, Result};
use crate::process::ShellFlavor;

/// Default executable for the external tool.
pub const DEFAULT_EXECUTABLE: &str = "kubectl";

/// Default `apiVersion` written into rendered manifests.
pub const DEFAULT_API_VERSION: &str = "batch/v1";

/// Default namespace for resources and waits.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Scratch directory used on remote hosts when none is configured.
pub const DEFAULT_REMOTE_SCRATCH_DIR: &str = "/tmp/kube-ensure";

/// The root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EnsureConfig {
    /// How and where the external tool runs.
    #[serde(default)]
    pub tool: ToolConfig,
    /// Resources to reconcile, in order.
    #[serde(default)]
    pub resources: Vec<ResourceDescriptor>,
    /// Conditions to wait for, in order.
    #[serde(default)]
    pub waits: Vec<WaitConfig>,
}

/// External tool configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolConfig {
    /// Executable name or path.
    #[serde(default = "default_executable")]
    pub executable: String,
    /// `apiVersion` of rendered manifests.
    #[serde(default = "default_api_version")]
    pub api_version: String,
    /// Working directory for tool invocations.
    #[serde(default)]
    pub working_dir: Option<String>,
    /// Directory transient manifests are written under.
    #[serde(default)]
    pub scratch_dir: Option<String>,
    /// Shell convention; defaults to the host platform's.
    #[serde(default)]
    pub shell: Option<ShellFlavor>,
    /// Run the tool on a remote machine over ssh.
    #[serde(default)]
    pub remote: Option<RemoteConfig>,
    /// Dry-run strategy passed to preview invocations.
    #[serde(default)]
    pub dry_run: Option<DryRunMode>,
}

/// Remote host configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemoteConfig {
    /// ssh destination (`user@host` or an alias).
    pub host: String,
    /// Extra ssh options.
    #[serde(default)]
    pub options: Vec<String>,
}

/// Dry-run strategy for preview invocations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DryRunMode {
    /// Computed by the client without contacting admission.
    Client,
    /// Computed by the API server.
    Server,
}

/// Resource labels, kept in the order they were configured.
///
/// Serialized as a plain mapping. A repeated key keeps its first position
/// and takes the last value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Labels(Vec<(String, String)>);

impl Labels {
    /// Creates an empty label set.
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Sets a label, keeping the position of an existing key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = value,
            None => self.0.push((key, value)),
        }
    }

    /// Returns the value of a label.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Iterates over label keys in configured order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(k, _)| k.as_str())
    }

    /// Iterates over `(key, value)` pairs in configured order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Returns the number of labels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if there are no labels.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for Labels {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in &self.0 {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Labels {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct LabelsVisitor;

        impl<'de> Visitor<'de> for LabelsVisitor {
            type Value = Labels;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("a mapping of label names to values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<Labels, A::Error> {
                let mut labels = Labels::new();
                while let Some((key, value)) = access.next_entry::<String, String>()? {
                    labels.insert(key, value);
                }
                Ok(labels)
            }

            fn visit_unit<E: serde::de::Error>(self) -> std::result::Result<Labels, E> {
                Ok(Labels::new())
            }
        }

        deserializer.deserialize_map(LabelsVisitor)
    }
}

/// Desired state of a single cluster resource.
///
/// Identity is `(resource_type, namespace, name)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceDescriptor {
    /// Resource type (e.g. `deployment`, `job`).
    #[serde(rename = "type")]
    pub resource_type: String,
    /// Namespace.
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Resource name.
    pub name: String,
    /// Labels written into the manifest metadata.
    #[serde(default)]
    pub labels: Labels,
    /// Body of the `spec` section, as YAML text.
    #[serde(default)]
    pub spec: String,
    /// Whether the resource should exist.
    #[serde(default = "default_true")]
    pub exists: bool,
    /// Replace instead of apply when converging.
    #[serde(default)]
    pub force: bool,
    /// Extra arguments appended after the subcommand.
    #[serde(default)]
    pub add_args: Vec<String>,
}

/// A named status field on a resource and the value to wait for.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Condition {
    /// Condition type (e.g. `Complete`, `Available`).
    #[serde(rename = "condition")]
    pub condition_type: String,
    /// Expected status (e.g. `True`).
    #[serde(rename = "status")]
    pub expected_status: String,
}

/// A condition to wait for on one resource.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WaitConfig {
    /// Resource type.
    #[serde(rename = "type")]
    pub resource_type: String,
    /// Namespace.
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Resource name.
    pub name: String,
    /// Condition and expected status.
    #[serde(flatten)]
    pub condition: Condition,
    /// Give up after this many seconds.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Extra arguments appended after the subcommand.
    #[serde(default)]
    pub add_args: Vec<String>,
}

impl EnsureConfig {
    /// Returns the resources to act on: all of them, or those named `name`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownEntry`] if no resource has that name.
    pub fn select_resources(&self, name: Option<&str>) -> Result<Vec<ResourceDescriptor>> {
        select(&self.resources, name, "resources", |r| &r.name)
    }

    /// Returns the waits to run: all of them, or those on resources named
    /// `name`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownEntry`] if no wait has that name.
    pub fn select_waits(&self, name: Option<&str>) -> Result<Vec<WaitConfig>> {
        select(&self.waits, name, "waits", |w| &w.name)
    }
}

fn select<T: Clone>(
    entries: &[T],
    name: Option<&str>,
    section: &str,
    name_of: impl Fn(&T) -> &String,
) -> Result<Vec<T>> {
    let Some(name) = name else {
        return Ok(entries.to_vec());
    };

    let selected: Vec<T> = entries.iter().filter(|e| name_of(*e) == name).cloned().collect();
    if selected.is_empty() {
        return Err(ConfigError::UnknownEntry {
            section: section.to_string(),
            name: name.to_string(),
        }
        .into());
    }
    Ok(selected)
}

fn default_executable() -> String {
    String::from(DEFAULT_EXECUTABLE)
}

fn default_api_version() -> String {
    String::from(DEFAULT_API_VERSION)
}

fn default_namespace() -> String {
    String::from(DEFAULT_NAMESPACE)
}

const fn default_true() -> bool {
    true
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            executable: default_executable(),
            api_version: default_api_version(),
            working_dir: None,
            scratch_dir: None,
            shell: None,
            remote: None,
            dry_run: None,
        }
    }
}

impl ToolConfig {
    /// Resolves the scratch directory.
    ///
    /// Relative paths are resolved against `base`. Without configuration,
    /// local runs use the user cache directory and remote runs use
    /// [`DEFAULT_REMOTE_SCRATCH_DIR`].
    #[must_use]
    pub fn resolve_scratch_dir(&self, base: &Path) -> PathBuf {
        match &self.scratch_dir {
            Some(dir) => resolve(base, dir),
            None if self.remote.is_some() => PathBuf::from(DEFAULT_REMOTE_SCRATCH_DIR),
            None => dirs::cache_dir().map_or_else(
                || base.join(".kube-ensure"),
                |cache| cache.join("kube-ensure"),
            ),
        }
    }

    /// Resolves the working directory, defaulting to `<scratch>/work`.
    #[must_use]
    pub fn resolve_working_dir(&self, base: &Path) -> PathBuf {
        self.working_dir.as_ref().map_or_else(
            || self.resolve_scratch_dir(base).join("work"),
            |dir| resolve(base, dir),
        )
    }

    /// Returns the `--dry-run` argument for preview invocations.
    #[must_use]
    pub fn dry_run_arg(&self) -> &'static str {
        match self.dry_run {
            None => "--dry-run",
            Some(DryRunMode::Client) => "--dry-run=client",
            Some(DryRunMode::Server) => "--dry-run=server",
        }
    }
}

fn resolve(base: &Path, dir: &str) -> PathBuf {
    let path = Path::new(dir);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

impl ResourceDescriptor {
    /// Creates a descriptor for a resource that should exist.
    #[must_use]
    pub fn new(
        resource_type: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
        spec: impl Into<String>,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            namespace: namespace.into(),
            name: name.into(),
            labels: Labels::new(),
            spec: spec.into(),
            exists: true,
            force: false,
            add_args: Vec::new(),
        }
    }

    /// Returns the `(type, namespace, name)` identity.
    #[must_use]
    pub fn identity(&self) -> (&str, &str, &str) {
        (&self.resource_type, &self.namespace, &self.name)
    }

    /// Returns a short `type namespace::name` label.
    #[must_use]
    pub fn display_name(&self) -> String {
        format!("{} {}::{}", self.resource_type, self.namespace, self.name)
    }

    /// Returns a human-readable description of the ensure operation.
    #[must_use]
    pub fn describe(&self) -> String {
        format!("Ensure Kubernetes {}", self.display_name())
    }
}

impl Condition {
    /// Creates a condition.
    #[must_use]
    pub fn new(condition_type: impl Into<String>, expected_status: impl Into<String>) -> Self {
        Self {
            condition_type: condition_type.into(),
            expected_status: expected_status.into(),
        }
    }

    /// Returns true if an observed status equals the expected status,
    /// ignoring case and surrounding whitespace.
    #[must_use]
    pub fn matches(&self, observed: &str) -> bool {
        observed.trim().to_lowercase() == self.expected_status.trim().to_lowercase()
    }
}

impl WaitConfig {
    /// Returns a short `type namespace::name` label.
    #[must_use]
    pub fn display_name(&self) -> String {
        format!("{} {}::{}", self.resource_type, self.namespace, self.name)
    }

    /// Returns a human-readable description of the wait.
    #[must_use]
    pub fn describe(&self) -> String {
        format!(
            "Wait for {} to be \"{}\" on Kubernetes {}",
            self.condition.condition_type,
            self.condition.expected_status,
            self.display_name()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_condition_matches_case_insensitively() {
        let condition = Condition::new("Complete", "True");
        assert!(condition.matches("true"));
        assert!(condition.matches("TRUE"));
        assert!(condition.matches("True\r"));
        assert!(!condition.matches("False"));
        assert!(!condition.matches(""));
    }

    #[test]
    fn test_labels_keep_configured_order() {
        let yaml = r"
type: deployment
name: web
labels:
  tier: web
  app: frontend
  tier: edge
";
        let descriptor: ResourceDescriptor = serde_yaml::from_str(yaml).expect("parse failed");

        let pairs: Vec<(&str, &str)> = descriptor.labels.iter().collect();
        assert_eq!(pairs, [("tier", "edge"), ("app", "frontend")]);
        assert_eq!(
            serde_json::to_string(&descriptor.labels).expect("serialize failed"),
            r#"{"tier":"edge","app":"frontend"}"#
        );
    }

    #[test]
    fn test_descriptor_defaults() {
        let yaml = r"
type: deployment
name: web
spec: |
  replicas: 3
";
        let descriptor: ResourceDescriptor = serde_yaml::from_str(yaml).expect("parse failed");
        assert_eq!(descriptor.namespace, "default");
        assert!(descriptor.exists);
        assert!(!descriptor.force);
        assert!(descriptor.add_args.is_empty());
        assert_eq!(descriptor.describe(), "Ensure Kubernetes deployment default::web");
    }

    #[test]
    fn test_wait_flattens_condition() {
        let yaml = r#"
type: job
namespace: batch
name: migrate
condition: Complete
status: "True"
timeout_secs: 60
"#;
        let wait: WaitConfig = serde_yaml::from_str(yaml).expect("parse failed");
        assert_eq!(wait.condition.condition_type, "Complete");
        assert_eq!(wait.condition.expected_status, "True");
        assert_eq!(wait.timeout_secs, Some(60));
        assert_eq!(
            wait.describe(),
            "Wait for Complete to be \"True\" on Kubernetes job batch::migrate"
        );
    }

    #[test]
    fn test_select_by_name() {
        let config = EnsureConfig {
            resources: vec![
                ResourceDescriptor::new("deployment", "default", "web", "replicas: 1"),
                ResourceDescriptor::new("service", "default", "web", "ports: []"),
                ResourceDescriptor::new("deployment", "default", "worker", "replicas: 1"),
            ],
            ..EnsureConfig::default()
        };

        assert_eq!(tokio_test::assert_ok!(config.select_resources(None)).len(), 3);
        assert_eq!(tokio_test::assert_ok!(config.select_resources(Some("web"))).len(), 2);
        tokio_test::assert_err!(config.select_resources(Some("missing")));
        tokio_test::assert_err!(config.select_waits(Some("web")));
    }

    #[test]
    fn test_dry_run_arg() {
        let mut tool = ToolConfig::default();
        assert_eq!(tool.dry_run_arg(), "--dry-run");
        tool.dry_run = Some(DryRunMode::Server);
        assert_eq!(tool.dry_run_arg(), "--dry-run=server");
    }

    #[test]
    fn test_scratch_dir_resolution() {
        let base = Path::new("/project");
        let mut tool = ToolConfig {
            scratch_dir: Some(String::from(".scratch")),
            ..ToolConfig::default()
        };
        assert_eq!(tool.resolve_scratch_dir(base), PathBuf::from("/project/.scratch"));
        assert_eq!(tool.resolve_working_dir(base), PathBuf::from("/project/.scratch/work"));

        tool.scratch_dir = None;
        tool.remote = Some(RemoteConfig {
            host: String::from("box"),
            options: vec![],
        });
        assert_eq!(tool.resolve_scratch_dir(base), PathBuf::from(DEFAULT_REMOTE_SCRATCH_DIR));
    }
}
