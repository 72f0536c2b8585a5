//! Configuration parser for loading configuration files.
//!
//! This module handles loading configuration from YAML files, `.env` files
//! and environment variables, with proper precedence and error handling.

use crate::error::{ConfigError, KubeEnsureError, Result};
use std::path::Path;
use tracing::{debug, info};

use super::spec::{EnsureConfig, RemoteConfig};

/// Configuration parser for loading ensure configuration.
#[derive(Debug, Default)]
pub struct ConfigParser {
    /// Base path for resolving relative paths.
    base_path: Option<std::path::PathBuf>,
}

impl ConfigParser {
    /// Creates a new configuration parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the base path for resolving relative paths.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Returns the base path, defaulting to the current directory.
    #[must_use]
    pub fn base_path(&self) -> &Path {
        self.base_path.as_deref().unwrap_or_else(|| Path::new("."))
    }

    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<EnsureConfig> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        if !path.exists() {
            return Err(KubeEnsureError::Config(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            KubeEnsureError::Config(ConfigError::ParseError {
                message: format!("Failed to read file: {e}"),
                location: Some(path.display().to_string()),
            })
        })?;

        self.parse_yaml(&content, Some(path))
    }

    /// Parses configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<EnsureConfig> {
        debug!("Parsing YAML configuration");

        let config: EnsureConfig = serde_yaml::from_str(content).map_err(|e| {
            let location = source.map(|p| p.display().to_string());
            KubeEnsureError::Config(ConfigError::ParseError {
                message: format!("YAML parse error: {e}"),
                location,
            })
        })?;

        debug!(
            "Parsed {} resource(s) and {} wait(s)",
            config.resources.len(),
            config.waits.len()
        );
        Ok(config)
    }

    /// Loads configuration with environment variable overrides.
    ///
    /// Recognized variables:
    /// - `KUBE_ENSURE_EXECUTABLE` overrides `tool.executable`
    /// - `KUBE_ENSURE_REMOTE_HOST` sets `tool.remote.host`
    /// - `KUBE_ENSURE_SCRATCH_DIR` overrides `tool.scratch_dir`
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_with_env(&self, path: impl AsRef<Path>) -> Result<EnsureConfig> {
        let mut config = self.load_file(path)?;
        Self::apply_env_overrides(&mut config);
        Ok(config)
    }

    /// Applies environment variable overrides to the configuration.
    pub fn apply_env_overrides(config: &mut EnsureConfig) {
        Self::apply_overrides(config, |name| std::env::var(name).ok());
    }

    /// Applies overrides read through `lookup`, keyed by environment
    /// variable name.
    pub fn apply_overrides(config: &mut EnsureConfig, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(executable) = lookup("KUBE_ENSURE_EXECUTABLE") {
            debug!("Overriding tool.executable from environment");
            config.tool.executable = executable;
        }

        if let Some(host) = lookup("KUBE_ENSURE_REMOTE_HOST") {
            debug!("Overriding tool.remote.host from environment");
            match &mut config.tool.remote {
                Some(remote) => remote.host = host,
                None => {
                    config.tool.remote = Some(RemoteConfig {
                        host,
                        options: Vec::new(),
                    });
                }
            }
        }

        if let Some(dir) = lookup("KUBE_ENSURE_SCRATCH_DIR") {
            debug!("Overriding tool.scratch_dir from environment");
            config.tool.scratch_dir = Some(dir);
        }
    }

    /// Loads the .env file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the .env file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self.base_path().join(".env");

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| {
                KubeEnsureError::Config(ConfigError::ParseError {
                    message: format!("Failed to load .env file: {e}"),
                    location: Some(env_path.display().to_string()),
                })
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }
}

/// Default configuration file names to search for.
pub const DEFAULT_CONFIG_FILES: &[&str] = &["kube-ensure.yaml", "kube-ensure.yml", "ensure.yaml"];

/// Finds the configuration file in the given directory or its parents.
///
/// # Errors
///
/// Returns an error if no configuration file is found.
pub fn find_config_file(start_dir: impl AsRef<Path>) -> Result<std::path::PathBuf> {
    let start = start_dir.as_ref();
    let mut current = start.canonicalize().unwrap_or_else(|_| start.to_path_buf());

    loop {
        for filename in DEFAULT_CONFIG_FILES {
            let config_path = current.join(filename);
            if config_path.exists() {
                info!("Found configuration file: {}", config_path.display());
                return Ok(config_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    Err(KubeEnsureError::Config(ConfigError::FileNotFound {
        path: start.join(DEFAULT_CONFIG_FILES[0]),
    }))
}
