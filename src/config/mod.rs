//! Configuration module for the kube-ensure system.
//!
//! This module handles all configuration-related functionality:
//! - Parsing and deserializing `kube-ensure.yaml`
//! - Environment and `.env` overrides
//! - Validation of configuration values

mod parser;
mod spec;
mod validator;

pub use parser::{find_config_file, ConfigParser, DEFAULT_CONFIG_FILES};
pub use spec::{
    Condition, DryRunMode, EnsureConfig, Labels, RemoteConfig, ResourceDescriptor, ToolConfig,
    WaitConfig, DEFAULT_API_VERSION, DEFAULT_EXECUTABLE, DEFAULT_NAMESPACE,
    DEFAULT_REMOTE_SCRATCH_DIR,
};
pub use validator::{ConfigValidator, ValidationError, ValidationResult};
