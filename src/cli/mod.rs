//! CLI module for the kube-ensure tool.
//!
//! This module provides the command-line interface for reconciling
//! Kubernetes resources and waiting on their conditions.

mod commands;
mod output;

pub use commands::{Cli, Commands, OutputFormat};
pub use output::OutputFormatter;
