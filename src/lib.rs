// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(warnings)]                    // All warnings are treated as errors
#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(dead_code)]                   // Unused code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![deny(unused_imports)]              // Unused imports are forbidden
#![deny(unused_variables)]            // Unused variables are forbidden
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # kube-ensure
//!
//! A declarative reconciler for Kubernetes resources driven through `kubectl`.
//!
//! ## Overview
//!
//! kube-ensure keeps a list of resources in their declared state:
//!
//! - Describe each resource (type, namespace, name, labels, spec) in a YAML file
//! - Detect drift by comparing dry-run previews with the live object
//! - Converge drifted resources with `apply`, `replace` or `delete`
//! - Wait for resource conditions such as `Complete` or `Available`
//!
//! ## Architecture
//!
//! Each resource goes through one reconciliation cycle:
//!
//! 1. **Snapshot**: dry-run `apply`, dry-run `create` and a live `get`
//! 2. **Merge**: fields only the create preview shows are merged into the
//!    apply preview, and merged arrays are trimmed to the live lengths
//! 3. **Diff**: `metadata` and `spec` are compared path by path
//! 4. **Converge**: one command when anything differs
//!
//! ## Modules
//!
//! - [`config`]: Configuration parsing and validation
//! - [`process`]: Argument quoting and process execution
//! - [`host`]: Local and ssh execution hosts
//! - [`materialize`]: Transient manifest files
//! - [`kubectl`]: Client for the external tool
//! - [`snapshot`]: Preview and live state collection
//! - [`diff`]: Desired-state merge and structural diff
//! - [`converge`]: Convergence actions
//! - [`watch`]: Condition watcher
//! - [`reconciler`]: Reconciliation engine
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! tool:
//!   executable: kubectl
//!   api_version: apps/v1
//!
//! resources:
//!   - type: deployment
//!     namespace: default
//!     name: web
//!     labels:
//!       app: web
//!     spec: |
//!       replicas: 3
//!       selector:
//!         matchLabels:
//!           app: web
//!
//! waits:
//!   - type: deployment
//!     name: web
//!     condition: Available
//!     status: "True"
//!     timeout_secs: 300
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod cli;
pub mod config;
pub mod converge;
pub mod diff;
pub mod error;
pub mod host;
pub mod kubectl;
pub mod materialize;
pub mod process;
pub mod reconciler;
pub mod snapshot;
pub mod watch;

// ============================================================================
// Re-exports
// ============================================================================

pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{ConfigParser, ConfigValidator, EnsureConfig, ResourceDescriptor, WaitConfig};
pub use converge::{ConvergenceAction, Converger};
pub use diff::{compare, Difference};
pub use error::{KubeEnsureError, Result};
pub use host::{ExecutionHost, LocalHost, SshHost};
pub use kubectl::KubectlClient;
pub use materialize::{Materializer, TransientDocument};
pub use process::{ExecutionRequest, ProcessRunner, ShellFlavor};
pub use reconciler::{DriftReport, ReconciliationResult, Reconciler, ResourceReport};
pub use snapshot::{CollectedState, Snapshot, Snapshotter};
pub use watch::{ConditionWatcher, WaitReport, WatchOutcome};
