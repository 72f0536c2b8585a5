//! Desired-state computation and drift detection.
//!
//! This module decides whether a resource needs converging:
//! - [`merge`] builds the desired document from the two dry-run previews
//! - [`differ`] compares it against the live document
//! - [`compare`] ties both to a descriptor and its collected state

mod differ;
mod merge;

pub use differ::{diff_documents, diff_values, Difference, COMPARED_SECTIONS, EXISTS_PATH};
pub use merge::{desired_state, merge_into, truncate_arrays_to};

use crate::config::ResourceDescriptor;
use crate::snapshot::CollectedState;

/// Compares a descriptor against the state collected for it.
///
/// When the descriptor's existence flag disagrees with the cluster, a single
/// existence difference is returned and nothing else is inspected. A
/// resource that should not exist and does not has no differences.
#[must_use]
pub fn compare(descriptor: &ResourceDescriptor, state: &CollectedState) -> Vec<Difference> {
    if descriptor.exists != state.exists {
        return vec![Difference::existence(descriptor.exists, state.exists)];
    }

    if !descriptor.exists {
        return Vec::new();
    }

    let snapshot = &state.snapshot;
    let live = snapshot.normalized_actual.as_ref();
    let desired = desired_state(&snapshot.normalized_applied, &snapshot.normalized_template, live);

    match live {
        Some(live) => diff_documents(&desired, live),
        None => diff_documents(&desired, &serde_json::Value::Null),
    }
}
