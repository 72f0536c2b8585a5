//! Desired-state merging.
//!
//! A dry-run `apply` of an existing resource leaves out fields the cluster
//! only sets on creation, while a dry-run `create` includes them. Merging
//! the create preview into the apply preview recovers those fields; the
//! correction pass then trims arrays the merge made longer than the live
//! document's.

use serde_json::Value;

/// Deep-merges `content` into `target`.
///
/// - Objects: keys missing from `target` are added; values present in both
///   are merged recursively when both are the same kind of container,
///   otherwise `content` wins unless it is `null`.
/// - Arrays: merged by position. An element present in both is merged if
///   the target element is a container, otherwise replaced by a non-null
///   content element. Extra content elements are appended.
/// - Anything else (mismatched kinds at the top level) leaves `target`
///   unchanged.
pub fn merge_into(target: &mut Value, content: &Value) {
    match (target, content) {
        (Value::Object(target), Value::Object(content)) => {
            for (key, content_value) in content {
                match target.get_mut(key) {
                    Some(existing) => merge_property(existing, content_value),
                    None => {
                        target.insert(key.clone(), content_value.clone());
                    }
                }
            }
        }
        (Value::Array(target), Value::Array(content)) => {
            for (index, content_item) in content.iter().enumerate() {
                match target.get_mut(index) {
                    Some(existing) => {
                        if is_container(existing) {
                            merge_into(existing, content_item);
                        } else if !content_item.is_null() {
                            *existing = content_item.clone();
                        }
                    }
                    None => target.push(content_item.clone()),
                }
            }
        }
        _ => {}
    }
}

fn merge_property(existing: &mut Value, content: &Value) {
    let same_container = matches!(
        (&*existing, content),
        (Value::Object(_), Value::Object(_)) | (Value::Array(_), Value::Array(_))
    );

    if same_container {
        merge_into(existing, content);
    } else if !content.is_null() {
        *existing = content.clone();
    }
}

const fn is_container(value: &Value) -> bool {
    matches!(value, Value::Object(_) | Value::Array(_))
}

/// Trims arrays in `merged` to the length of the corresponding arrays in
/// `live`.
///
/// The walk follows `live`: objects by the live document's keys, arrays by
/// index up to the live length. Elements are dropped by position only;
/// their content is not compared.
pub fn truncate_arrays_to(merged: &mut Value, live: &Value) {
    match live {
        Value::Object(live) => {
            for (key, live_value) in live {
                if let Some(merged_value) = merged.get_mut(key.as_str()) {
                    truncate_arrays_to(merged_value, live_value);
                }
            }
        }
        Value::Array(live) => {
            if let Value::Array(merged) = merged {
                merged.truncate(live.len());
                for (merged_item, live_item) in merged.iter_mut().zip(live) {
                    truncate_arrays_to(merged_item, live_item);
                }
            }
        }
        _ => {}
    }
}

/// Builds the corrected desired-state document.
///
/// Starts from the apply preview, merges in the create preview, and, when
/// the resource exists, trims merged arrays to the live lengths.
#[must_use]
pub fn desired_state(applied: &Value, template: &Value, live: Option<&Value>) -> Value {
    let mut desired = applied.clone();
    merge_into(&mut desired, template);
    if let Some(live) = live {
        truncate_arrays_to(&mut desired, live);
    }
    desired
}
