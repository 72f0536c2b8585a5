//! Structural differ for desired vs live documents.
//!
//! Only `metadata` and `spec` are compared; everything else at the top
//! level is identity or runtime status. Paths are built with `.key` for
//! object members and `[index]` for array elements.

use serde::Serialize;
use serde_json::Value;

/// Path of the synthetic existence difference.
pub const EXISTS_PATH: &str = "exists";

/// Top-level sections that carry configuration.
pub const COMPARED_SECTIONS: [&str; 2] = ["metadata", "spec"];

/// A single path-qualified difference between desired and live state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Difference {
    /// Dot/bracket path of the differing value (e.g. `spec.ports[0].port`).
    pub path: String,
    /// Desired value, pretty-printed JSON (`null` when missing).
    pub expected: String,
    /// Live value, pretty-printed JSON (`null` when missing).
    pub actual: String,
}

impl Difference {
    /// Creates the difference reported when existence disagrees.
    #[must_use]
    pub fn existence(expected: bool, actual: bool) -> Self {
        Self {
            path: String::from(EXISTS_PATH),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Returns true if this is an existence difference.
    #[must_use]
    pub fn is_existence(&self) -> bool {
        self.path == EXISTS_PATH
    }
}

impl std::fmt::Display for Difference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: expected {}, found {}", self.path, self.expected, self.actual)
    }
}

/// Compares the configuration sections of two documents.
#[must_use]
pub fn diff_documents(desired: &Value, live: &Value) -> Vec<Difference> {
    let mut differences = Vec::new();
    for section in COMPARED_SECTIONS {
        diff_values(section, desired.get(section), live.get(section), &mut differences);
    }
    differences
}

/// Recursively compares two values rooted at `path`.
///
/// `None` stands for a missing key or an index past the end of an array.
/// A missing value and an explicit `null` are not equal.
pub fn diff_values(
    path: &str,
    expected: Option<&Value>,
    actual: Option<&Value>,
    differences: &mut Vec<Difference>,
) {
    match (expected, actual) {
        (Some(Value::Object(expected)), Some(Value::Object(actual))) => {
            let keys = expected
                .keys()
                .chain(actual.keys().filter(|key| !expected.contains_key(key.as_str())));

            for key in keys {
                diff_values(
                    &format!("{path}.{key}"),
                    expected.get(key),
                    actual.get(key),
                    differences,
                );
            }
        }
        (Some(Value::Array(expected)), Some(Value::Array(actual))) => {
            let len = expected.len().max(actual.len());
            for index in 0..len {
                diff_values(
                    &format!("{path}[{index}]"),
                    expected.get(index),
                    actual.get(index),
                    differences,
                );
            }
        }
        _ => {
            if expected != actual {
                differences.push(Difference {
                    path: path.to_string(),
                    expected: render(expected),
                    actual: render(actual),
                });
            }
        }
    }
}

fn render(value: Option<&Value>) -> String {
    value.map_or_else(
        || String::from("null"),
        |v| serde_json::to_string_pretty(v).unwrap_or_else(|_| v.to_string()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn deployment() -> Value {
        json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {"name": "web", "labels": {"app": "web"}},
            "spec": {
                "replicas": 3,
                "template": {"spec": {"containers": [{"name": "app", "image": "nginx:1.27"}]}}
            },
            "status": {"readyReplicas": 3}
        })
    }

    #[test]
    fn test_identical_documents_have_no_differences() {
        let doc = deployment();
        assert!(diff_documents(&doc, &doc).is_empty());
    }

    #[test]
    fn test_single_leaf_change() {
        let desired = deployment();
        let mut live = deployment();
        live["spec"]["template"]["spec"]["containers"][0]["image"] = json!("nginx:1.25");

        let differences = diff_documents(&desired, &live);

        assert_eq!(differences.len(), 1);
        assert_eq!(differences[0].path, "spec.template.spec.containers[0].image");
        assert_eq!(differences[0].expected, "\"nginx:1.27\"");
        assert_eq!(differences[0].actual, "\"nginx:1.25\"");
    }

    #[test]
    fn test_status_and_other_sections_ignored() {
        let desired = deployment();
        let mut live = deployment();
        live["status"] = json!({"readyReplicas": 0});
        live["kind"] = json!("Something");

        assert!(diff_documents(&desired, &live).is_empty());
    }

    #[test]
    fn test_key_missing_on_one_side() {
        let desired = json!({"spec": {"a": 1}});
        let live = json!({"spec": {"a": 1, "b": {"c": true}}});

        let differences = diff_documents(&desired, &live);

        assert_eq!(differences.len(), 1);
        assert_eq!(differences[0].path, "spec.b");
        assert_eq!(differences[0].expected, "null");
        assert_eq!(differences[0].actual, "{\n  \"c\": true\n}");
    }

    #[test]
    fn test_missing_differs_from_explicit_null() {
        let mut differences = Vec::new();
        diff_values("spec.x", None, Some(&Value::Null), &mut differences);
        assert_eq!(differences.len(), 1);
    }

    #[test]
    fn test_array_length_mismatch() {
        let desired = json!({"spec": {"ports": [80, 443]}});
        let live = json!({"spec": {"ports": [80]}});

        let differences = diff_documents(&desired, &live);

        assert_eq!(differences.len(), 1);
        assert_eq!(differences[0].path, "spec.ports[1]");
        assert_eq!(differences[0].expected, "443");
        assert_eq!(differences[0].actual, "null");
    }

    #[test]
    fn test_kind_mismatch_reports_whole_subtree() {
        let desired = json!({"spec": {"selector": {"app": "web"}}});
        let live = json!({"spec": {"selector": ["web"]}});

        let differences = diff_documents(&desired, &live);

        assert_eq!(differences.len(), 1);
        assert_eq!(differences[0].path, "spec.selector");
    }

    #[test]
    fn test_differences_are_ordered() {
        let desired = json!({"metadata": {"name": "a"}, "spec": {"x": 1, "y": 2}});
        let live = json!({"metadata": {"name": "b"}, "spec": {"x": 3, "y": 4}});

        let paths: Vec<String> = diff_documents(&desired, &live)
            .into_iter()
            .map(|d| d.path)
            .collect();

        assert_eq!(paths, vec!["metadata.name", "spec.x", "spec.y"]);
    }

    #[test]
    fn test_existence_difference() {
        let difference = Difference::existence(true, false);
        assert!(difference.is_existence());
        assert_eq!(difference.to_string(), "exists: expected true, found false");
    }
}
