//! Channel Discovery
//!
//! Scans a snapshot of the state tree for run-time leaves and proposes them
//! as channels. Read-only: the output is handed to the controller.

use heartwire_core::SourceMeta;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Accepted leaf names, compared case-insensitively.
pub const RUN_TIME_FIELDS: &[&str] = &["runtime", "runhours", "enginehours", "operatinghours"];

pub const UNKNOWN_SOURCE: &str = "unknown";

/// A candidate channel found in the state tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredChannel {
    pub path: String,
    pub unit: String,
    pub source: String,
}

impl fmt::Display for DiscoveredChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}] from {}", self.path, self.unit, self.source)
    }
}

pub fn is_run_time_field(name: &str) -> bool {
    RUN_TIME_FIELDS.iter().any(|f| f.eq_ignore_ascii_case(name))
}

/// Find every run-time leaf under `subtree`, which is the node found at `root`.
///
/// An absent or non-object subtree yields no candidates.
pub fn discover(subtree: Option<&Value>, root: &str) -> Vec<DiscoveredChannel> {
    let Some(Value::Object(_)) = subtree else {
        tracing::debug!(root, "Discovery root absent or not an object");
        return Vec::new();
    };

    let mut found = Vec::new();
    if let Some(node) = subtree {
        walk(node, root, &mut found);
    }
    found.sort_by(|a, b| a.path.cmp(&b.path));

    for candidate in &found {
        tracing::debug!(
            path = %candidate.path,
            unit = %candidate.unit,
            source = %candidate.source,
            "Discovered channel"
        );
    }
    tracing::info!(root, count = found.len(), "Discovery finished");
    found
}

fn walk(node: &Value, prefix: &str, found: &mut Vec<DiscoveredChannel>) {
    let Value::Object(map) = node else {
        return;
    };

    for (key, child) in map {
        if key == "meta" || key.starts_with('$') {
            continue;
        }
        let path = format!("{prefix}.{key}");

        if is_run_time_field(key) && is_leaf(child) {
            found.push(DiscoveredChannel {
                unit: unit_of(key, child),
                source: source_of(child),
                path,
            });
        } else if child.is_object() && !is_leaf(child) {
            walk(child, &path, found);
        }
    }
}

fn is_leaf(node: &Value) -> bool {
    match node {
        Value::Object(map) => map.contains_key("value"),
        Value::Array(_) | Value::Null => false,
        _ => true,
    }
}

fn unit_of(field: &str, leaf: &Value) -> String {
    leaf.get("meta")
        .and_then(|meta| meta.get("units"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| {
            if field.to_ascii_lowercase().contains("hours") {
                "h".to_string()
            } else {
                "s".to_string()
            }
        })
}

fn source_of(leaf: &Value) -> String {
    if let Some(reference) = leaf.get("$source").and_then(Value::as_str) {
        if !reference.trim().is_empty() {
            return reference.trim().to_string();
        }
    }
    leaf.get("source")
        .and_then(|source| serde_json::from_value::<SourceMeta>(source.clone()).ok())
        .and_then(|meta| meta.identity())
        .unwrap_or_else(|| UNKNOWN_SOURCE.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_discovers_matching_leaves() {
        let tree = json!({
            "port": {
                "runTime": {"value": 3600, "$source": "n2k.16", "meta": {"units": "s"}},
                "revolutions": {"value": 12.5}
            },
            "stbd": {
                "RUNHOURS": {"value": 100.5, "source": {"label": "vedirect"}}
            },
            "generator": {
                "engineHours": 42
            }
        });

        let found = discover(Some(&tree), "propulsion");
        assert_eq!(
            found,
            vec![
                DiscoveredChannel {
                    path: "propulsion.generator.engineHours".into(),
                    unit: "h".into(),
                    source: UNKNOWN_SOURCE.into(),
                },
                DiscoveredChannel {
                    path: "propulsion.port.runTime".into(),
                    unit: "s".into(),
                    source: "n2k.16".into(),
                },
                DiscoveredChannel {
                    path: "propulsion.stbd.RUNHOURS".into(),
                    unit: "h".into(),
                    source: "vedirect".into(),
                },
            ]
        );
    }

    #[test]
    fn test_absent_or_malformed_tree_is_empty() {
        assert!(discover(None, "propulsion").is_empty());
        assert!(discover(Some(&json!(17)), "propulsion").is_empty());
        assert!(discover(Some(&json!({"port": [1, 2]})), "propulsion").is_empty());
        assert!(discover(Some(&json!({"port": {"runTime": null}})), "propulsion").is_empty());
    }

    #[test]
    fn test_skips_meta_and_nested_non_matching() {
        let tree = json!({
            "port": {
                "meta": {"runTime": {"value": 1}},
                "transmission": {"gear": {"value": "forward"}},
                "deep": {"inner": {"operatingHours": {"value": 9}}}
            }
        });
        let found = discover(Some(&tree), "propulsion");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].path, "propulsion.port.deep.inner.operatingHours");
    }
}
