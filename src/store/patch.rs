//! Patch-based object update protocol (spec §4.1, §4.10 step 6, §9
//! "status patch minimization").
//!
//! Rather than blind `Patch::Merge` of a whole status object (which would
//! touch fields that didn't actually change and generate update churn for
//! every watcher), callers build the *intended* status value and diff it
//! against the object's current status with [`status_patch`]. If the
//! object had no status at all yet, the whole sub-resource is replaced;
//! otherwise only the JSON-patch operations for genuinely different fields
//! are kept.

use json_patch::{diff, Patch as JsonPatch};
use kube::api::Patch;
use serde::Serialize;
use serde_json::Value;

/// Build the smallest `Patch` that moves `current` to `intended`, or `None`
/// if they already serialize identically (the "two successive syncs yield
/// zero additional patches" property from spec §8).
pub fn status_patch<T>(current: &Option<T>, intended: &T) -> Option<Patch<Value>>
where
    T: Serialize + PartialEq,
{
    let intended_json = serde_json::to_value(intended).expect("status always serializes");

    match current {
        None => Some(Patch::Merge(serde_json::json!({ "status": intended_json }))),
        Some(current) if current == intended => None,
        Some(current) => {
            let current_json = serde_json::to_value(current).expect("status always serializes");
            let ops = diff(&current_json, &intended_json);
            if ops.0.is_empty() {
                return None;
            }
            let scoped = JsonPatch(
                ops.0
                    .into_iter()
                    .map(|op| prefix_path(op, "/status"))
                    .collect(),
            );
            Some(Patch::Json::<Value>(scoped))
        }
    }
}

fn prefix_path(op: json_patch::PatchOperation, prefix: &str) -> json_patch::PatchOperation {
    use json_patch::PatchOperation::*;
    match op {
        Add(mut o) => {
            o.path = prefixed(&o.path, prefix);
            Add(o)
        }
        Remove(mut o) => {
            o.path = prefixed(&o.path, prefix);
            Remove(o)
        }
        Replace(mut o) => {
            o.path = prefixed(&o.path, prefix);
            Replace(o)
        }
        Move(mut o) => {
            o.path = prefixed(&o.path, prefix);
            o.from = prefixed(&o.from, prefix);
            Move(o)
        }
        Copy(mut o) => {
            o.path = prefixed(&o.path, prefix);
            o.from = prefixed(&o.from, prefix);
            Copy(o)
        }
        Test(mut o) => {
            o.path = prefixed(&o.path, prefix);
            Test(o)
        }
    }
}

fn prefixed(path: &jsonptr::PointerBuf, prefix: &str) -> jsonptr::PointerBuf {
    let joined = format!("{prefix}{path}");
    jsonptr::PointerBuf::parse(&joined).expect("prefixed JSON pointer is well-formed")
}

/// Emit a JSON-merge patch that sets or removes a single annotation. Used
/// for the sentinel annotations (`AnnVolumeSnapshotBeingCreated`, etc.)
/// which must be crash-safe, persisted flags rather than in-memory state.
pub fn annotation_patch(key: &str, value: Option<&str>) -> Patch<Value> {
    Patch::Merge(serde_json::json!({
        "metadata": {
            "annotations": { key: value }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
    struct Status {
        ready_to_use: Option<bool>,
        restore_size: Option<i64>,
        creation_time: Option<i64>,
    }

    #[test]
    fn nil_status_is_replaced_wholesale() {
        let intended = Status {
            ready_to_use: Some(true),
            restore_size: Some(100),
            creation_time: Some(1),
        };
        let patch = status_patch(&None, &intended);
        assert!(matches!(patch, Some(Patch::Merge(_))));
    }

    #[test]
    fn unchanged_status_yields_no_patch() {
        let current = Status {
            ready_to_use: Some(true),
            restore_size: Some(100),
            creation_time: Some(1),
        };
        let intended = current.clone();
        assert!(status_patch(&Some(current), &intended).is_none());
    }

    #[test]
    fn only_changed_field_is_patched() {
        let current = Status {
            ready_to_use: Some(false),
            restore_size: Some(100),
            creation_time: Some(1),
        };
        let intended = Status {
            ready_to_use: Some(true),
            ..current.clone()
        };
        let patch = status_patch(&Some(current), &intended).unwrap();
        match patch {
            Patch::Json(p) => {
                assert_eq!(p.0.len(), 1);
            }
            _ => panic!("expected a minimal JSON patch"),
        }
    }
}
