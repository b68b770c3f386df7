//! `VolumeGroupSnapshotContent` conversion webhook (spec §4.14).
//!
//! `v1beta1` stores `status.volumeSnapshotHandlePairList`; `v1beta2` stores
//! `status.volumeSnapshotInfoList` with additional per-entry
//! `{creationTime, readyToUse, restoreSize}`. Operates on raw JSON, not the
//! typed `VolumeGroupSnapshotContent`, because a conversion webhook must
//! accept whichever version the API server asks for, including ones this
//! binary has no Rust struct for.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::types::{VolumeSnapshotHandlePair, VolumeSnapshotInfo, ANN_VOLUME_SNAPSHOT_INFO_LIST};

pub const V1BETA1: &str = "groupsnapshot.storage.k8s.io/v1beta1";
pub const V1BETA2: &str = "groupsnapshot.storage.k8s.io/v1beta2";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConversionReview {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<ConversionRequest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<ConversionResponse>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConversionRequest {
    pub uid: String,
    #[serde(rename = "desiredAPIVersion")]
    pub desired_api_version: String,
    pub objects: Vec<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversionResponse {
    pub uid: String,
    pub result: ConversionResult,
    #[serde(rename = "convertedObjects")]
    pub converted_objects: Vec<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversionResult {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Converts every object in the request to the desired API version and
/// wraps the outcome as a `ConversionReview` response. Never returns a
/// `Result::Err` to the HTTP layer: per-object failures are reported inside
/// the review as a failed status instead.
pub fn handle_review(review: ConversionReview) -> ConversionReview {
    let Some(request) = review.request else {
        return ConversionReview {
            response: Some(ConversionResponse {
                uid: String::new(),
                result: ConversionResult {
                    status: "Failure",
                    message: Some("missing request".to_string()),
                },
                converted_objects: Vec::new(),
            }),
            ..review
        };
    };

    let mut converted = Vec::with_capacity(request.objects.len());
    let mut failure = None;
    for object in &request.objects {
        match convert_object(object, &request.desired_api_version) {
            Ok(converted_object) => converted.push(converted_object),
            Err(e) => {
                failure = Some(e.to_string());
                break;
            }
        }
    }

    let result = match failure {
        Some(message) => ConversionResult { status: "Failure", message: Some(message) },
        None => ConversionResult { status: "Success", message: None },
    };

    ConversionReview {
        api_version: review.api_version,
        kind: review.kind,
        request: None,
        response: Some(ConversionResponse {
            uid: request.uid,
            result,
            converted_objects: converted,
        }),
    }
}

fn convert_object(object: &Value, desired_api_version: &str) -> Result<Value> {
    let current_api_version = object
        .get("apiVersion")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Other("object missing apiVersion".to_string()))?;

    if current_api_version == desired_api_version {
        return Err(Error::Other("should not call webhook: source and target apiVersion are identical".to_string()));
    }

    match (current_api_version, desired_api_version) {
        (V1BETA2, V1BETA1) => Ok(v2_to_v1(object.clone())),
        (V1BETA1, V1BETA2) => Ok(v1_to_v2(object.clone())),
        _ => Err(Error::Other(format!(
            "unsupported conversion {current_api_version} -> {desired_api_version}"
        ))),
    }
}

/// Stash the full `volumeSnapshotInfoList` JSON in an annotation, strip the
/// extra per-entry fields, rename the field to `volumeSnapshotHandlePairList`.
fn v2_to_v1(mut object: Value) -> Value {
    object["apiVersion"] = Value::String(V1BETA1.to_string());

    let info_list: Vec<VolumeSnapshotInfo> = object
        .pointer("/status/volumeSnapshotInfoList")
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_default();

    if !info_list.is_empty() {
        if let Ok(stash) = serde_json::to_string(&info_list) {
            object["metadata"]["annotations"][ANN_VOLUME_SNAPSHOT_INFO_LIST] = Value::String(stash);
        }
    }

    let pairs: Vec<VolumeSnapshotHandlePair> = info_list.iter().map(VolumeSnapshotHandlePair::from).collect();
    if let Some(status) = object.get_mut("status").and_then(Value::as_object_mut) {
        status.remove("volumeSnapshotInfoList");
        status.insert(
            "volumeSnapshotHandlePairList".to_string(),
            serde_json::to_value(pairs).unwrap_or(Value::Array(Vec::new())),
        );
    }
    object
}

/// If the stash annotation exists, deserialize and restore it verbatim
/// (this is the identity path for a `v2->v1->v2` round trip). Otherwise
/// promote the existing pair list to the info-list field name, losing the
/// per-entry timestamps/readiness/size that only `v1beta2` carries.
fn v1_to_v2(mut object: Value) -> Value {
    object["apiVersion"] = Value::String(V1BETA2.to_string());

    let stash: Option<Vec<VolumeSnapshotInfo>> = object
        .pointer(&format!("/metadata/annotations/{ANN_VOLUME_SNAPSHOT_INFO_LIST}"))
        .and_then(Value::as_str)
        .and_then(|s| serde_json::from_str(s).ok());

    let info_list = match stash {
        Some(list) => list,
        None => {
            let pairs: Vec<VolumeSnapshotHandlePair> = object
                .pointer("/status/volumeSnapshotHandlePairList")
                .and_then(|v| serde_json::from_value(v.clone()).ok())
                .unwrap_or_default();
            pairs
                .into_iter()
                .map(|p| VolumeSnapshotInfo {
                    volume_handle: p.volume_handle,
                    snapshot_handle: p.snapshot_handle,
                    creation_time: None,
                    ready_to_use: None,
                    restore_size: None,
                })
                .collect()
        }
    };

    if let Some(annotations) = object.pointer_mut("/metadata/annotations").and_then(Value::as_object_mut) {
        annotations.remove(ANN_VOLUME_SNAPSHOT_INFO_LIST);
    }
    if let Some(status) = object.get_mut("status").and_then(Value::as_object_mut) {
        status.remove("volumeSnapshotHandlePairList");
        status.insert(
            "volumeSnapshotInfoList".to_string(),
            serde_json::to_value(info_list).unwrap_or(Value::Array(Vec::new())),
        );
    }
    object
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v2_object() -> Value {
        serde_json::json!({
            "apiVersion": V1BETA2,
            "kind": "VolumeGroupSnapshotContent",
            "metadata": { "name": "content-1", "annotations": {} },
            "status": {
                "volumeSnapshotInfoList": [
                    { "volumeHandle": "v", "snapshotHandle": "s", "creationTime": 1, "readyToUse": true, "restoreSize": 100 }
                ]
            }
        })
    }

    #[test]
    fn v2_to_v1_stashes_full_list_and_strips_fields() {
        let converted = v2_to_v1(v2_object());
        assert_eq!(converted["apiVersion"], V1BETA1);
        assert!(converted["status"].get("volumeSnapshotInfoList").is_none());
        let pairs = converted["status"]["volumeSnapshotHandlePairList"].as_array().unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0]["volumeHandle"], "v");
        assert!(pairs[0].get("creationTime").is_none());
        let stash = converted["metadata"]["annotations"][ANN_VOLUME_SNAPSHOT_INFO_LIST].as_str().unwrap();
        assert!(stash.contains("\"creationTime\":1"));
    }

    #[test]
    fn v1_to_v2_round_trips_via_stash() {
        let v1 = v2_to_v1(v2_object());
        let back = v1_to_v2(v1);
        let info = back["status"]["volumeSnapshotInfoList"].as_array().unwrap();
        assert_eq!(info.len(), 1);
        assert_eq!(info[0]["creationTime"], 1);
        assert_eq!(info[0]["readyToUse"], true);
        assert_eq!(info[0]["restoreSize"], 100);
        assert!(back["metadata"]["annotations"].get(ANN_VOLUME_SNAPSHOT_INFO_LIST).is_none());
    }

    #[test]
    fn v1_to_v2_without_stash_promotes_bare_pairs() {
        let v1 = serde_json::json!({
            "apiVersion": V1BETA1,
            "metadata": { "name": "content-1", "annotations": {} },
            "status": { "volumeSnapshotHandlePairList": [{ "volumeHandle": "v", "snapshotHandle": "s" }] }
        });
        let back = v1_to_v2(v1);
        let info = back["status"]["volumeSnapshotInfoList"].as_array().unwrap();
        assert_eq!(info[0]["volumeHandle"], "v");
        assert!(info[0].get("creationTime").is_none());
    }

    #[test]
    fn same_version_conversion_is_rejected() {
        let err = convert_object(&v2_object(), V1BETA2).unwrap_err();
        assert!(err.to_string().contains("should not call webhook"));
    }
}
