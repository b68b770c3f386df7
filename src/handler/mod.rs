//! Backend handler abstraction (spec §6, §9 "polymorphism over backends").
//!
//! The sidecar and group-sidecar controllers never talk to a storage driver
//! directly; they go through a single narrow trait with two implementations:
//! [`grpc::GrpcSnapshotHandler`] (a real CSI-over-gRPC client) and
//! [`fake::FakeHandler`] (an in-process recorder used by tests). No other
//! runtime dispatch exists in the system.

pub mod fake;
pub mod grpc;

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::error::Result;

/// Everything the backend reported about a newly (or already) created
/// snapshot.
#[derive(Clone, Debug, PartialEq)]
pub struct CreateSnapshotResponse {
    pub driver: String,
    pub snapshot_id: String,
    /// Nanoseconds since the epoch, per spec §4.8 step 7.
    pub creation_time_ns: i64,
    pub size_bytes: i64,
    pub ready_to_use: bool,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SnapshotStatusResponse {
    pub ready_to_use: bool,
    pub creation_time_ns: i64,
    pub size_bytes: i64,
    /// Only set when the backend reports a non-empty group handle
    /// (spec §9, open question (c)).
    pub group_snapshot_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CreateGroupSnapshotResponse {
    pub driver: String,
    pub group_snapshot_id: String,
    pub creation_time_ns: i64,
    pub ready_to_use: bool,
    /// One entry per member volume, in the same order as the request.
    pub members: Vec<CreateSnapshotResponse>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct GroupSnapshotStatusResponse {
    pub ready_to_use: bool,
    pub creation_time_ns: i64,
    pub members: Vec<SnapshotStatusResponse>,
}

/// The pluggable CSI backend boundary (spec §6). Implementations are
/// expected to be idempotent on the supplied deterministic name: repeat
/// invocations with the same `snapshot_name` return the same identifiers.
#[async_trait]
pub trait SnapshotHandler: Send + Sync {
    async fn create_snapshot(
        &self,
        snapshot_name: &str,
        volume_handle: &str,
        parameters: &BTreeMap<String, String>,
        secrets: &BTreeMap<String, String>,
    ) -> Result<CreateSnapshotResponse>;

    async fn delete_snapshot(
        &self,
        snapshot_id: &str,
        secrets: &BTreeMap<String, String>,
    ) -> Result<()>;

    async fn get_snapshot_status(
        &self,
        snapshot_id: &str,
        secrets: &BTreeMap<String, String>,
    ) -> Result<SnapshotStatusResponse>;

    /// `member_snapshot_names[i]` is the deterministic name for
    /// `volume_handles[i]` (spec §4.13), passed through so the backend's
    /// per-member snapshot IDs are idempotent across retries too.
    async fn create_group_snapshot(
        &self,
        group_snapshot_name: &str,
        volume_handles: &[String],
        member_snapshot_names: &[String],
        parameters: &BTreeMap<String, String>,
        secrets: &BTreeMap<String, String>,
    ) -> Result<CreateGroupSnapshotResponse>;

    async fn delete_group_snapshot(
        &self,
        group_snapshot_id: &str,
        member_snapshot_ids: &[String],
        secrets: &BTreeMap<String, String>,
    ) -> Result<()>;

    async fn get_group_snapshot_status(
        &self,
        group_snapshot_id: &str,
        member_snapshot_ids: &[String],
        secrets: &BTreeMap<String, String>,
    ) -> Result<GroupSnapshotStatusResponse>;
}

/// Derives the deterministic snapshot name used both as the CSI call's
/// idempotency key and, for single-volume snapshots, as the
/// `VolumeSnapshotContent` name prefix (spec §6).
///
/// `length < 0` keeps the full UID including dashes; otherwise the UID's
/// dashes are stripped first and the result truncated to `length` bytes.
pub fn derive_snapshot_name(prefix: &str, uid: &str, length: i64) -> String {
    if length < 0 {
        return format!("{prefix}-{uid}");
    }
    let stripped: String = uid.chars().filter(|c| *c != '-').collect();
    let truncated: String = stripped.chars().take(length as usize).collect();
    format!("{prefix}-{truncated}")
}

/// Classification of a terminal vs. still-running backend call outcome
/// (spec §4.10 step 5).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RpcOutcome {
    /// The RPC may still be running on the backend; the `BeingCreated`
    /// sentinel must be left in place.
    StillRunning,
    /// The backend gave a definitive answer, success or failure.
    Terminal,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_uid_kept_when_length_negative() {
        assert_eq!(
            derive_snapshot_name("snapshot", "abcd-1234-xyz", -1),
            "snapshot-abcd-1234-xyz"
        );
    }

    #[test]
    fn truncates_stripped_uid_to_length() {
        assert_eq!(derive_snapshot_name("snapshot", "abcd-1234", 4), "snapshot-abcd");
    }
}
