//! CSI-over-gRPC backend handler.
//!
//! The CSI wire protocol itself is out of scope for this crate (spec §1):
//! the generated protobuf stubs a real deployment links against come from
//! `tonic-build` processing the upstream `csi.proto`, which is not part of
//! this repository. [`CsiRpcClient`] is the narrow seam a real client would
//! implement against those generated types; [`GrpcSnapshotHandler`] only
//! owns the timeout/retry-classification policy layered on top of it.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use tonic::Code;

use crate::error::{Error, Result};
use crate::handler::{
    CreateGroupSnapshotResponse, CreateSnapshotResponse, GroupSnapshotStatusResponse, RpcOutcome,
    SnapshotHandler, SnapshotStatusResponse,
};

/// The raw six CSI-adjacent RPCs, independent of wire encoding. A real
/// deployment implements this over `tonic-build`-generated CSI client
/// stubs; the default mock used by `csi-snapshot-sidecar` talks to nothing
/// and always returns `Unimplemented`.
#[async_trait]
pub trait CsiRpcClient: Send + Sync {
    async fn create_snapshot(
        &self,
        snapshot_name: &str,
        volume_handle: &str,
        parameters: &BTreeMap<String, String>,
        secrets: &BTreeMap<String, String>,
        timeout: Duration,
    ) -> std::result::Result<CreateSnapshotResponse, tonic::Status>;

    async fn delete_snapshot(
        &self,
        snapshot_id: &str,
        secrets: &BTreeMap<String, String>,
        timeout: Duration,
    ) -> std::result::Result<(), tonic::Status>;

    async fn get_snapshot_status(
        &self,
        snapshot_id: &str,
        secrets: &BTreeMap<String, String>,
        timeout: Duration,
    ) -> std::result::Result<SnapshotStatusResponse, tonic::Status>;

    async fn create_group_snapshot(
        &self,
        group_snapshot_name: &str,
        volume_handles: &[String],
        member_snapshot_names: &[String],
        parameters: &BTreeMap<String, String>,
        secrets: &BTreeMap<String, String>,
        timeout: Duration,
    ) -> std::result::Result<CreateGroupSnapshotResponse, tonic::Status>;

    async fn delete_group_snapshot(
        &self,
        group_snapshot_id: &str,
        member_snapshot_ids: &[String],
        secrets: &BTreeMap<String, String>,
        timeout: Duration,
    ) -> std::result::Result<(), tonic::Status>;

    async fn get_group_snapshot_status(
        &self,
        group_snapshot_id: &str,
        member_snapshot_ids: &[String],
        secrets: &BTreeMap<String, String>,
        timeout: Duration,
    ) -> std::result::Result<GroupSnapshotStatusResponse, tonic::Status>;
}

/// Classify a gRPC outcome as still-running vs. terminal (spec §4.10 step 5).
/// Only a specific set of codes mean "the backend may still be working on
/// this"; everything else, success included, is terminal.
pub fn classify_tonic_status(status: &tonic::Status) -> RpcOutcome {
    match status.code() {
        Code::Cancelled
        | Code::DeadlineExceeded
        | Code::Unavailable
        | Code::ResourceExhausted
        | Code::Aborted => RpcOutcome::StillRunning,
        _ => RpcOutcome::Terminal,
    }
}

fn map_status(status: tonic::Status) -> Error {
    match classify_tonic_status(&status) {
        RpcOutcome::StillRunning => Error::BackendTransient(status.to_string()),
        RpcOutcome::Terminal => Error::BackendTerminal(status.to_string()),
    }
}

/// Stand-in [`CsiRpcClient`] for deployments that haven't wired in a real
/// `tonic-build`-generated CSI client yet. Every call returns `Unimplemented`,
/// which `classify_tonic_status` treats as terminal, so the sidecar reports
/// a clean failure instead of hanging.
#[derive(Clone, Copy, Debug, Default)]
pub struct UnimplementedCsiClient;

#[async_trait]
impl CsiRpcClient for UnimplementedCsiClient {
    async fn create_snapshot(
        &self,
        _snapshot_name: &str,
        _volume_handle: &str,
        _parameters: &BTreeMap<String, String>,
        _secrets: &BTreeMap<String, String>,
        _timeout: Duration,
    ) -> std::result::Result<CreateSnapshotResponse, tonic::Status> {
        Err(tonic::Status::unimplemented("no CSI client wired"))
    }

    async fn delete_snapshot(
        &self,
        _snapshot_id: &str,
        _secrets: &BTreeMap<String, String>,
        _timeout: Duration,
    ) -> std::result::Result<(), tonic::Status> {
        Err(tonic::Status::unimplemented("no CSI client wired"))
    }

    async fn get_snapshot_status(
        &self,
        _snapshot_id: &str,
        _secrets: &BTreeMap<String, String>,
        _timeout: Duration,
    ) -> std::result::Result<SnapshotStatusResponse, tonic::Status> {
        Err(tonic::Status::unimplemented("no CSI client wired"))
    }

    async fn create_group_snapshot(
        &self,
        _group_snapshot_name: &str,
        _volume_handles: &[String],
        _member_snapshot_names: &[String],
        _parameters: &BTreeMap<String, String>,
        _secrets: &BTreeMap<String, String>,
        _timeout: Duration,
    ) -> std::result::Result<CreateGroupSnapshotResponse, tonic::Status> {
        Err(tonic::Status::unimplemented("no CSI client wired"))
    }

    async fn delete_group_snapshot(
        &self,
        _group_snapshot_id: &str,
        _member_snapshot_ids: &[String],
        _secrets: &BTreeMap<String, String>,
        _timeout: Duration,
    ) -> std::result::Result<(), tonic::Status> {
        Err(tonic::Status::unimplemented("no CSI client wired"))
    }

    async fn get_group_snapshot_status(
        &self,
        _group_snapshot_id: &str,
        _member_snapshot_ids: &[String],
        _secrets: &BTreeMap<String, String>,
        _timeout: Duration,
    ) -> std::result::Result<GroupSnapshotStatusResponse, tonic::Status> {
        Err(tonic::Status::unimplemented("no CSI client wired"))
    }
}

pub struct GrpcSnapshotHandler<C: CsiRpcClient> {
    client: C,
    timeout: Duration,
}

impl<C: CsiRpcClient> GrpcSnapshotHandler<C> {
    pub fn new(client: C, timeout: Duration) -> Self {
        GrpcSnapshotHandler { client, timeout }
    }
}

#[async_trait]
impl<C: CsiRpcClient> SnapshotHandler for GrpcSnapshotHandler<C> {
    async fn create_snapshot(
        &self,
        snapshot_name: &str,
        volume_handle: &str,
        parameters: &BTreeMap<String, String>,
        secrets: &BTreeMap<String, String>,
    ) -> Result<CreateSnapshotResponse> {
        self.client
            .create_snapshot(snapshot_name, volume_handle, parameters, secrets, self.timeout)
            .await
            .map_err(map_status)
    }

    async fn delete_snapshot(
        &self,
        snapshot_id: &str,
        secrets: &BTreeMap<String, String>,
    ) -> Result<()> {
        self.client
            .delete_snapshot(snapshot_id, secrets, self.timeout)
            .await
            .map_err(map_status)
    }

    async fn get_snapshot_status(
        &self,
        snapshot_id: &str,
        secrets: &BTreeMap<String, String>,
    ) -> Result<SnapshotStatusResponse> {
        self.client
            .get_snapshot_status(snapshot_id, secrets, self.timeout)
            .await
            .map_err(map_status)
    }

    async fn create_group_snapshot(
        &self,
        group_snapshot_name: &str,
        volume_handles: &[String],
        member_snapshot_names: &[String],
        parameters: &BTreeMap<String, String>,
        secrets: &BTreeMap<String, String>,
    ) -> Result<CreateGroupSnapshotResponse> {
        self.client
            .create_group_snapshot(
                group_snapshot_name,
                volume_handles,
                member_snapshot_names,
                parameters,
                secrets,
                self.timeout,
            )
            .await
            .map_err(map_status)
    }

    async fn delete_group_snapshot(
        &self,
        group_snapshot_id: &str,
        member_snapshot_ids: &[String],
        secrets: &BTreeMap<String, String>,
    ) -> Result<()> {
        self.client
            .delete_group_snapshot(group_snapshot_id, member_snapshot_ids, secrets, self.timeout)
            .await
            .map_err(map_status)
    }

    async fn get_group_snapshot_status(
        &self,
        group_snapshot_id: &str,
        member_snapshot_ids: &[String],
        secrets: &BTreeMap<String, String>,
    ) -> Result<GroupSnapshotStatusResponse> {
        self.client
            .get_group_snapshot_status(group_snapshot_id, member_snapshot_ids, secrets, self.timeout)
            .await
            .map_err(map_status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_is_still_running() {
        let status = tonic::Status::unavailable("backend busy");
        assert_eq!(classify_tonic_status(&status), RpcOutcome::StillRunning);
    }

    #[test]
    fn not_found_is_terminal() {
        let status = tonic::Status::not_found("no such volume");
        assert_eq!(classify_tonic_status(&status), RpcOutcome::Terminal);
    }

    #[test]
    fn ok_is_terminal() {
        let status = tonic::Status::ok("done");
        assert_eq!(classify_tonic_status(&status), RpcOutcome::Terminal);
    }
}
