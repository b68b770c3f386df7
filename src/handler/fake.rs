//! In-process fake backend handler (spec §9 "polymorphism over backends").
//!
//! Records every call it receives and returns canned or computed responses,
//! without touching any network. Used by the controller unit tests in
//! `crate::controller`.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::handler::{
    CreateGroupSnapshotResponse, CreateSnapshotResponse, GroupSnapshotStatusResponse,
    SnapshotHandler, SnapshotStatusResponse,
};

#[derive(Clone, Debug, PartialEq)]
pub enum RecordedCall {
    CreateSnapshot { name: String, volume_handle: String },
    DeleteSnapshot { snapshot_id: String },
    GetSnapshotStatus { snapshot_id: String },
    CreateGroupSnapshot { name: String, volume_handles: Vec<String>, member_names: Vec<String> },
    DeleteGroupSnapshot { group_snapshot_id: String },
    GetGroupSnapshotStatus { group_snapshot_id: String },
}

/// A handler that always succeeds with a deterministic synthesized
/// response, or fails every call with a fixed error if `fail_with` is set.
/// `driver` is echoed back verbatim in create responses.
pub struct FakeHandler {
    pub driver: String,
    calls: Mutex<Vec<RecordedCall>>,
    fail_with: Option<Error>,
}

impl FakeHandler {
    pub fn new(driver: impl Into<String>) -> Self {
        FakeHandler {
            driver: driver.into(),
            calls: Mutex::new(Vec::new()),
            fail_with: None,
        }
    }

    pub fn failing(driver: impl Into<String>, err: Error) -> Self {
        FakeHandler {
            driver: driver.into(),
            calls: Mutex::new(Vec::new()),
            fail_with: Some(err),
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: RecordedCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn maybe_fail(&self) -> Result<()> {
        match &self.fail_with {
            Some(Error::BackendTransient(m)) => Err(Error::BackendTransient(m.clone())),
            Some(Error::BackendTerminal(m)) => Err(Error::BackendTerminal(m.clone())),
            Some(other) => Err(Error::Other(other.to_string())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl SnapshotHandler for FakeHandler {
    async fn create_snapshot(
        &self,
        snapshot_name: &str,
        volume_handle: &str,
        _parameters: &BTreeMap<String, String>,
        _secrets: &BTreeMap<String, String>,
    ) -> Result<CreateSnapshotResponse> {
        self.record(RecordedCall::CreateSnapshot {
            name: snapshot_name.to_string(),
            volume_handle: volume_handle.to_string(),
        });
        self.maybe_fail()?;
        Ok(CreateSnapshotResponse {
            driver: self.driver.clone(),
            snapshot_id: format!("sid-{snapshot_name}"),
            creation_time_ns: 1,
            size_bytes: 1000,
            ready_to_use: true,
        })
    }

    async fn delete_snapshot(
        &self,
        snapshot_id: &str,
        _secrets: &BTreeMap<String, String>,
    ) -> Result<()> {
        self.record(RecordedCall::DeleteSnapshot {
            snapshot_id: snapshot_id.to_string(),
        });
        self.maybe_fail()
    }

    async fn get_snapshot_status(
        &self,
        snapshot_id: &str,
        _secrets: &BTreeMap<String, String>,
    ) -> Result<SnapshotStatusResponse> {
        self.record(RecordedCall::GetSnapshotStatus {
            snapshot_id: snapshot_id.to_string(),
        });
        self.maybe_fail()?;
        Ok(SnapshotStatusResponse {
            ready_to_use: true,
            creation_time_ns: 1,
            size_bytes: 1000,
            group_snapshot_id: None,
        })
    }

    async fn create_group_snapshot(
        &self,
        group_snapshot_name: &str,
        volume_handles: &[String],
        member_snapshot_names: &[String],
        _parameters: &BTreeMap<String, String>,
        _secrets: &BTreeMap<String, String>,
    ) -> Result<CreateGroupSnapshotResponse> {
        self.record(RecordedCall::CreateGroupSnapshot {
            name: group_snapshot_name.to_string(),
            volume_handles: volume_handles.to_vec(),
            member_names: member_snapshot_names.to_vec(),
        });
        self.maybe_fail()?;
        let members = member_snapshot_names
            .iter()
            .map(|name| CreateSnapshotResponse {
                driver: self.driver.clone(),
                snapshot_id: format!("sid-{name}"),
                creation_time_ns: 1,
                size_bytes: 1000,
                ready_to_use: true,
            })
            .collect();
        Ok(CreateGroupSnapshotResponse {
            driver: self.driver.clone(),
            group_snapshot_id: format!("gsid-{group_snapshot_name}"),
            creation_time_ns: 1,
            ready_to_use: true,
            members,
        })
    }

    async fn delete_group_snapshot(
        &self,
        group_snapshot_id: &str,
        _member_snapshot_ids: &[String],
        _secrets: &BTreeMap<String, String>,
    ) -> Result<()> {
        self.record(RecordedCall::DeleteGroupSnapshot {
            group_snapshot_id: group_snapshot_id.to_string(),
        });
        self.maybe_fail()
    }

    async fn get_group_snapshot_status(
        &self,
        group_snapshot_id: &str,
        member_snapshot_ids: &[String],
        _secrets: &BTreeMap<String, String>,
    ) -> Result<GroupSnapshotStatusResponse> {
        self.record(RecordedCall::GetGroupSnapshotStatus {
            group_snapshot_id: group_snapshot_id.to_string(),
        });
        self.maybe_fail()?;
        Ok(GroupSnapshotStatusResponse {
            ready_to_use: true,
            creation_time_ns: 1,
            members: member_snapshot_ids
                .iter()
                .map(|_| SnapshotStatusResponse {
                    ready_to_use: true,
                    creation_time_ns: 1,
                    size_bytes: 1000,
                    group_snapshot_id: Some(group_snapshot_id.to_string()),
                })
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_create_call() {
        let handler = FakeHandler::new("mock.csi.k8s.io");
        handler
            .create_snapshot("snap-1", "vol-1", &BTreeMap::new(), &BTreeMap::new())
            .await
            .unwrap();
        assert_eq!(
            handler.calls(),
            vec![RecordedCall::CreateSnapshot {
                name: "snap-1".to_string(),
                volume_handle: "vol-1".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn failing_handler_still_records_the_call() {
        let handler = FakeHandler::failing(
            "mock.csi.k8s.io",
            Error::BackendTransient("unavailable".to_string()),
        );
        let err = handler
            .create_snapshot("snap-1", "vol-1", &BTreeMap::new(), &BTreeMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BackendTransient(_)));
        assert_eq!(handler.calls().len(), 1);
    }
}
