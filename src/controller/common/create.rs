//! `createSnapshotOperation`, the full dynamic-provisioning path (spec §4.8).

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{PatchParams, PostParams};
use kube::runtime::events::{Event, EventType};
use kube::ResourceExt;

use crate::controller::common::{bind, class, ensure_finalizer};
use crate::controller::Context;
use crate::error::{Error, Result};
use crate::handler::{derive_snapshot_name, CreateSnapshotResponse};
use crate::scheduler::create_operation_name;
use crate::secret::{self, SecretReference, TemplateContext};
use crate::store::{object_key, status_patch};
use crate::types::{
    VolumeSnapshot, VolumeSnapshotClass, VolumeSnapshotContent, VolumeSnapshotContentSource,
    VolumeSnapshotContentSpec, VolumeSnapshotContentStatus, VolumeSnapshotRef, VolumeSnapshotStatus,
    ANN_DELETION_SECRET_NAME, ANN_DELETION_SECRET_NAMESPACE, PVC_AS_SOURCE_PROTECTION_FINALIZER,
};

pub async fn create_snapshot_operation(vs: &VolumeSnapshot, ctx: &Context) -> Result<()> {
    let namespace = vs.namespace().unwrap_or_default();
    let uid = vs.uid().unwrap_or_default();
    let key = object_key(Some(&namespace), &vs.name_any());
    let gate_name = create_operation_name(&key, &uid);

    let scheduler = ctx.scheduler.clone();
    let vs = vs.clone();
    let ctx = ctx.clone();
    let result = scheduler
        .run(&gate_name, async move { do_create(&vs, &ctx).await })
        .await;
    // Driver isn't resolved yet at this point (class lookup happens inside
    // `do_create`), so the gate-reject path labels the metric with an
    // empty driver rather than paying for an extra class fetch just to name it.
    if matches!(result, Err(Error::AlreadyRunning(_)) | Err(Error::Backoff(_))) {
        crate::metrics::drop_operation("", crate::metrics::OPERATION_CREATE_SNAPSHOT);
    }
    result
}

async fn do_create(vs: &VolumeSnapshot, ctx: &Context) -> Result<()> {
    let namespace = vs.namespace().unwrap_or_default();
    let pvc_name = vs
        .spec
        .source
        .persistent_volume_claim_name
        .clone()
        .unwrap_or_default();
    let uid = vs.uid().unwrap_or_default();

    let pvc_api = kube::Api::<k8s_openapi::api::core::v1::PersistentVolumeClaim>::namespaced(
        ctx.client.clone(),
        &namespace,
    );
    if let Some(pvc) = pvc_api.get_opt(&pvc_name).await? {
        ensure_finalizer(&pvc_api, &pvc, PVC_AS_SOURCE_PROTECTION_FINALIZER).await?;
    }

    let (volume_handle, provisioner) = class::resolve_source_pv(ctx, &namespace, &pvc_name).await?;
    let class = match &vs.spec.volume_snapshot_class_name {
        Some(name) => class::resolve_class(ctx, name).await?,
        None => class::resolve_default_class_for_driver(ctx, &provisioner).await?,
    };

    let content_name = format!("snapcontent-{uid}");
    let tmpl_ctx = TemplateContext::for_create(vs, &content_name);
    let secret_ref = secret::resolve_secret_reference(
        &class.parameters,
        secret::SNAPSHOTTER_SECRET_NAME_PARAM,
        secret::SNAPSHOTTER_SECRET_NAMESPACE_PARAM,
        &tmpl_ctx,
    )?;
    let creds = match &secret_ref {
        Some(r) => secret::fetch_credentials(&ctx.client, r).await?,
        None => Default::default(),
    };

    let snapshot_name = derive_snapshot_name(
        &ctx.config.snapshot_name_prefix,
        &uid,
        ctx.config.snapshot_name_uuid_length,
    );
    let response = ctx
        .handler
        .create_snapshot(&snapshot_name, &volume_handle, &class.parameters, &creds)
        .await?;
    if response.driver != class.driver {
        return Err(Error::DriverMismatch {
            expected: class.driver.clone(),
            actual: response.driver.clone(),
        });
    }

    update_vs_status_with_retry(vs, ctx, &response).await?;

    let content = build_content(vs, &class, &content_name, &volume_handle, &response, &secret_ref);
    match create_content_with_retry(ctx, &content).await {
        Ok(()) => {}
        Err(e) => {
            ctx.recorder_for(vs)
                .publish(Event {
                    type_: EventType::Warning,
                    reason: "CreateSnapshotContentFailed".into(),
                    note: Some(e.to_string()),
                    action: "Creating".into(),
                    secondary: None,
                })
                .await
                .ok();
            return Err(Error::ControllerUpdateFailed(content_name, e.to_string()));
        }
    }

    bind::bind_and_update_volume_snapshot(&content, vs, ctx).await
}

async fn update_vs_status_with_retry(
    vs: &VolumeSnapshot,
    ctx: &Context,
    response: &CreateSnapshotResponse,
) -> Result<()> {
    let intended = VolumeSnapshotStatus {
        ready_to_use: Some(response.ready_to_use),
        restore_size: Some(response.size_bytes.to_string()),
        ..vs.status.clone().unwrap_or_default()
    };
    let api = ctx.vs_api(&vs.namespace().unwrap_or_default());
    let mut attempts = 0;
    loop {
        let Some(patch) = status_patch(&vs.status, &intended) else {
            return Ok(());
        };
        match api.patch_status(&vs.name_any(), &PatchParams::default(), &patch).await {
            Ok(_) => return Ok(()),
            Err(e) if attempts < ctx.config.create_snapshotcontent_retry_count => {
                attempts += 1;
                tracing::warn!(error = %e, attempts, "retrying VolumeSnapshot status patch");
                tokio::time::sleep(ctx.config.create_snapshotcontent_retry_interval).await;
            }
            Err(e) => return Err(Error::KubeError(e)),
        }
    }
}

fn build_content(
    vs: &VolumeSnapshot,
    class: &VolumeSnapshotClass,
    content_name: &str,
    volume_handle: &str,
    response: &CreateSnapshotResponse,
    secret_ref: &Option<SecretReference>,
) -> VolumeSnapshotContent {
    let annotations = secret_ref.as_ref().map(|r| {
        [
            (ANN_DELETION_SECRET_NAME.to_string(), r.name.clone()),
            (ANN_DELETION_SECRET_NAMESPACE.to_string(), r.namespace.clone()),
        ]
        .into_iter()
        .collect()
    });

    VolumeSnapshotContent {
        metadata: ObjectMeta {
            name: Some(content_name.to_string()),
            annotations,
            ..Default::default()
        },
        spec: VolumeSnapshotContentSpec {
            volume_snapshot_ref: VolumeSnapshotRef {
                name: vs.name_any(),
                namespace: vs.namespace().unwrap_or_default(),
                uid: vs.uid().unwrap_or_default(),
            },
            source: VolumeSnapshotContentSource {
                volume_handle: Some(volume_handle.to_string()),
                snapshot_handle: None,
            },
            driver: response.driver.clone(),
            deletion_policy: class.deletion_policy,
            volume_snapshot_class_name: class.name().map(str::to_string),
        },
        status: Some(VolumeSnapshotContentStatus {
            snapshot_handle: Some(response.snapshot_id.clone()),
            creation_time: Some(response.creation_time_ns),
            restore_size: Some(response.size_bytes),
            ready_to_use: Some(response.ready_to_use),
            error: None,
            volume_group_snapshot_handle: None,
        }),
    }
}

async fn create_content_with_retry(ctx: &Context, content: &VolumeSnapshotContent) -> Result<()> {
    let api = ctx.vsc_api();
    let name = content.name_any();
    let mut attempts = 0;
    loop {
        match api.create(&PostParams::default(), content).await {
            Ok(_) => return Ok(()),
            Err(kube::Error::Api(e)) if e.code == 409 => return Ok(()), // AlreadyExists: reuse.
            Err(e) if attempts < ctx.config.create_snapshotcontent_retry_count => {
                attempts += 1;
                tracing::warn!(error = %e, attempts, content = %name, "retrying VolumeSnapshotContent create");
                tokio::time::sleep(ctx.config.create_snapshotcontent_retry_interval).await;
            }
            Err(e) => return Err(Error::KubeError(e)),
        }
    }
}
