//! Conversion/admission HTTPS server (spec §4.14 paragraph 1).
//!
//! Certificates are hot-reloaded: a filesystem watcher on the cert and key
//! paths triggers `RustlsConfig::reload_from_pem_file` on write/create/rename
//! events, so a cert-manager rotation doesn't require a restart. Router
//! setup follows the teacher's plain `axum::Router`/`axum::serve` pattern
//! (`src/bin/ebpf-agent.rs`), adapted to axum-server for TLS termination.

use std::net::SocketAddr;
use std::path::PathBuf;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use axum_server::tls_rustls::RustlsConfig;
use kube::Client;
use notify::{Event as NotifyEvent, EventKind, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::Config;
use crate::webhook::admission;
use crate::webhook::conversion::{self, ConversionReview};

#[derive(Clone)]
struct ServerState {
    client: Client,
}

pub async fn run(config: Config, client: Client) -> anyhow::Result<()> {
    let tls_config = RustlsConfig::from_pem_file(&config.tls_cert_file, &config.tls_private_key_file).await?;
    spawn_cert_watcher(tls_config.clone(), config.tls_cert_file.clone().into(), config.tls_private_key_file.clone().into())?;

    let state = ServerState { client };
    let mut router = Router::new()
        .route("/readyz", get(readyz))
        .route("/admission", post(mutate_volume_snapshot));
    if config.enable_volume_group_snapshot_webhook {
        router = router.route("/convert", post(convert));
    }
    let router = router.with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(%addr, "webhook server listening");
    axum_server::bind_rustls(addr, tls_config).serve(router.into_make_service()).await?;
    Ok(())
}

async fn readyz() -> &'static str {
    "ok"
}

async fn convert(Json(review): Json<ConversionReview>) -> Json<ConversionReview> {
    Json(conversion::handle_review(review))
}

async fn mutate_volume_snapshot(
    State(state): State<ServerState>,
    Json(review): Json<kube::core::admission::AdmissionReview<crate::types::VolumeSnapshot>>,
) -> Json<kube::core::admission::AdmissionReview<crate::types::VolumeSnapshot>> {
    Json(admission::handle_review(review, state.client).await)
}

/// Watches the cert/key paths and reloads the live `RustlsConfig` in place
/// on any write/create/rename event. The watcher thread's events are
/// funneled onto a tokio channel so the reload itself runs on the runtime.
fn spawn_cert_watcher(tls_config: RustlsConfig, cert_path: PathBuf, key_path: PathBuf) -> anyhow::Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel();

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<NotifyEvent>| {
        if let Ok(event) = res {
            if matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                let _ = tx.send(());
            }
        }
    })?;
    watcher.watch(&cert_path, RecursiveMode::NonRecursive)?;
    watcher.watch(&key_path, RecursiveMode::NonRecursive)?;
    // Leaked deliberately: the watcher must outlive this function and there
    // is no natural owner for it in the webhook binary's lifetime.
    Box::leak(Box::new(watcher));

    tokio::spawn(async move {
        while rx.recv().await.is_some() {
            match tls_config.reload_from_pem_file(&cert_path, &key_path).await {
                Ok(()) => tracing::info!("reloaded webhook TLS certificate"),
                Err(e) => tracing::warn!(error = %e, "failed to reload webhook TLS certificate"),
            }
        }
    });

    Ok(())
}
