//! Conversion/admission webhook entry point (spec §4.14).

use csi_snapshotter::{config::Config, telemetry, webhook, Error};
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Error> {
    let config = Config::parse();

    let env_filter = EnvFilter::builder().with_default_directive(Level::INFO.into()).from_env_lossy();
    let fmt_layer = fmt::layer().with_target(true);
    let registry = tracing_subscriber::registry().with(env_filter).with(fmt_layer);

    let otel_enabled = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok();
    if otel_enabled {
        let otel_layer = telemetry::init_telemetry(&registry);
        registry.with(otel_layer).init();
        info!("OpenTelemetry tracing initialized");
    } else {
        registry.init();
    }

    info!("Starting csi-snapshot-webhook v{}", env!("CARGO_PKG_VERSION"));

    let client = kube::Client::try_default().await.map_err(Error::KubeError)?;
    info!("Connected to Kubernetes cluster");

    webhook::run(config, client).await.map_err(|e| Error::Other(e.to_string()))?;

    telemetry::shutdown_telemetry();
    Ok(())
}
