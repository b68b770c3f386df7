//! Command-line / environment configuration, shared across the three
//! binaries (controller, sidecar, webhook). Each binary only reads the
//! fields relevant to it; unused fields take their defaults harmlessly.

use clap::Parser;
use std::time::Duration;

/// Common controller + sidecar + webhook configuration.
#[derive(Parser, Clone, Debug)]
#[command(name = "csi-snapshotter", version, about)]
pub struct Config {
    /// Prefix used when deriving a dynamic snapshot name from a VolumeSnapshot UID.
    #[arg(long, env = "SNAPSHOT_NAME_PREFIX", default_value = "snapshot")]
    pub snapshot_name_prefix: String,

    /// Number of UID characters to keep when deriving a snapshot name.
    /// -1 means "full UID including dashes".
    #[arg(long, env = "SNAPSHOT_NAME_UUID_LENGTH", default_value_t = -1)]
    pub snapshot_name_uuid_length: i64,

    /// Prefix used when deriving a dynamic group-snapshot name.
    #[arg(long, env = "GROUP_SNAPSHOT_NAME_PREFIX", default_value = "groupsnapshot")]
    pub group_snapshot_name_prefix: String,

    /// Number of UID characters to keep when deriving a group-snapshot name.
    #[arg(long, env = "GROUP_SNAPSHOT_NAME_UUID_LENGTH", default_value_t = -1)]
    pub group_snapshot_name_uuid_length: i64,

    /// Timeout applied to every CSI RPC.
    #[arg(long, env = "CSI_TIMEOUT", value_parser = parse_duration, default_value = "1m")]
    pub timeout: Duration,

    /// Interval at which all cached keys are re-enqueued.
    #[arg(long, env = "RESYNC_PERIOD", value_parser = parse_duration, default_value = "15m")]
    pub resync_period: Duration,

    /// Number of concurrent reconciliation workers.
    #[arg(long, env = "WORKER_THREADS", default_value_t = 10)]
    pub worker_threads: usize,

    /// Attach `csi.storage.k8s.io/volumesnapshot/{name,namespace}` and the
    /// content name to CreateSnapshot parameters.
    #[arg(long, env = "EXTRA_CREATE_METADATA", default_value_t = false)]
    pub extra_create_metadata: bool,

    /// Enable leader-election (active/passive HA).
    #[arg(long, env = "LEADER_ELECTION", default_value_t = false)]
    pub leader_election: bool,

    /// Namespace used for the leader-election lease.
    #[arg(long, env = "LEADER_ELECTION_NAMESPACE", default_value = "kube-system")]
    pub leader_election_namespace: String,

    /// Number of attempts to persist a newly-created VolumeSnapshotContent.
    #[arg(long, env = "CREATE_SNAPSHOTCONTENT_RETRY_COUNT", default_value_t = 5)]
    pub create_snapshotcontent_retry_count: u32,

    /// Delay between VolumeSnapshotContent create retries.
    #[arg(
        long,
        env = "CREATE_SNAPSHOTCONTENT_RETRY_INTERVAL",
        value_parser = parse_duration,
        default_value = "1s"
    )]
    pub create_snapshotcontent_retry_interval: Duration,

    /// CSI driver name the sidecar is scoped to (sidecar-only).
    #[arg(long, env = "CSI_DRIVER_NAME", default_value = "")]
    pub driver_name: String,

    /// TLS certificate file (webhook-only).
    #[arg(long, env = "TLS_CERT_FILE", default_value = "")]
    pub tls_cert_file: String,

    /// TLS private key file (webhook-only).
    #[arg(long, env = "TLS_PRIVATE_KEY_FILE", default_value = "")]
    pub tls_private_key_file: String,

    /// Webhook HTTPS listen port (webhook-only).
    #[arg(long, env = "WEBHOOK_PORT", default_value_t = 8443)]
    pub port: u16,

    /// Enable the VolumeGroupSnapshot admission/conversion webhook (webhook-only).
    #[arg(long, env = "ENABLE_VOLUME_GROUP_SNAPSHOT_WEBHOOK", default_value_t = false)]
    pub enable_volume_group_snapshot_webhook: bool,

    /// Reject admission requests that would change a VolumeSnapshotContent's
    /// source mode (webhook-only).
    #[arg(long, env = "PREVENT_VOLUME_MODE_CONVERSION", default_value_t = true)]
    pub prevent_volume_mode_conversion: bool,
}

impl Default for Config {
    fn default() -> Self {
        // clap's Parser::parse() is for process argv; tests and library
        // callers construct a Config with sane defaults directly.
        Config {
            snapshot_name_prefix: "snapshot".to_string(),
            snapshot_name_uuid_length: -1,
            group_snapshot_name_prefix: "groupsnapshot".to_string(),
            group_snapshot_name_uuid_length: -1,
            timeout: Duration::from_secs(60),
            resync_period: Duration::from_secs(15 * 60),
            worker_threads: 10,
            extra_create_metadata: false,
            leader_election: false,
            leader_election_namespace: "kube-system".to_string(),
            create_snapshotcontent_retry_count: 5,
            create_snapshotcontent_retry_interval: Duration::from_secs(1),
            driver_name: String::new(),
            tls_cert_file: String::new(),
            tls_private_key_file: String::new(),
            port: 8443,
            enable_volume_group_snapshot_webhook: false,
            prevent_volume_mode_conversion: true,
        }
    }
}

fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    let (num, unit) = s.split_at(
        s.find(|c: char| !c.is_ascii_digit() && c != '.')
            .unwrap_or(s.len()),
    );
    let value: f64 = num.parse().map_err(|_| format!("invalid duration {s:?}"))?;
    let seconds = match unit {
        "s" | "" => value,
        "m" => value * 60.0,
        "h" => value * 3600.0,
        other => return Err(format!("unknown duration unit {other:?} in {s:?}")),
    };
    Ok(Duration::from_secs_f64(seconds))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_duration_units() {
        assert_eq!(parse_duration("1m").unwrap(), Duration::from_secs(60));
        assert_eq!(parse_duration("1.5s").unwrap(), Duration::from_secs_f64(1.5));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert!(parse_duration("1x").is_err());
    }

    #[test]
    fn default_matches_spec_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.snapshot_name_prefix, "snapshot");
        assert_eq!(cfg.snapshot_name_uuid_length, -1);
    }
}
