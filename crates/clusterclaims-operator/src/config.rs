use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;

use clusterclaims_common::leader_election::DEFAULT_LEASE_NAME;
use clusterclaims_common::telemetry::{LogFormat, TelemetryConfig};
use clusterclaims_common::DEFAULT_NAMESPACE;
use clusterclaims_controller::desired::DEFAULT_ADDON_VERSION;
use clusterclaims_controller::{Addon, AddonSettings, ControllerSettings};

/// clusterclaims - registers clusters checked out of Hive pools with the hub
#[derive(Parser, Debug, Clone)]
#[command(name = "clusterclaims-operator", version, about, long_about = None)]
pub struct OperatorConfig {
    /// Address of the /healthz and /readyz listener
    #[arg(long, env = "HEALTH_ADDR", default_value = "0.0.0.0:8383")]
    pub health_addr: SocketAddr,

    /// Only run the controller while holding the leader Lease
    #[arg(long, env = "ENABLE_LEADER_ELECTION")]
    pub enable_leader_election: bool,

    /// Name of the leader Lease
    #[arg(long, env = "LEADER_ELECTION_ID", default_value = DEFAULT_LEASE_NAME)]
    pub leader_election_id: String,

    /// Namespace of the leader Lease
    #[arg(long, env = "POD_NAMESPACE", default_value = DEFAULT_NAMESPACE)]
    pub leader_election_namespace: String,

    /// Leader identity; defaults to the hostname
    #[arg(long, env = "POD_NAME")]
    pub pod_name: Option<String>,

    /// Seconds before a failed claim is reconciled again
    #[arg(long, env = "ERROR_REQUEUE_SECS", default_value_t = 5)]
    pub error_requeue_secs: u64,

    /// spec.version of new KlusterletAddonConfigs
    #[arg(long, env = "KLUSTERLET_ADDON_VERSION", default_value = DEFAULT_ADDON_VERSION)]
    pub addon_version: String,

    /// Add-on created disabled (repeatable, or a comma list in the env var)
    #[arg(long = "disable-addon", env = "DISABLED_ADDONS", value_delimiter = ',')]
    pub disabled_addons: Vec<Addon>,

    /// Log output format: json or text
    #[arg(long, env = "LOG_FORMAT", default_value = "json")]
    pub log_format: LogFormat,
}

impl OperatorConfig {
    /// Settings handed to the claim controller
    pub fn controller_settings(&self) -> ControllerSettings {
        ControllerSettings {
            error_requeue: Duration::from_secs(self.error_requeue_secs),
            addons: AddonSettings {
                version: self.addon_version.clone(),
                disabled: self.disabled_addons.iter().copied().collect(),
            },
        }
    }

    /// Telemetry setup; the OTLP endpoint comes from `OTEL_EXPORTER_OTLP_ENDPOINT`
    pub fn telemetry_config(&self) -> TelemetryConfig {
        TelemetryConfig {
            log_format: self.log_format,
            ..Default::default()
        }
    }

    /// Identity written into the leader Lease
    pub fn leader_identity(&self) -> String {
        self.pod_name
            .clone()
            .or_else(|| std::env::var("HOSTNAME").ok())
            .unwrap_or_else(|| format!("clusterclaims-controller-{}", std::process::id()))
    }
}
