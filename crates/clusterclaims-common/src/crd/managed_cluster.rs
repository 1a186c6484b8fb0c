//! Open Cluster Management ManagedCluster
//!
//! Cluster-scoped registration of a cluster with the hub, named after the
//! cluster itself.

use kube::CustomResource;
use serde::{Deserialize, Serialize};

/// Desired state of a ManagedCluster
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[kube(
    group = "cluster.open-cluster-management.io",
    version = "v1",
    kind = "ManagedCluster",
    schema = "disabled",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct ManagedClusterSpec {
    /// Whether the hub accepts the cluster's registration agent
    #[serde(default)]
    pub hub_accepts_client: bool,

    /// Lease duration the agent must renew within, in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lease_duration_seconds: Option<i32>,

    /// API endpoints of the managed cluster
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub managed_cluster_client_configs: Vec<ClientConfig>,
}

/// Endpoint through which the hub reaches a managed cluster
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    /// API server URL
    pub url: String,

    /// PEM CA bundle, base64 encoded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_bundle: Option<String>,
}
