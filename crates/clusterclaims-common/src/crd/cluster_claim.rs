//! Hive ClusterClaim
//!
//! A ClusterClaim checks a cluster out of a ClusterPool. Hive fills
//! `spec.namespace` with the name of the assigned cluster once the claim is
//! bound; until then the field is absent or empty.

use k8s_openapi::api::rbac::v1::Subject;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::CustomResource;
use serde::{Deserialize, Serialize};

/// Desired state of a ClusterClaim
///
/// Example:
/// ```yaml
/// apiVersion: hive.openshift.io/v1
/// kind: ClusterClaim
/// metadata:
///   name: my-clusterclaim
///   namespace: my-pool
///   labels:
///     usage: production
/// spec:
///   clusterPoolName: make-believe
///   namespace: cluster01
/// ```
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[kube(
    group = "hive.openshift.io",
    version = "v1",
    kind = "ClusterClaim",
    namespaced,
    status = "ClusterClaimStatus",
    schema = "disabled",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterClaimSpec {
    /// Pool the cluster is claimed from
    pub cluster_pool_name: String,

    /// Users and groups granted access to the claimed cluster
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subjects: Vec<Subject>,

    /// Name of the assigned cluster (also its namespace); set by Hive
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// How long the claim may hold the cluster, as a Go duration string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lifetime: Option<String>,
}

/// Observed state of a ClusterClaim
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterClaimStatus {
    /// Latest observations of the claim's state
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<ClaimCondition>,

    /// Effective lifetime once the claim is bound
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lifetime: Option<String>,
}

/// A single ClusterClaim condition
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClaimCondition {
    /// Condition type (e.g. "Pending", "ClusterRunning")
    #[serde(rename = "type")]
    pub type_: String,

    /// "True", "False" or "Unknown"
    pub status: String,

    /// Machine-readable reason for the last transition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable detail
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// When the condition last changed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<Time>,
}

impl ClusterClaim {
    /// Name of the cluster bound to this claim, or None while the claim is pending
    pub fn target_cluster(&self) -> Option<&str> {
        self.spec.namespace.as_deref().filter(|name| !name.is_empty())
    }
}
