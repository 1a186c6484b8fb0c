//! Open Cluster Management KlusterletAddonConfig
//!
//! Per-cluster add-on configuration. Lives in the cluster's own namespace and
//! carries the labels propagated to the cluster's klusterlet.

use std::collections::BTreeMap;

use kube::CustomResource;
use serde::{Deserialize, Serialize};

/// Desired state of a KlusterletAddonConfig
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[kube(
    group = "agent.open-cluster-management.io",
    version = "v1",
    kind = "KlusterletAddonConfig",
    namespaced,
    schema = "disabled",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct KlusterletAddonConfigSpec {
    /// Name of the managed cluster
    #[serde(default)]
    pub cluster_name: String,

    /// Namespace of the managed cluster on the hub
    #[serde(default)]
    pub cluster_namespace: String,

    /// Labels propagated to the managed cluster
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub cluster_labels: BTreeMap<String, String>,

    /// Application lifecycle add-on
    #[serde(default)]
    pub application_manager: AddonToggle,

    /// Governance policy add-on
    #[serde(default)]
    pub policy_controller: AddonToggle,

    /// Search collector add-on
    #[serde(default)]
    pub search_collector: AddonToggle,

    /// Certificate policy add-on
    #[serde(default)]
    pub cert_policy_controller: AddonToggle,

    /// IAM policy add-on
    #[serde(default)]
    pub iam_policy_controller: AddonToggle,

    /// Add-on release version
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
}

/// Enable switch for a single add-on
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct AddonToggle {
    /// Whether the add-on is deployed to the cluster
    #[serde(default)]
    pub enabled: bool,
}

impl AddonToggle {
    /// Toggle with the given state
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }
}
