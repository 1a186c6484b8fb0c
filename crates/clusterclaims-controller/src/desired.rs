//! Desired downstream records for a bound claim
//!
//! Pure functions from a ClusterClaim to the ManagedCluster and
//! KlusterletAddonConfig that should exist for its cluster.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;

use clusterclaims_common::crd::{
    AddonToggle, ClusterClaim, KlusterletAddonConfig, KlusterletAddonConfigSpec, ManagedCluster,
    ManagedClusterSpec,
};
use clusterclaims_common::{NAME_LABEL_KEY, VENDOR_LABEL_KEY, VENDOR_OPENSHIFT};

/// Add-on release written to new KlusterletAddonConfigs by default
pub const DEFAULT_ADDON_VERSION: &str = "2.2.0";

/// Klusterlet add-ons that can be switched on or off per cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Addon {
    /// Application lifecycle manager
    ApplicationManager,
    /// Governance policy controller
    PolicyController,
    /// Search collector
    SearchCollector,
    /// Certificate policy controller
    CertPolicyController,
    /// IAM policy controller
    IamPolicyController,
}

impl Addon {
    /// All add-ons, in field order
    pub const ALL: [Addon; 5] = [
        Addon::ApplicationManager,
        Addon::PolicyController,
        Addon::SearchCollector,
        Addon::CertPolicyController,
        Addon::IamPolicyController,
    ];

    /// Field name in the KlusterletAddonConfig
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ApplicationManager => "applicationManager",
            Self::PolicyController => "policyController",
            Self::SearchCollector => "searchCollector",
            Self::CertPolicyController => "certPolicyController",
            Self::IamPolicyController => "iamPolicyController",
        }
    }
}

impl fmt::Display for Addon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Addon {
    type Err = String;

    /// Accepts the KlusterletAddonConfig field name in any case, with or without `-`/`_`
    /// separators (`applicationManager`, `application-manager`, ...)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .collect::<String>()
            .to_ascii_lowercase();
        Addon::ALL
            .into_iter()
            .find(|addon| addon.as_str().to_ascii_lowercase() == normalized)
            .ok_or_else(|| format!("unknown add-on '{}'", s))
    }
}

/// Add-on settings applied to every KlusterletAddonConfig this controller creates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddonSettings {
    /// Value of `spec.version`
    pub version: String,
    /// Add-ons created with `enabled: false`
    pub disabled: BTreeSet<Addon>,
}

impl Default for AddonSettings {
    fn default() -> Self {
        Self {
            version: DEFAULT_ADDON_VERSION.to_string(),
            disabled: BTreeSet::new(),
        }
    }
}

impl AddonSettings {
    fn toggle(&self, addon: Addon) -> AddonToggle {
        AddonToggle::new(!self.disabled.contains(&addon))
    }
}

/// Labels for a new ManagedCluster
///
/// Claim labels are copied first; `name` and `vendor` are then set to the
/// claim name and OpenShift, overriding any claim label with the same key.
pub fn registration_labels(claim: &ClusterClaim) -> BTreeMap<String, String> {
    let mut labels = claim.labels().clone();
    labels.insert(NAME_LABEL_KEY.to_string(), claim.name_any());
    labels.insert(VENDOR_LABEL_KEY.to_string(), VENDOR_OPENSHIFT.to_string());
    labels
}

/// ManagedCluster registering `cluster_name` with the hub
pub fn managed_cluster(claim: &ClusterClaim, cluster_name: &str) -> ManagedCluster {
    ManagedCluster {
        metadata: ObjectMeta {
            name: Some(cluster_name.to_string()),
            labels: Some(registration_labels(claim)),
            ..Default::default()
        },
        spec: ManagedClusterSpec {
            hub_accepts_client: true,
            ..Default::default()
        },
    }
}

/// KlusterletAddonConfig for `cluster_name`, living in the cluster's namespace
///
/// `cluster_labels` is the label set of the cluster's ManagedCluster.
pub fn addon_config(
    cluster_name: &str,
    cluster_labels: &BTreeMap<String, String>,
    addons: &AddonSettings,
) -> KlusterletAddonConfig {
    KlusterletAddonConfig {
        metadata: ObjectMeta {
            name: Some(cluster_name.to_string()),
            namespace: Some(cluster_name.to_string()),
            ..Default::default()
        },
        spec: KlusterletAddonConfigSpec {
            cluster_name: cluster_name.to_string(),
            cluster_namespace: cluster_name.to_string(),
            cluster_labels: cluster_labels.clone(),
            application_manager: addons.toggle(Addon::ApplicationManager),
            policy_controller: addons.toggle(Addon::PolicyController),
            search_collector: addons.toggle(Addon::SearchCollector),
            cert_policy_controller: addons.toggle(Addon::CertPolicyController),
            iam_policy_controller: addons.toggle(Addon::IamPolicyController),
            version: addons.version.clone(),
        },
    }
}
