//! Record kind registration table
//!
//! Maps each record kind the controller touches to the API resource the
//! server actually serves for it. Built once at startup (API discovery with a
//! hard-coded fallback) and handed to the object store at construction, so
//! nothing in the reconciler depends on process-global type registration.

use std::fmt::Debug;

use dashmap::DashMap;
use kube::api::GroupVersionKind;
use kube::discovery::{ApiResource, Discovery, Scope};
use kube::{Client, Resource};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{info, warn};

use crate::crd::{ClusterClaim, KlusterletAddonConfig, ManagedCluster};

/// Record kinds read or written by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    /// ClusterClaim (hive.openshift.io)
    ClusterClaim,
    /// ManagedCluster (cluster.open-cluster-management.io)
    ManagedCluster,
    /// KlusterletAddonConfig (agent.open-cluster-management.io)
    KlusterletAddonConfig,
}

/// All RecordKind variants for iteration.
pub const ALL_RECORD_KINDS: &[RecordKind] = &[
    RecordKind::ClusterClaim,
    RecordKind::ManagedCluster,
    RecordKind::KlusterletAddonConfig,
];

impl RecordKind {
    /// API group for discovery lookup.
    pub fn group(&self) -> &'static str {
        match self {
            Self::ClusterClaim => "hive.openshift.io",
            Self::ManagedCluster => "cluster.open-cluster-management.io",
            Self::KlusterletAddonConfig => "agent.open-cluster-management.io",
        }
    }

    /// Kubernetes Kind string for discovery lookup.
    pub fn kind_str(&self) -> &'static str {
        match self {
            Self::ClusterClaim => "ClusterClaim",
            Self::ManagedCluster => "ManagedCluster",
            Self::KlusterletAddonConfig => "KlusterletAddonConfig",
        }
    }

    /// Whether objects of this kind live in a namespace.
    pub fn namespaced(&self) -> bool {
        !matches!(self, Self::ManagedCluster)
    }

    /// Hardcoded API version used when discovery fails entirely.
    fn hardcoded_version(&self) -> &'static str {
        "v1"
    }

    fn hardcoded_plural(&self) -> &'static str {
        match self {
            Self::ClusterClaim => "clusterclaims",
            Self::ManagedCluster => "managedclusters",
            Self::KlusterletAddonConfig => "klusterletaddonconfigs",
        }
    }

    fn hardcoded_api_resource(&self) -> ApiResource {
        let gvk = GroupVersionKind::gvk(self.group(), self.hardcoded_version(), self.kind_str());
        ApiResource::from_gvk_with_plural(&gvk, self.hardcoded_plural())
    }
}

/// A typed record the object store can read and write.
///
/// Ties a Rust type to its [`RecordKind`] so the store can look up the wire
/// representation in the registry.
pub trait RecordType:
    Resource<DynamicType = ()> + Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Registry key for this type
    const KIND: RecordKind;
}

impl RecordType for ClusterClaim {
    const KIND: RecordKind = RecordKind::ClusterClaim;
}

impl RecordType for ManagedCluster {
    const KIND: RecordKind = RecordKind::ManagedCluster;
}

impl RecordType for KlusterletAddonConfig {
    const KIND: RecordKind = RecordKind::KlusterletAddonConfig;
}

/// Cache of API resources for every record kind.
///
/// Created once at startup and shared via `Arc<KindRegistry>`. Uses `DashMap`
/// so resolving one missing kind doesn't block reads for the others.
pub struct KindRegistry {
    client: Option<Client>,
    entries: DashMap<RecordKind, ApiResource>,
}

impl KindRegistry {
    /// Run API discovery once and populate every known kind.
    ///
    /// Kinds whose CRD is not installed are left out and resolved lazily;
    /// if discovery itself fails, hard-coded versions are used for all kinds.
    pub async fn discover(client: Client) -> Self {
        let entries = DashMap::new();

        match Discovery::new(client.clone()).run().await {
            Ok(discovery) => {
                for kind in ALL_RECORD_KINDS {
                    if let Some(ar) = find_discovered_resource(&discovery, *kind) {
                        entries.insert(*kind, ar);
                    }
                }
                info!(
                    discovered = entries.len(),
                    total = ALL_RECORD_KINDS.len(),
                    "Kind registry populated via API discovery"
                );
            }
            Err(e) => {
                warn!(error = %e, "API discovery failed, falling back to hardcoded versions");
                for kind in ALL_RECORD_KINDS {
                    entries.insert(*kind, kind.hardcoded_api_resource());
                }
            }
        }

        Self {
            client: Some(client),
            entries,
        }
    }

    /// Registry with hard-coded API versions for every kind and no discovery client.
    pub fn hardcoded_defaults() -> Self {
        let entries = DashMap::new();
        for kind in ALL_RECORD_KINDS {
            entries.insert(*kind, kind.hardcoded_api_resource());
        }
        Self {
            client: None,
            entries,
        }
    }

    /// Kinds that are currently missing from the registry.
    pub fn missing(&self) -> Vec<RecordKind> {
        ALL_RECORD_KINDS
            .iter()
            .copied()
            .filter(|kind| !self.entries.contains_key(kind))
            .collect()
    }

    /// Get the API resource for a kind, re-running discovery if it was missing.
    ///
    /// Returns `None` only if the CRD is genuinely not installed after
    /// re-discovery (or there is no client to discover with).
    pub async fn resolve(&self, kind: RecordKind) -> Option<ApiResource> {
        if let Some(ar) = self.entries.get(&kind) {
            return Some(ar.clone());
        }

        info!(
            kind = kind.kind_str(),
            group = kind.group(),
            "Kind missing at startup, attempting lazy discovery"
        );

        self.rediscover().await;
        self.entries.get(&kind).map(|r| r.clone())
    }

    /// Re-run API discovery and populate any newly-installed kinds.
    ///
    /// Existing entries are never overwritten.
    async fn rediscover(&self) {
        let Some(client) = self.client.clone() else {
            return;
        };

        let discovery = match Discovery::new(client).run().await {
            Ok(d) => d,
            Err(e) => {
                warn!(error = %e, "Kind re-discovery failed");
                return;
            }
        };

        let mut newly_found = 0u32;
        for kind in ALL_RECORD_KINDS {
            if self.entries.contains_key(kind) {
                continue;
            }
            if let Some(ar) = find_discovered_resource(&discovery, *kind) {
                self.entries.insert(*kind, ar);
                newly_found += 1;
            }
        }

        if newly_found > 0 {
            info!(newly_found, "Kind re-discovery found new CRDs");
        }
    }
}

/// Look up a kind in pre-computed discovery results.
///
/// Prefers the most stable served version. A scope mismatch with what the
/// controller expects is logged but the served resource is still used.
fn find_discovered_resource(discovery: &Discovery, kind: RecordKind) -> Option<ApiResource> {
    for api_group in discovery.groups() {
        if api_group.name() != kind.group() {
            continue;
        }
        for (ar, caps) in api_group.resources_by_stability() {
            if ar.kind != kind.kind_str() {
                continue;
            }
            let namespaced = matches!(caps.scope, Scope::Namespaced);
            if namespaced != kind.namespaced() {
                warn!(
                    kind = kind.kind_str(),
                    namespaced,
                    "Served scope differs from the expected scope"
                );
            }
            info!(
                kind = kind.kind_str(),
                api_version = %ar.api_version,
                "Discovered record kind"
            );
            return Some(ar);
        }
    }
    warn!(
        group = kind.group(),
        kind = kind.kind_str(),
        "CRD not found in API discovery"
    );
    None
}
