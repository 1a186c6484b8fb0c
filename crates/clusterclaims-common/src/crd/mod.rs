//! Record types watched and written by the clusterclaims controller
//!
//! None of these schemas are owned here: ClusterClaim belongs to Hive,
//! ManagedCluster and KlusterletAddonConfig to Open Cluster Management. The
//! types carry only the fields this controller reads or writes, and schema
//! generation is disabled for all of them.

mod cluster_claim;
mod klusterlet_addon_config;
mod managed_cluster;

pub use cluster_claim::{
    ClaimCondition, ClusterClaim, ClusterClaimSpec, ClusterClaimStatus,
};
pub use klusterlet_addon_config::{
    AddonToggle, KlusterletAddonConfig, KlusterletAddonConfigSpec,
};
pub use managed_cluster::{ClientConfig, ManagedCluster, ManagedClusterSpec};

use kube::Resource;

/// Deletion-marker inspection shared by every record kind
pub trait Terminating {
    /// True once deletion has been requested but finalizers are still pending
    fn is_terminating(&self) -> bool;
}

impl<K: Resource> Terminating for K {
    fn is_terminating(&self) -> bool {
        self.meta().deletion_timestamp.is_some()
    }
}
