//! ClusterClaim lifecycle management
//!
//! This crate provides the Kubernetes controller for Hive ClusterClaims. For
//! every bound claim it creates the cluster's ManagedCluster and
//! KlusterletAddonConfig, and removes them once the claim is deleted.
//!
//! Related crates:
//! - `clusterclaims-common`: record types, errors, kind registry, telemetry
//! - `clusterclaims-operator`: the binary running this controller

#![deny(missing_docs)]

pub mod controller;
pub mod desired;
pub mod store;

pub use controller::{
    error_policy, reconcile, ClaimReconciler, Context, ContextBuilder, ControllerSettings, Ensure,
    ReconcileOutcome, ReconcileRequest, Teardown,
};
pub use desired::{Addon, AddonSettings};
pub use store::{KubeStore, ObjectKey, ObjectStore};

pub use clusterclaims_common::{Error, Result};
