//! Common types for the clusterclaims controller: records, errors, and utilities

#![deny(missing_docs)]

pub mod crd;
pub mod error;
pub mod kind_registry;
pub mod leader_election;
pub mod metrics;
pub mod telemetry;

pub use error::Error;
pub use kind_registry::{KindRegistry, RecordKind, RecordType};

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Field manager recorded on every object this controller writes
pub const FIELD_MANAGER: &str = "clusterclaims-controller";

/// Namespace the controller runs in when none is configured
pub const DEFAULT_NAMESPACE: &str = "open-cluster-management";

/// Label key carrying the claim name on a ManagedCluster
pub const NAME_LABEL_KEY: &str = "name";

/// Label key carrying the cluster vendor
pub const VENDOR_LABEL_KEY: &str = "vendor";

/// Vendor value for every cluster checked out of a Hive pool
pub const VENDOR_OPENSHIFT: &str = "OpenShift";
