//! Operator wiring for the clusterclaims controller

#![deny(missing_docs)]

/// Command-line and environment configuration
pub mod config;
/// ClusterClaim controller construction
pub mod controller_runner;
/// Liveness and readiness endpoints
pub mod health;
