//! Controller runner - builds the ClusterClaim controller future
//!
//! Construction is kept apart from `main` so the caller decides how the
//! future is composed with leader election and shutdown.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::StreamExt;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client};

use clusterclaims_common::crd::ClusterClaim;
use clusterclaims_common::KindRegistry;
use clusterclaims_controller::{error_policy, reconcile, Context, ControllerSettings};

/// Watcher timeout (seconds) - must be less than client read_timeout (30s)
/// This forces the API server to close the watch before the client times out,
/// preventing "body read timed out" errors on idle watches.
const WATCH_TIMEOUT_SECS: u32 = 25;

/// Build the ClusterClaim controller future
///
/// Runs until a termination signal is received.
pub fn build_claim_controller(
    client: Client,
    registry: Arc<KindRegistry>,
    settings: ControllerSettings,
) -> Pin<Box<dyn Future<Output = ()> + Send>> {
    let ctx = Arc::new(
        Context::builder(client.clone(), registry)
            .settings(settings)
            .build(),
    );
    let claims: Api<ClusterClaim> = Api::all(client);

    tracing::info!("- ClusterClaim controller");

    Box::pin(
        Controller::new(claims, WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS))
            .shutdown_on_signal()
            .run(reconcile, error_policy, ctx)
            .for_each(log_reconcile_result("ClusterClaim")),
    )
}

/// Creates a closure for logging reconciliation results.
fn log_reconcile_result<T: std::fmt::Debug, E: std::fmt::Debug>(
    controller_name: &'static str,
) -> impl Fn(Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(action) => tracing::debug!(?action, "{} reconciliation completed", controller_name),
            Err(e) => tracing::error!(error = ?e, "{} reconciliation error", controller_name),
        }
        std::future::ready(())
    }
}
