//! clusterclaims operator - registers clusters checked out of Hive pools

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use kube::Client;

use clusterclaims_common::leader_election::LeaderElector;
use clusterclaims_common::telemetry::init_telemetry;
use clusterclaims_common::KindRegistry;
use clusterclaims_operator::config::OperatorConfig;
use clusterclaims_operator::controller_runner::build_claim_controller;
use clusterclaims_operator::health;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = OperatorConfig::parse();
    init_telemetry(config.telemetry_config())?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting clusterclaims controller"
    );

    let client = Client::try_default().await?;

    let registry = Arc::new(KindRegistry::discover(client.clone()).await);
    for kind in registry.missing() {
        tracing::warn!(
            kind = kind.kind_str(),
            group = kind.group(),
            "CRD not installed, reconciles touching it will fail until it is"
        );
    }

    let ready = Arc::new(AtomicBool::new(false));
    let health_addr = config.health_addr;
    let health_ready = ready.clone();
    let health_server = tokio::spawn(async move {
        if let Err(e) = health::serve(health_addr, health_ready).await {
            tracing::error!(error = %e, "Health server failed");
        }
    });

    let controller = build_claim_controller(
        client.clone(),
        registry,
        config.controller_settings(),
    );

    let result = if config.enable_leader_election {
        let elector = Arc::new(LeaderElector::new(
            client,
            &config.leader_election_id,
            &config.leader_election_namespace,
            &config.leader_identity(),
        ));
        let mut guard = elector.acquire().await?;
        ready.store(true, Ordering::SeqCst);

        let lost = tokio::select! {
            _ = controller => false,
            _ = guard.lost() => true,
        };

        if lost {
            tracing::error!("Leadership lost, exiting so a standby can take over");
            Err(anyhow::anyhow!("leader lease lost"))
        } else {
            tracing::info!("Controller stopped, releasing leadership");
            if let Err(e) = guard.release_leadership().await {
                tracing::warn!(error = %e, "Failed to release leader lease");
            }
            Ok(())
        }
    } else {
        ready.store(true, Ordering::SeqCst);
        controller.await;
        tracing::info!("Controller stopped");
        Ok(())
    };

    ready.store(false, Ordering::SeqCst);
    health_server.abort();
    result
}
