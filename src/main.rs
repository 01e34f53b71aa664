// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::Result;
use kube::Client;
use std::sync::Arc;
use tracing::info;

use kubehoist::config::Config;
use kubehoist::helm::HelmCli;
use kubehoist::install::Installer;
use kubehoist::kubernetes::{wait_for_controller_watch_crd, ClusterStore, KindRegistry, KubeClusterStore};
use kubehoist::reconcilers::{ControllerWatchController, ControllerWatchReconciler};
use kubehoist::watchers::WatcherRegistry;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    info!("Starting kubehoist operator");

    // Load configuration
    let config = Config::from_env()?;
    info!(
        "Configuration loaded: helm_binary={}, install_timeout={:?}",
        config.helm_binary, config.install_timeout
    );

    // Create Kubernetes client
    let client = Client::try_default().await?;
    info!("Connected to Kubernetes cluster");

    // Wait for our own CRD before starting the controller
    info!("Waiting for ControllerWatch CRD to become available...");
    wait_for_controller_watch_crd(&client).await?;

    let kinds = Arc::new(KindRegistry::new());
    let store: Arc<dyn ClusterStore> = Arc::new(KubeClusterStore::new(
        client.clone(),
        kinds,
        &config.field_manager,
    ));
    let installer = Installer::new(Arc::new(HelmCli::new(&config.helm_binary)), store.clone(), &config);
    let registry = Arc::new(WatcherRegistry::new(store.clone()));

    let reconciler = ControllerWatchReconciler::new(store, installer);
    let controller = ControllerWatchController::new(client, reconciler, registry.clone(), config);

    info!("Starting controller...");
    controller.run().await?;

    info!("Controller stopped, shutting down activation watchers");
    registry.shutdown().await;
    Ok(())
}
