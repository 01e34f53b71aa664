// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! CRD availability checking utilities

use crate::constants::crd::{POLL_INTERVAL_SECS, POLL_MAX_INTERVAL_SECS};
use crate::error::Result;
use crate::types::ControllerWatch;
use kube::{discovery::Discovery, Client, Resource};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

/// Wait for the ControllerWatch CRD to become available in the cluster.
/// This uses exponential backoff starting at POLL_INTERVAL_SECS seconds.
pub async fn wait_for_controller_watch_crd(client: &Client) -> Result<()> {
    let mut interval = POLL_INTERVAL_SECS;
    let api_version = ControllerWatch::api_version(&());

    loop {
        match check_controller_watch_crd_exists(client).await {
            Ok(true) => {
                info!("ControllerWatch CRD ({}) is available", api_version);
                return Ok(());
            }
            Ok(false) => {
                info!(
                    "ControllerWatch CRD ({}) not yet available, waiting {} seconds...",
                    api_version, interval
                );
            }
            Err(e) => {
                warn!(
                    "Error checking for ControllerWatch CRD: {}, retrying in {} seconds...",
                    e, interval
                );
            }
        }

        sleep(Duration::from_secs(interval)).await;

        // Exponential backoff with max cap
        interval = (interval * 2).min(POLL_MAX_INTERVAL_SECS);
    }
}

/// Check if the ControllerWatch CRD exists by attempting to discover it.
async fn check_controller_watch_crd_exists(client: &Client) -> Result<bool> {
    let group = ControllerWatch::group(&());
    let discovery = Discovery::new(client.clone())
        .filter(&[group.as_ref()])
        .run()
        .await?;

    let exists = discovery
        .groups()
        .filter(|g| g.name() == group)
        .flat_map(|g| g.recommended_resources())
        .any(|(ar, _)| {
            ar.kind == ControllerWatch::kind(&()) && ar.version == ControllerWatch::version(&())
        });
    Ok(exists)
}
