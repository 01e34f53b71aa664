// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Activation watcher - turns the first use of an installed kind into an
//! install request on the ControllerWatch that owns it.

use crate::constants::activation::{CONFLICT_RETRIES, RESUBSCRIBE_SECS};
use crate::error::Result;
use crate::kubernetes::{ClusterStore, ObservedObject};
use crate::types::{ControllerInstallationStatus, InstalledKind, ObjectKey, StatusPatch};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// What a single observed object led to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Activation {
    /// The owner was marked Pending
    Requested,
    /// Nothing to do: already Pending or Installed, or CRDs not installed yet
    Unchanged,
    /// The owning ControllerWatch no longer exists
    OwnerGone,
}

pub struct ActivationWatcher {
    kind: InstalledKind,
    owner: ObjectKey,
    store: Arc<dyn ClusterStore>,
}

impl ActivationWatcher {
    pub fn new(kind: InstalledKind, owner: ObjectKey, store: Arc<dyn ClusterStore>) -> Self {
        Self { kind, owner, store }
    }

    /// Mark the owner Pending unless it already is, or is installed.
    #[instrument(skip(self), fields(kind = %self.kind, owner = %self.owner))]
    pub async fn on_event(&self, object: &ObservedObject) -> Result<Activation> {
        let mut attempt = 0;

        loop {
            attempt += 1;

            let Some(watch) = self.store.get(&self.owner).await? else {
                debug!("Owner {} is gone, ignoring {}", self.owner, object.name);
                return Ok(Activation::OwnerGone);
            };

            match watch.controller_status() {
                Some(ControllerInstallationStatus::Pending)
                | Some(ControllerInstallationStatus::Installed) => return Ok(Activation::Unchanged),
                _ => {}
            }

            if !watch.crds_installed() {
                debug!("CRDs of {} not installed yet, ignoring", self.owner);
                return Ok(Activation::Unchanged);
            }

            let patch =
                StatusPatch::controller_phase(ControllerInstallationStatus::Pending).stamped_now();
            match self
                .store
                .patch_status(&self.owner, watch.metadata.resource_version.clone(), &patch)
                .await
            {
                Ok(()) => {
                    info!(
                        "{} {} used, requesting install of {}",
                        self.kind.kind,
                        object
                            .namespace
                            .as_ref()
                            .map(|ns| format!("{}/{}", ns, object.name))
                            .unwrap_or_else(|| object.name.clone()),
                        self.owner
                    );
                    return Ok(Activation::Requested);
                }
                Err(e) if e.is_conflict() && attempt < CONFLICT_RETRIES => {
                    debug!("Conflict marking {} pending, refetching", self.owner);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Watch the bound kind, re-subscribing whenever the stream ends. Returns
    /// once the owner is gone.
    pub async fn run(self) {
        loop {
            let mut events = self.store.watch_metadata(&self.kind);
            while let Some(event) = events.next().await {
                let result = match event {
                    Ok(object) => self.on_event(&object).await,
                    Err(e) => Err(e),
                };
                match result {
                    Ok(Activation::OwnerGone) => {
                        info!("{} is gone, no longer watching {}", self.owner, self.kind);
                        return;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("Activation watcher for {} on {}: {}", self.owner, self.kind, e)
                    }
                }
            }

            match self.store.get(&self.owner).await {
                Ok(None) => {
                    info!("{} is gone, no longer watching {}", self.owner, self.kind);
                    return;
                }
                Ok(Some(_)) => {}
                Err(e) => warn!("Failed to look up {}: {}", self.owner, e),
            }

            debug!(
                "Watch on {} ended, re-subscribing in {}s",
                self.kind, RESUBSCRIBE_SECS
            );
            tokio::time::sleep(Duration::from_secs(RESUBSCRIBE_SECS)).await;
        }
    }
}
