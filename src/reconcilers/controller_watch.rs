// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! ControllerWatch reconciler - installs a chart's CRDs, then the whole chart
//! once one of those CRDs has been used.

use crate::config::Config;
use crate::constants::{activation::CONFLICT_RETRIES, defaults::CONFLICT_REQUEUE_SECS};
use crate::error::{HoistError, Result};
use crate::helm::crd_kinds;
use crate::install::{InstallParams, Installer};
use crate::kubernetes::ClusterStore;
use crate::types::{
    ControllerInstallationStatus, ControllerWatch, CrdInstallationStatus, ObjectKey, StatusPatch,
};
use crate::watchers::WatcherRegistry;
use futures::StreamExt;
use kube::{
    runtime::{controller::Action, watcher, Controller, WatchStreamExt},
    Api, Client,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// What a single reconcile did
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    /// The ControllerWatch no longer exists
    Gone,
    /// The chart is installed, nothing left to do
    Done,
    /// CRDs are in place and the chart waits for one of them to be used
    AwaitingActivation,
    /// The CRD stage ended in this phase
    Crds(CrdInstallationStatus),
    /// The full install ended in this phase
    Controller(ControllerInstallationStatus),
}

pub struct ControllerWatchReconciler {
    store: Arc<dyn ClusterStore>,
    installer: Installer,
}

impl ControllerWatchReconciler {
    pub fn new(store: Arc<dyn ClusterStore>, installer: Installer) -> Self {
        Self { store, installer }
    }

    /// Advance the ControllerWatch one step. Negative outcomes are recorded in
    /// its status and still return `Ok`; an `Err` means try again later.
    #[instrument(skip(self), fields(watch = %key))]
    pub async fn reconcile(&self, key: &ObjectKey) -> Result<Step> {
        let Some(watch) = self.store.get(key).await? else {
            debug!("ControllerWatch {} not found, nothing to do", key);
            return Ok(Step::Gone);
        };

        if watch.controller_installed() {
            return Ok(Step::Done);
        }

        if !watch.crds_installed() {
            return self.install_crds(&watch).await;
        }

        if watch.controller_status() == Some(ControllerInstallationStatus::Pending) {
            return self.install_controller(&watch).await;
        }

        debug!("CRDs of {} installed, waiting for activation", key);
        Ok(Step::AwaitingActivation)
    }

    async fn install_crds(&self, watch: &ControllerWatch) -> Result<Step> {
        let spec = &watch.spec.helm_spec;
        info!("Installing CRDs from chart {}", spec.chart);

        let params = match InstallParams::from_spec(spec) {
            Ok(params) => params,
            Err(e) => {
                warn!("Invalid values for chart {}: {}", spec.chart, e);
                return self.set_crd_phase(watch, CrdInstallationStatus::InvalidValues).await;
            }
        };

        let crds = match self.installer.render_and_extract(&params).await {
            Ok(crds) => crds,
            Err(e) => {
                error!("Failed to template chart {}: {}", spec.chart, e);
                return self.set_crd_phase(watch, CrdInstallationStatus::RenderFailed).await;
            }
        };

        if crds.is_empty() {
            warn!("No CRDs found in chart {}", spec.chart);
            return self.set_crd_phase(watch, CrdInstallationStatus::NoneFound).await;
        }

        let mut kinds = Vec::new();
        for crd in &crds {
            self.installer.upsert_type_definition(crd).await?;
            kinds.extend(crd_kinds(crd));
        }

        info!(
            "Installed {} CRDs from chart {}: {}",
            crds.len(),
            spec.chart,
            kinds
                .iter()
                .map(|k| k.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );
        self.write(watch, StatusPatch::crds_installed(kinds)).await?;
        Ok(Step::Crds(CrdInstallationStatus::Installed))
    }

    async fn install_controller(&self, watch: &ControllerWatch) -> Result<Step> {
        let spec = &watch.spec.helm_spec;

        let phase = match InstallParams::from_spec(spec) {
            Err(e) => {
                warn!("Invalid values for chart {}: {}", spec.chart, e);
                ControllerInstallationStatus::InstallFailed
            }
            Ok(params) => match self.installer.install_release(&params).await {
                Ok(()) => {
                    info!("Successfully installed chart {}", spec.chart);
                    ControllerInstallationStatus::Installed
                }
                Err(e) => {
                    error!("Failed to install chart {}: {}", spec.chart, e);
                    ControllerInstallationStatus::InstallFailed
                }
            },
        };

        self.record_install_outcome(watch, phase).await?;
        Ok(Step::Controller(phase))
    }

    /// An install is not repeatable, so losing its outcome to a conflict would
    /// trigger a second one. Refetch and write again while still Pending.
    async fn record_install_outcome(
        &self,
        watch: &ControllerWatch,
        phase: ControllerInstallationStatus,
    ) -> Result<()> {
        let key = watch.key();
        let mut resource_version = watch.metadata.resource_version.clone();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let patch = StatusPatch::controller_phase(phase).stamped_now();
            match self
                .store
                .patch_status(&key, resource_version.clone(), &patch)
                .await
            {
                Ok(()) => return Ok(()),
                Err(e) if e.is_conflict() && attempt < CONFLICT_RETRIES => {
                    debug!("Conflict recording install outcome of {}, refetching", key);
                    let Some(current) = self.store.get(&key).await? else {
                        return Ok(());
                    };
                    if current.controller_status() != Some(ControllerInstallationStatus::Pending) {
                        return Ok(());
                    }
                    resource_version = current.metadata.resource_version.clone();
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn set_crd_phase(
        &self,
        watch: &ControllerWatch,
        phase: CrdInstallationStatus,
    ) -> Result<Step> {
        // Our own status write comes back as a watch event; an unchanged
        // outcome must not write again or the two would feed each other.
        if watch.crd_status() == Some(phase) {
            debug!("{} already recorded as {}", watch.key(), phase);
            return Ok(Step::Crds(phase));
        }
        self.write(watch, StatusPatch::crd_phase(phase)).await?;
        Ok(Step::Crds(phase))
    }

    async fn write(&self, watch: &ControllerWatch, patch: StatusPatch) -> Result<()> {
        self.store
            .patch_status(
                &watch.key(),
                watch.metadata.resource_version.clone(),
                &patch.stamped_now(),
            )
            .await
    }
}

/// Runs the reconciler for every ControllerWatch in the cluster and binds
/// activation watchers for the kinds they install.
pub struct ControllerWatchController {
    client: Client,
    reconciler: ControllerWatchReconciler,
    registry: Arc<WatcherRegistry>,
    config: Config,
}

impl ControllerWatchController {
    pub fn new(
        client: Client,
        reconciler: ControllerWatchReconciler,
        registry: Arc<WatcherRegistry>,
        config: Config,
    ) -> Self {
        Self {
            client,
            reconciler,
            registry,
            config,
        }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let watches: Api<ControllerWatch> = Api::all(self.client.clone());
        let deletions = release_deleted(watches.clone(), self.registry.clone());
        let context = Arc::new(self);

        let controller = Controller::new(watches, watcher::Config::default())
            .shutdown_on_signal()
            .run(reconcile, error_policy, context)
            .for_each(|res| async move {
                match res {
                    Ok(o) => debug!("Reconciled controller watch: {:?}", o),
                    Err(e) => warn!("Reconciliation error: {:?}", e),
                }
            });

        // The controller never reconciles a deleted object, so deletions are
        // followed on a watch of their own.
        tokio::select! {
            _ = controller => {}
            _ = deletions => {}
        }

        Ok(())
    }
}

async fn release_deleted(watches: Api<ControllerWatch>, registry: Arc<WatcherRegistry>) {
    let mut events = watcher(watches, watcher::Config::default())
        .default_backoff()
        .boxed();
    while let Some(event) = events.next().await {
        handle_watch_event(&registry, event).await;
    }
}

/// Release the activation watchers of a deleted ControllerWatch
async fn handle_watch_event(
    registry: &WatcherRegistry,
    event: std::result::Result<watcher::Event<ControllerWatch>, watcher::Error>,
) {
    match event {
        Ok(watcher::Event::Delete(watch)) => {
            let released = registry.unbind_owner(&watch.key()).await;
            debug!(
                "ControllerWatch {} deleted, released {} watchers",
                watch.key(),
                released
            );
        }
        Ok(_) => {}
        Err(e) => warn!("ControllerWatch watch error, will retry: {}", e),
    }
}

async fn reconcile(
    watch: Arc<ControllerWatch>,
    ctx: Arc<ControllerWatchController>,
) -> Result<Action> {
    let key = watch.key();
    let step = ctx.reconciler.reconcile(&key).await?;
    debug!("Reconciled {}: {:?}", key, step);

    if step == Step::Gone {
        ctx.registry.unbind_owner(&key).await;
    } else {
        // Status writes come back as watch events, so this sees installed
        // kinds on the reconcile after the one that recorded them.
        ctx.registry.bind_installed_kinds(&watch).await;
    }

    Ok(Action::await_change())
}

fn error_policy(
    _watch: Arc<ControllerWatch>,
    error: &HoistError,
    ctx: Arc<ControllerWatchController>,
) -> Action {
    if error.is_conflict() {
        debug!("Status write lost a race, requeueing: {}", error);
        return Action::requeue(Duration::from_secs(CONFLICT_REQUEUE_SECS));
    }
    error!("Reconciliation error: {}", error);
    Action::requeue(ctx.config.error_requeue)
}
