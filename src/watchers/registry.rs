// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Registry of running activation watchers, one per (kind, owner) binding.

use crate::kubernetes::ClusterStore;
use crate::types::{ControllerWatch, InstalledKind, ObjectKey};
use crate::watchers::activation::ActivationWatcher;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// A watched kind and the ControllerWatch its first use activates
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Binding {
    pub kind: InstalledKind,
    pub owner: ObjectKey,
}

pub struct WatcherRegistry {
    store: Arc<dyn ClusterStore>,
    watchers: Mutex<HashMap<Binding, JoinHandle<()>>>,
}

impl WatcherRegistry {
    pub fn new(store: Arc<dyn ClusterStore>) -> Self {
        Self {
            store,
            watchers: Mutex::new(HashMap::new()),
        }
    }

    /// Start watching `kind` on behalf of `owner`. Binding the same pair
    /// twice is a no-op; returns whether a watcher was started.
    pub async fn bind(&self, kind: InstalledKind, owner: ObjectKey) -> bool {
        let binding = Binding { kind, owner };
        let mut watchers = self.watchers.lock().await;
        prune(&mut watchers);

        if watchers.contains_key(&binding) {
            return false;
        }

        info!("Watching {} for first use on behalf of {}", binding.kind, binding.owner);
        let watcher = ActivationWatcher::new(
            binding.kind.clone(),
            binding.owner.clone(),
            self.store.clone(),
        );
        watchers.insert(binding, tokio::spawn(watcher.run()));
        true
    }

    /// Bind every kind the ControllerWatch recorded, or release its bindings
    /// once the chart is installed. Returns the number of new bindings.
    pub async fn bind_installed_kinds(&self, watch: &ControllerWatch) -> usize {
        let owner = watch.key();

        if watch.controller_installed() {
            self.unbind_owner(&owner).await;
            return 0;
        }
        if !watch.crds_installed() {
            return 0;
        }

        let mut started = 0;
        for kind in watch.installed_kinds() {
            if self.bind(kind.clone(), owner.clone()).await {
                started += 1;
            }
        }
        started
    }

    /// Stop a single binding, returns whether it existed
    pub async fn unbind(&self, kind: &InstalledKind, owner: &ObjectKey) -> bool {
        let binding = Binding {
            kind: kind.clone(),
            owner: owner.clone(),
        };
        match self.watchers.lock().await.remove(&binding) {
            Some(handle) => {
                handle.abort();
                debug!("Stopped watching {} for {}", kind, owner);
                true
            }
            None => false,
        }
    }

    /// Stop every binding of `owner`
    pub async fn unbind_owner(&self, owner: &ObjectKey) -> usize {
        let mut watchers = self.watchers.lock().await;
        let bindings: Vec<Binding> = watchers
            .keys()
            .filter(|b| &b.owner == owner)
            .cloned()
            .collect();

        for binding in &bindings {
            if let Some(handle) = watchers.remove(binding) {
                handle.abort();
            }
        }
        if !bindings.is_empty() {
            info!("Stopped {} activation watchers of {}", bindings.len(), owner);
        }
        bindings.len()
    }

    /// Live bindings, sorted. Watchers that ended because their owner is
    /// gone are dropped here.
    pub async fn bindings(&self) -> Vec<Binding> {
        let mut watchers = self.watchers.lock().await;
        prune(&mut watchers);
        let mut bindings: Vec<Binding> = watchers.keys().cloned().collect();
        bindings.sort();
        bindings
    }

    pub async fn shutdown(&self) {
        let mut watchers = self.watchers.lock().await;
        for (_, handle) in watchers.drain() {
            handle.abort();
        }
    }
}

fn prune(watchers: &mut HashMap<Binding, JoinHandle<()>>) {
    watchers.retain(|binding, handle| {
        let finished = handle.is_finished();
        if finished {
            debug!("Watcher for {} on {} has ended", binding.owner, binding.kind);
        }
        !finished
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{controller_watch_with_status, observed, FakeStore};
    use crate::types::{ControllerInstallationStatus, CrdInstallationStatus};
    use std::time::Duration;

    fn widget() -> InstalledKind {
        InstalledKind::new("example.com", "v1", "Widget")
    }

    fn owner() -> ObjectKey {
        ObjectKey::new("kubehoist", "widgets")
    }

    fn awaiting() -> ControllerWatch {
        controller_watch_with_status("widgets", Some(CrdInstallationStatus::Installed), None)
    }

    #[tokio::test]
    async fn test_bind_is_once_per_pair() {
        let registry = WatcherRegistry::new(FakeStore::with(vec![
            awaiting(),
            controller_watch_with_status("gadgets", Some(CrdInstallationStatus::Installed), None),
        ]));

        assert!(registry.bind(widget(), owner()).await);
        assert!(!registry.bind(widget(), owner()).await);
        assert!(
            registry
                .bind(widget(), ObjectKey::new("kubehoist", "gadgets"))
                .await
        );

        assert_eq!(registry.bindings().await.len(), 2);
        registry.shutdown().await;
        assert!(registry.bindings().await.is_empty());
    }

    #[tokio::test]
    async fn test_bind_installed_kinds() {
        let registry = WatcherRegistry::new(FakeStore::with(vec![awaiting()]));
        let mut watch = awaiting();
        watch.status.as_mut().unwrap().installed_crds.push(InstalledKind::new(
            "example.com",
            "v1",
            "Gadget",
        ));

        assert_eq!(registry.bind_installed_kinds(&watch).await, 2);
        assert_eq!(registry.bind_installed_kinds(&watch).await, 0);

        let kinds: Vec<String> = registry
            .bindings()
            .await
            .into_iter()
            .map(|b| b.kind.kind)
            .collect();
        assert_eq!(kinds, vec!["Gadget", "Widget"]);
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_nothing_bound_before_crds_are_installed() {
        let registry = WatcherRegistry::new(FakeStore::with(vec![]));
        let watch = controller_watch_with_status(
            "widgets",
            Some(CrdInstallationStatus::RenderFailed),
            None,
        );

        assert_eq!(registry.bind_installed_kinds(&watch).await, 0);
        assert!(registry.bindings().await.is_empty());
    }

    #[tokio::test]
    async fn test_installed_chart_releases_bindings() {
        let registry = WatcherRegistry::new(FakeStore::with(vec![awaiting()]));
        registry.bind_installed_kinds(&awaiting()).await;
        assert_eq!(registry.bindings().await.len(), 1);

        let installed = controller_watch_with_status(
            "widgets",
            Some(CrdInstallationStatus::Installed),
            Some(ControllerInstallationStatus::Installed),
        );
        assert_eq!(registry.bind_installed_kinds(&installed).await, 0);
        assert!(registry.bindings().await.is_empty());
    }

    #[tokio::test]
    async fn test_unbind() {
        let registry = WatcherRegistry::new(FakeStore::with(vec![awaiting()]));
        registry.bind(widget(), owner()).await;

        assert!(registry.unbind(&widget(), &owner()).await);
        assert!(!registry.unbind(&widget(), &owner()).await);
        assert_eq!(registry.unbind_owner(&owner()).await, 0);
    }

    #[tokio::test]
    async fn test_bound_watcher_activates_owner() {
        let store = FakeStore::with(vec![awaiting()]);
        store.emit(&widget(), vec![observed("default", "my-widget")]);
        let registry = WatcherRegistry::new(store.clone());

        registry.bind_installed_kinds(&awaiting()).await;
        for _ in 0..100 {
            if store.status(&owner()).controller_installation_status.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        registry.shutdown().await;

        assert_eq!(
            store.status(&owner()).controller_installation_status,
            Some(ControllerInstallationStatus::Pending)
        );
    }

    #[tokio::test]
    async fn test_binding_ends_with_removed_owner() {
        let store = FakeStore::with(vec![awaiting()]);
        store.emit(&widget(), vec![observed("default", "my-widget")]);
        store.remove(&owner());
        let registry = WatcherRegistry::new(store.clone());

        assert_eq!(registry.bind_installed_kinds(&awaiting()).await, 1);
        for _ in 0..100 {
            if registry.bindings().await.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert!(registry.bindings().await.is_empty());
        assert!(store.status_writes().is_empty());
    }

    #[tokio::test]
    async fn test_ended_binding_can_be_bound_again() {
        let store = FakeStore::with(vec![]);
        let registry = WatcherRegistry::new(store.clone());

        registry.bind(widget(), owner()).await;
        for _ in 0..100 {
            if registry.bindings().await.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert!(registry.bind(widget(), owner()).await);
        registry.shutdown().await;
    }
}
