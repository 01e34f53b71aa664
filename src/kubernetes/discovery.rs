// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Mapping from kinds to API resources, shared by everything that talks to
//! objects whose type is only known at runtime.

use crate::error::{HoistError, Result};
use crate::types::InstalledKind;
use kube::discovery::{pinned_kind, ApiCapabilities, ApiResource};
use kube::Client;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

/// Built once at startup and passed by reference. Kinds are resolved through
/// discovery the first time they are needed and cached afterwards.
#[derive(Default)]
pub struct KindRegistry {
    resources: RwLock<HashMap<InstalledKind, (ApiResource, ApiCapabilities)>>,
}

impl KindRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a kind without going through discovery
    pub async fn register(
        &self,
        kind: &InstalledKind,
        resource: ApiResource,
        capabilities: ApiCapabilities,
    ) {
        self.resources
            .write()
            .await
            .insert(kind.clone(), (resource, capabilities));
    }

    pub async fn resolve(
        &self,
        client: &Client,
        kind: &InstalledKind,
    ) -> Result<(ApiResource, ApiCapabilities)> {
        if let Some(found) = self.resources.read().await.get(kind) {
            return Ok(found.clone());
        }

        let (resource, capabilities) = pinned_kind(client, &kind.to_gvk())
            .await
            .map_err(|e| HoistError::UnknownKind(format!("{}: {}", kind, e)))?;
        debug!("Discovered {} as resource '{}'", kind, resource.plural);

        self.register(kind, resource.clone(), capabilities.clone())
            .await;
        Ok((resource, capabilities))
    }
}
