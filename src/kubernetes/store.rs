// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Narrow view of the cluster shared by the reconciler, the installer and
//! the activation watchers.

use crate::error::{HoistError, Result};
use crate::kubernetes::discovery::KindRegistry;
use crate::types::{ControllerWatch, InstalledKind, ObjectKey, StatusPatch};
use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use kube::api::{Api, DynamicObject, Patch, PatchParams};
use kube::discovery::Scope;
use kube::{Client, ResourceExt};
use kube_runtime::{metadata_watcher, watcher, WatchStreamExt};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, instrument};

#[cfg(test)]
use mockall::automock;

/// An object of a watched kind, known only by its identity
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObservedObject {
    pub namespace: Option<String>,
    pub name: String,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterStore: Send + Sync {
    /// Fetch a ControllerWatch, `None` when it does not exist
    async fn get(&self, key: &ObjectKey) -> Result<Option<ControllerWatch>>;

    /// Merge `patch` into the status of `key`.
    ///
    /// With a `resource_version` the write only lands if the object is unchanged
    /// since it was read, and fails with [`HoistError::Conflict`] otherwise.
    async fn patch_status(
        &self,
        key: &ObjectKey,
        resource_version: Option<String>,
        patch: &StatusPatch,
    ) -> Result<()>;

    /// Server-side apply an arbitrary object, creating it when absent
    async fn apply_object(&self, object: &DynamicObject, field_owner: &str, force: bool)
        -> Result<()>;

    /// Metadata-only watch over every object of `kind`, across namespaces
    fn watch_metadata(&self, kind: &InstalledKind) -> BoxStream<'static, Result<ObservedObject>>;
}

pub struct KubeClusterStore {
    client: Client,
    kinds: Arc<KindRegistry>,
    field_manager: String,
}

impl KubeClusterStore {
    pub fn new(client: Client, kinds: Arc<KindRegistry>, field_manager: &str) -> Self {
        Self {
            client,
            kinds,
            field_manager: field_manager.to_string(),
        }
    }

    fn watches(&self, namespace: &str) -> Api<ControllerWatch> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl ClusterStore for KubeClusterStore {
    #[instrument(skip(self), fields(watch = %key))]
    async fn get(&self, key: &ObjectKey) -> Result<Option<ControllerWatch>> {
        Ok(self.watches(&key.namespace).get_opt(&key.name).await?)
    }

    #[instrument(skip(self, patch), fields(watch = %key))]
    async fn patch_status(
        &self,
        key: &ObjectKey,
        resource_version: Option<String>,
        patch: &StatusPatch,
    ) -> Result<()> {
        let body = status_patch_body(resource_version.as_deref(), patch);
        let pp = PatchParams {
            field_manager: Some(self.field_manager.clone()),
            ..Default::default()
        };

        match self
            .watches(&key.namespace)
            .patch_status(&key.name, &pp, &Patch::Merge(&body))
            .await
        {
            Ok(_) => {
                debug!("Patched status of {}: {}", key, body["status"]);
                Ok(())
            }
            Err(kube::Error::Api(err)) if err.code == 409 => {
                Err(HoistError::Conflict(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self, object), fields(object = %object.name_any()))]
    async fn apply_object(
        &self,
        object: &DynamicObject,
        field_owner: &str,
        force: bool,
    ) -> Result<()> {
        let types = object.types.as_ref().ok_or_else(|| {
            HoistError::InvalidManifest(format!("{} has no apiVersion/kind", object.name_any()))
        })?;
        let kind = InstalledKind::from_type_meta(&types.api_version, &types.kind);
        let (resource, capabilities) = self.kinds.resolve(&self.client, &kind).await?;

        let api: Api<DynamicObject> = match (capabilities.scope, object.namespace()) {
            (Scope::Cluster, _) => Api::all_with(self.client.clone(), &resource),
            (Scope::Namespaced, Some(ns)) => {
                Api::namespaced_with(self.client.clone(), &ns, &resource)
            }
            (Scope::Namespaced, None) => {
                Api::default_namespaced_with(self.client.clone(), &resource)
            }
        };

        let mut pp = PatchParams::apply(field_owner);
        if force {
            pp = pp.force();
        }
        api.patch(&object.name_any(), &pp, &Patch::Apply(object))
            .await?;

        debug!("Applied {} {}", kind, object.name_any());
        Ok(())
    }

    fn watch_metadata(&self, kind: &InstalledKind) -> BoxStream<'static, Result<ObservedObject>> {
        let client = self.client.clone();
        let kinds = self.kinds.clone();
        let kind = kind.clone();

        stream::once(async move {
            match kinds.resolve(&client, &kind).await {
                Ok((resource, _)) => {
                    let api: Api<DynamicObject> = Api::all_with(client, &resource);
                    metadata_watcher(api, watcher::Config::default())
                        .default_backoff()
                        .applied_objects()
                        .map(|res| {
                            res.map(|obj| ObservedObject {
                                namespace: obj.metadata.namespace.clone(),
                                name: obj.metadata.name.clone().unwrap_or_default(),
                            })
                            .map_err(HoistError::from)
                        })
                        .boxed()
                }
                Err(e) => stream::once(async move { Err(e) }).boxed(),
            }
        })
        .flatten()
        .boxed()
    }
}

/// Merge patch body for the status subresource. The resourceVersion turns the
/// patch into a conditional write.
fn status_patch_body(resource_version: Option<&str>, patch: &StatusPatch) -> serde_json::Value {
    let mut body = json!({ "status": patch });
    if let Some(rv) = resource_version {
        body["metadata"] = json!({ "resourceVersion": rv });
    }
    body
}
