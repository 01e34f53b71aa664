// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Test utilities for mocking Kubernetes API responses and cluster state.

use crate::error::{HoistError, Result};
use crate::kubernetes::{ClusterStore, ObservedObject};
use crate::types::{
    ControllerInstallationStatus, ControllerWatch, ControllerWatchSpec, ControllerWatchStatus,
    CrdInstallationStatus, HelmInstallSpec, InstalledKind, ObjectKey, StatusPatch,
};
use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use http::{Request, Response};
use http_body_util::BodyExt;
use kube::api::DynamicObject;
use kube::client::Body;
use kube::Client;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tower::Service;

/// A request seen by [`MockService`]
#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub query: String,
    pub body: String,
}

/// A mock HTTP service that returns predefined responses based on request paths.
#[derive(Clone)]
pub struct MockService {
    responses: Arc<Mutex<HashMap<(String, String), (u16, String)>>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockService {
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(HashMap::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Add a response for GET requests matching the exact path
    pub fn on_get(self, path: &str, status: u16, body: &str) -> Self {
        self.on("GET", path, status, body)
    }

    /// Add a response for PATCH requests matching the exact path
    pub fn on_patch(self, path: &str, status: u16, body: &str) -> Self {
        self.on("PATCH", path, status, body)
    }

    fn on(self, method: &str, path: &str, status: u16, body: &str) -> Self {
        self.responses.lock().unwrap().insert(
            (method.to_string(), path.to_string()),
            (status, body.to_string()),
        );
        self
    }

    /// Requests received so far, in arrival order
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Build a kube Client from this mock service
    pub fn into_client(self) -> Client {
        Client::new(self, "default")
    }

    fn find_response(&self, method: &str, path: &str) -> Option<(u16, String)> {
        let responses = self.responses.lock().unwrap();
        responses
            .get(&(method.to_string(), path.to_string()))
            .cloned()
    }
}

impl Default for MockService {
    fn default() -> Self {
        Self::new()
    }
}

impl Service<Request<Body>> for MockService {
    type Response = Response<Body>;
    type Error = tower::BoxError;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = std::result::Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let method = req.method().to_string();
        let path = req.uri().path().to_string();
        let query = req.uri().query().unwrap_or_default().to_string();

        let response = self.find_response(&method, &path);
        let requests = self.requests.clone();

        Box::pin(async move {
            let bytes = req.into_body().collect().await?.to_bytes();
            requests.lock().unwrap().push(RecordedRequest {
                method,
                path,
                query,
                body: String::from_utf8_lossy(&bytes).to_string(),
            });

            let (status, body) = response.unwrap_or_else(|| (404, not_found_json("resource", "")));
            Ok(Response::builder()
                .status(status)
                .header("content-type", "application/json")
                .body(Body::from(body.into_bytes()))
                .unwrap())
        })
    }
}

/// Create a 404 not found response
pub fn not_found_json(resource: &str, name: &str) -> String {
    status_json(404, "NotFound", &format!("{} \"{}\" not found", resource, name))
}

/// Create a 409 conflict response as returned for a stale resourceVersion
pub fn conflict_json(name: &str) -> String {
    status_json(
        409,
        "Conflict",
        &format!(
            "Operation cannot be fulfilled on controllerwatches \"{}\": the object has been modified",
            name
        ),
    )
}

fn status_json(code: u16, reason: &str, message: &str) -> String {
    serde_json::json!({
        "kind": "Status",
        "apiVersion": "v1",
        "status": "Failure",
        "message": message,
        "reason": reason,
        "code": code
    })
    .to_string()
}

/// A ControllerWatch in namespace `kubehoist` for the given chart
pub fn controller_watch(name: &str, values: Option<&str>) -> ControllerWatch {
    let mut watch = ControllerWatch::new(
        name,
        ControllerWatchSpec {
            helm_spec: HelmInstallSpec {
                chart: format!("example/{}", name),
                namespace: format!("{}-system", name),
                release_name: name.to_string(),
                version: Some("1.2.3".to_string()),
                values: values.map(str::to_string),
                create_namespace: Some(true),
            },
        },
    );
    watch.metadata.namespace = Some("kubehoist".to_string());
    watch.metadata.resource_version = Some("1".to_string());
    watch
}

/// Same as [`controller_watch`] with the given phases already recorded
pub fn controller_watch_with_status(
    name: &str,
    crd: Option<CrdInstallationStatus>,
    controller: Option<ControllerInstallationStatus>,
) -> ControllerWatch {
    let mut watch = controller_watch(name, None);
    let installed_crds = if crd == Some(CrdInstallationStatus::Installed) {
        vec![InstalledKind::new("example.com", "v1", "Widget")]
    } else {
        vec![]
    };
    watch.status = Some(ControllerWatchStatus {
        crd_installation_status: crd,
        installed_crds,
        controller_installation_status: controller,
        last_updated: None,
    });
    watch
}

/// A CustomResourceDefinition document as helm would render it
pub fn crd_yaml(group: &str, kind: &str, plural: &str, versions: &[&str]) -> String {
    let versions: String = versions
        .iter()
        .enumerate()
        .map(|(i, v)| {
            format!(
                "  - name: {}\n    served: true\n    storage: {}\n    schema:\n      openAPIV3Schema:\n        type: object\n",
                v,
                i == 0
            )
        })
        .collect();
    format!(
        "apiVersion: apiextensions.k8s.io/v1\nkind: CustomResourceDefinition\nmetadata:\n  name: {plural}.{group}\nspec:\n  group: {group}\n  names:\n    kind: {kind}\n    plural: {plural}\n    singular: {singular}\n  scope: Namespaced\n  versions:\n{versions}",
        plural = plural,
        group = group,
        kind = kind,
        singular = kind.to_lowercase(),
        versions = versions,
    )
}

type Interleave = Box<dyn FnOnce(&mut ControllerWatch) + Send>;

/// In-memory [`ClusterStore`] that honours resourceVersion preconditions and
/// merges status patches field by field, like the API server does.
#[derive(Default)]
pub struct FakeStore {
    objects: Mutex<HashMap<ObjectKey, ControllerWatch>>,
    status_writes: Mutex<Vec<(ObjectKey, StatusPatch)>>,
    applied: Mutex<Vec<DynamicObject>>,
    events: Mutex<HashMap<InstalledKind, Vec<ObservedObject>>>,
    interleave: Mutex<Option<Interleave>>,
}

impl FakeStore {
    pub fn with(watches: Vec<ControllerWatch>) -> Arc<Self> {
        let store = Self::default();
        {
            let mut objects = store.objects.lock().unwrap();
            for watch in watches {
                objects.insert(watch.key(), watch);
            }
        }
        Arc::new(store)
    }

    pub fn object(&self, key: &ObjectKey) -> Option<ControllerWatch> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn status(&self, key: &ObjectKey) -> ControllerWatchStatus {
        self.object(key).and_then(|w| w.status).unwrap_or_default()
    }

    pub fn status_writes(&self) -> Vec<(ObjectKey, StatusPatch)> {
        self.status_writes.lock().unwrap().clone()
    }

    pub fn applied(&self) -> Vec<DynamicObject> {
        self.applied.lock().unwrap().clone()
    }

    /// Objects the watch stream for `kind` yields before ending
    pub fn emit(&self, kind: &InstalledKind, objects: Vec<ObservedObject>) {
        self.events.lock().unwrap().insert(kind.clone(), objects);
    }

    /// Mutate the stored object right before the next status patch is checked,
    /// simulating a concurrent writer landing between a read and a write.
    pub fn interleave_before_next_patch(&self, change: impl FnOnce(&mut ControllerWatch) + Send + 'static) {
        *self.interleave.lock().unwrap() = Some(Box::new(change));
    }

    pub fn remove(&self, key: &ObjectKey) {
        self.objects.lock().unwrap().remove(key);
    }
}

fn bump(watch: &mut ControllerWatch) {
    let next = watch
        .metadata
        .resource_version
        .as_deref()
        .and_then(|rv| rv.parse::<u64>().ok())
        .unwrap_or(0)
        + 1;
    watch.metadata.resource_version = Some(next.to_string());
}

fn merge(status: &mut ControllerWatchStatus, patch: &StatusPatch) {
    if let Some(phase) = patch.crd_installation_status {
        status.crd_installation_status = Some(phase);
    }
    if let Some(kinds) = &patch.installed_crds {
        status.installed_crds = kinds.clone();
    }
    if let Some(phase) = patch.controller_installation_status {
        status.controller_installation_status = Some(phase);
    }
    if let Some(at) = &patch.last_updated {
        status.last_updated = Some(at.clone());
    }
}

#[async_trait]
impl ClusterStore for FakeStore {
    async fn get(&self, key: &ObjectKey) -> Result<Option<ControllerWatch>> {
        Ok(self.object(key))
    }

    async fn patch_status(
        &self,
        key: &ObjectKey,
        resource_version: Option<String>,
        patch: &StatusPatch,
    ) -> Result<()> {
        let interleave = self.interleave.lock().unwrap().take();
        let mut objects = self.objects.lock().unwrap();
        let Some(watch) = objects.get_mut(key) else {
            return Err(HoistError::KubeError(kube::Error::Api(kube::error::ErrorResponse {
                status: "Failure".to_string(),
                message: format!("controllerwatches \"{}\" not found", key.name),
                reason: "NotFound".to_string(),
                code: 404,
            })));
        };
        if let Some(change) = interleave {
            change(watch);
            bump(watch);
        }
        if resource_version.is_some() && resource_version != watch.metadata.resource_version {
            return Err(HoistError::Conflict(key.to_string()));
        }
        merge(watch.status.get_or_insert_with(Default::default), patch);
        bump(watch);
        self.status_writes
            .lock()
            .unwrap()
            .push((key.clone(), patch.clone()));
        Ok(())
    }

    async fn apply_object(&self, object: &DynamicObject, _field_owner: &str, _force: bool) -> Result<()> {
        self.applied.lock().unwrap().push(object.clone());
        Ok(())
    }

    fn watch_metadata(&self, kind: &InstalledKind) -> BoxStream<'static, Result<ObservedObject>> {
        let objects = self
            .events
            .lock()
            .unwrap()
            .get(kind)
            .cloned()
            .unwrap_or_default();
        stream::iter(objects.into_iter().map(Ok)).boxed()
    }
}

/// An observed object of some watched kind
pub fn observed(namespace: &str, name: &str) -> ObservedObject {
    ObservedObject {
        namespace: Some(namespace.to_string()),
        name: name.to_string(),
    }
}

