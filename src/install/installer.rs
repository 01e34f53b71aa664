// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Turns a chart reference into installed CRDs and, later, a full release.
//! The only place that mutates the cluster on behalf of a ControllerWatch.

use crate::config::Config;
use crate::error::{HoistError, Result};
use crate::helm::{
    extract_crds, parse_values, stamp_release_ownership, PackageSource, ReleaseTarget, Values,
};
use crate::kubernetes::ClusterStore;
use crate::types::HelmInstallSpec;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::DynamicObject;
use kube::ResourceExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, instrument};

/// Everything needed to render or install one chart
#[derive(Clone, Debug, PartialEq)]
pub struct InstallParams {
    pub chart: String,
    pub version: Option<String>,
    pub values: Values,
    pub target: ReleaseTarget,
}

impl InstallParams {
    /// Fails with [`HoistError::InvalidValues`] when the raw values do not parse
    pub fn from_spec(spec: &HelmInstallSpec) -> Result<Self> {
        Ok(Self {
            chart: spec.chart.clone(),
            version: spec.version.clone().filter(|v| !v.is_empty()),
            values: parse_values(spec.values.as_deref())?,
            target: ReleaseTarget {
                namespace: spec.namespace.clone(),
                release_name: spec.release_name.clone(),
                create_namespace: spec.create_namespace.unwrap_or(false),
            },
        })
    }
}

pub struct Installer {
    source: Arc<dyn PackageSource>,
    store: Arc<dyn ClusterStore>,
    field_manager: String,
    render_timeout: Duration,
    install_timeout: Duration,
}

impl Installer {
    pub fn new(source: Arc<dyn PackageSource>, store: Arc<dyn ClusterStore>, config: &Config) -> Self {
        Self {
            source,
            store,
            field_manager: config.field_manager.clone(),
            render_timeout: config.render_timeout,
            install_timeout: config.install_timeout,
        }
    }

    /// Render the chart without touching the cluster and return its CRDs,
    /// stamped so the release can adopt them later. No CRDs is not an error.
    #[instrument(skip(self, params), fields(chart = %params.chart))]
    pub async fn render_and_extract(
        &self,
        params: &InstallParams,
    ) -> Result<Vec<CustomResourceDefinition>> {
        let render = async {
            let artifact = self
                .source
                .locate(&params.chart, params.version.clone())
                .await?;
            self.source
                .render(&artifact, &params.values, &params.target, true)
                .await
        };
        let manifest = timeout(self.render_timeout, render).await.map_err(|_| {
            HoistError::RenderFailed(format!(
                "rendering did not finish within {:?}",
                self.render_timeout
            ))
        })??;

        let mut crds = extract_crds(&manifest);
        for crd in &mut crds {
            stamp_release_ownership(
                crd,
                &params.target.release_name,
                &params.target.namespace,
            );
        }

        info!("Found {} CRDs in chart {}", crds.len(), params.chart);
        Ok(crds)
    }

    /// Create or force-update a CRD. Never depends on a resourceVersion.
    #[instrument(skip(self, crd), fields(crd = %crd.name_any()))]
    pub async fn upsert_type_definition(&self, crd: &CustomResourceDefinition) -> Result<()> {
        let mut crd = crd.clone();
        crd.metadata.resource_version = None;
        crd.metadata.managed_fields = None;

        let object: DynamicObject = serde_json::to_value(&crd)
            .and_then(serde_json::from_value)
            .map_err(|e| HoistError::InvalidManifest(format!("{}: {}", crd.name_any(), e)))?;

        self.store
            .apply_object(&object, &self.field_manager, true)
            .await?;
        debug!("Applied CRD {}", crd.name_any());
        Ok(())
    }

    /// Install the whole chart, waiting at most the install timeout. A release
    /// that is already deployed counts as installed, so an install whose
    /// outcome was never recorded is not attempted a second time.
    #[instrument(skip(self, params), fields(chart = %params.chart, release = %params.target.release_name))]
    pub async fn install_release(&self, params: &InstallParams) -> Result<()> {
        let install = async {
            if self.source.release_deployed(&params.target).await? {
                info!(
                    "Release {}/{} is already deployed, not installing again",
                    params.target.namespace, params.target.release_name
                );
                return Ok(());
            }
            let artifact = self
                .source
                .locate(&params.chart, params.version.clone())
                .await?;
            info!(
                "Installing chart {} version {} as {}/{}",
                artifact.name, artifact.version, params.target.namespace, params.target.release_name
            );
            self.source
                .install(
                    &artifact,
                    &params.values,
                    &params.target,
                    self.install_timeout,
                )
                .await
        };

        match timeout(self.install_timeout, install).await {
            Ok(result) => result,
            Err(_) => Err(HoistError::InstallTimeout(self.install_timeout)),
        }
    }
}
