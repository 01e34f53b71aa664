// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use k8s_openapi::chrono::Utc;
use kube::api::GroupVersionKind;
use kube::{CustomResource, ResourceExt};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lazily installs a helm chart: its CRDs up front, the rest once one of
/// those CRDs is first used.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, schemars::JsonSchema)]
#[kube(group = "controller.kubehoist.io", version = "v1alpha1", kind = "ControllerWatch")]
#[kube(namespaced)]
#[kube(status = "ControllerWatchStatus")]
#[kube(shortname = "cw")]
#[serde(rename_all = "camelCase")]
pub struct ControllerWatchSpec {
    #[serde(default)]
    pub helm_spec: HelmInstallSpec,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HelmInstallSpec {
    /// Chart reference: repo/chart, a local path or an oci:// reference
    pub chart: String,
    pub namespace: String,
    pub release_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Raw YAML or JSON values passed to the chart
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_namespace: Option<bool>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ControllerWatchStatus {
    #[serde(
        rename = "crdInstallationStatus",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub crd_installation_status: Option<CrdInstallationStatus>,
    #[serde(rename = "installedCRDs", default, skip_serializing_if = "Vec::is_empty")]
    pub installed_crds: Vec<InstalledKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller_installation_status: Option<ControllerInstallationStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<Time>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, schemars::JsonSchema)]
pub enum CrdInstallationStatus {
    #[serde(rename = "InvalidHelmChartValues")]
    InvalidValues,
    #[serde(rename = "HelmChartFailedToRender")]
    RenderFailed,
    #[serde(rename = "NoCRDsFoundInHelmChart")]
    NoneFound,
    Installed,
}

impl fmt::Display for CrdInstallationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CrdInstallationStatus::InvalidValues => "InvalidHelmChartValues",
            CrdInstallationStatus::RenderFailed => "HelmChartFailedToRender",
            CrdInstallationStatus::NoneFound => "NoCRDsFoundInHelmChart",
            CrdInstallationStatus::Installed => "Installed",
        };
        f.write_str(s)
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, schemars::JsonSchema)]
pub enum ControllerInstallationStatus {
    Pending,
    InstallFailed,
    Installed,
}

impl fmt::Display for ControllerInstallationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ControllerInstallationStatus::Pending => "Pending",
            ControllerInstallationStatus::InstallFailed => "InstallFailed",
            ControllerInstallationStatus::Installed => "Installed",
        };
        f.write_str(s)
    }
}

/// A (group, version, kind) registered by one of the chart's CRDs
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, schemars::JsonSchema,
)]
pub struct InstalledKind {
    pub group: String,
    pub version: String,
    pub kind: String,
}

impl InstalledKind {
    pub fn new(group: &str, version: &str, kind: &str) -> Self {
        Self {
            group: group.to_string(),
            version: version.to_string(),
            kind: kind.to_string(),
        }
    }

    /// Build from an `apiVersion` such as `apps/v1`, or `v1` for the core group
    pub fn from_type_meta(api_version: &str, kind: &str) -> Self {
        let (group, version) = api_version.split_once('/').unwrap_or(("", api_version));
        Self::new(group, version, kind)
    }

    pub fn to_gvk(&self) -> GroupVersionKind {
        GroupVersionKind::gvk(&self.group, &self.version, &self.kind)
    }
}

impl fmt::Display for InstalledKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}/{}", self.version, self.kind)
        } else {
            write!(f, "{}/{}/{}", self.group, self.version, self.kind)
        }
    }
}

/// Namespace/name identity of a ControllerWatch
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: &str, name: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

impl ControllerWatch {
    pub fn key(&self) -> ObjectKey {
        ObjectKey {
            namespace: self.namespace().unwrap_or_default(),
            name: self.name_any(),
        }
    }

    pub fn crd_status(&self) -> Option<CrdInstallationStatus> {
        self.status.as_ref().and_then(|s| s.crd_installation_status)
    }

    pub fn controller_status(&self) -> Option<ControllerInstallationStatus> {
        self.status
            .as_ref()
            .and_then(|s| s.controller_installation_status)
    }

    pub fn crds_installed(&self) -> bool {
        self.crd_status() == Some(CrdInstallationStatus::Installed)
    }

    pub fn controller_installed(&self) -> bool {
        self.controller_status() == Some(ControllerInstallationStatus::Installed)
    }

    /// Kinds recorded when the CRDs were installed, empty before that
    pub fn installed_kinds(&self) -> &[InstalledKind] {
        self.status
            .as_ref()
            .map(|s| s.installed_crds.as_slice())
            .unwrap_or_default()
    }
}

/// A field-scoped status write. Only the fields that are `Some` reach the
/// server, so concurrent writers of disjoint fields do not clobber each other.
#[derive(Serialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusPatch {
    #[serde(rename = "crdInstallationStatus", skip_serializing_if = "Option::is_none")]
    pub crd_installation_status: Option<CrdInstallationStatus>,
    #[serde(rename = "installedCRDs", skip_serializing_if = "Option::is_none")]
    pub installed_crds: Option<Vec<InstalledKind>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub controller_installation_status: Option<ControllerInstallationStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<Time>,
}

impl StatusPatch {
    pub fn crd_phase(phase: CrdInstallationStatus) -> Self {
        Self {
            crd_installation_status: Some(phase),
            ..Default::default()
        }
    }

    /// Kinds are only ever recorded together with the Installed phase
    pub fn crds_installed(kinds: Vec<InstalledKind>) -> Self {
        Self {
            crd_installation_status: Some(CrdInstallationStatus::Installed),
            installed_crds: Some(kinds),
            ..Default::default()
        }
    }

    pub fn controller_phase(phase: ControllerInstallationStatus) -> Self {
        Self {
            controller_installation_status: Some(phase),
            ..Default::default()
        }
    }

    pub fn stamped(mut self, at: Time) -> Self {
        self.last_updated = Some(at);
        self
    }

    pub fn stamped_now(self) -> Self {
        self.stamped(Time(Utc::now()))
    }
}
