// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Helm chart handling: values, rendered manifests and the helm CLI.

pub mod manifest;
pub mod source;
pub mod values;

pub use manifest::{crd_kinds, extract_crds, stamp_release_ownership};
pub use source::{ChartArtifact, HelmCli, PackageSource, ReleaseTarget};
#[cfg(test)]
pub use source::MockPackageSource;
pub use values::{parse_values, Values};
