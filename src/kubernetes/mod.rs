// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Kubernetes utilities for CRD discovery, kind resolution and cluster access.

pub mod crd;
pub mod discovery;
pub mod store;

pub use crd::wait_for_controller_watch_crd;
pub use discovery::KindRegistry;
pub use store::{ClusterStore, KubeClusterStore, ObservedObject};
#[cfg(test)]
pub use store::MockClusterStore;
