// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

/// Metadata keys helm inspects before adopting an existing object into a release
pub mod ownership {
    pub const RELEASE_NAME: &str = "meta.helm.sh/release-name";
    pub const RELEASE_NAMESPACE: &str = "meta.helm.sh/release-namespace";
    pub const MANAGED_BY: &str = "app.kubernetes.io/managed-by";
    pub const MANAGED_BY_HELM: &str = "Helm";
}

/// The field manager used for server-side apply and status patches
pub const FIELD_MANAGER: &str = "kubehoist-controller";

/// Group and kind of the objects that register new resource kinds
pub mod crd {
    pub const GROUP: &str = "apiextensions.k8s.io";
    pub const KIND: &str = "CustomResourceDefinition";
    /// Initial polling interval in seconds when waiting for the ControllerWatch CRD
    pub const POLL_INTERVAL_SECS: u64 = 10;
    /// Maximum polling interval in seconds (exponential backoff cap)
    pub const POLL_MAX_INTERVAL_SECS: u64 = 60;
}

pub mod defaults {
    pub const HELM_BINARY: &str = "helm";
    pub const INSTALL_TIMEOUT_SECS: u64 = 600;
    pub const RENDER_TIMEOUT_SECS: u64 = 300;
    pub const ERROR_REQUEUE_SECS: u64 = 60;
    pub const CONFLICT_REQUEUE_SECS: u64 = 1;
}

/// Activation watcher tuning
pub mod activation {
    /// Attempts at the Pending write for a single event before giving up on it
    pub const CONFLICT_RETRIES: usize = 3;
    /// Delay before re-subscribing once a watch stream has ended
    pub const RESUBSCRIBE_SECS: u64 = 5;
}
