// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Custom resource types owned by kubehoist.

pub mod controller_watch;

pub use controller_watch::{
    ControllerInstallationStatus, ControllerWatch, ControllerWatchSpec, ControllerWatchStatus,
    CrdInstallationStatus, HelmInstallSpec, InstalledKind, ObjectKey, StatusPatch,
};
