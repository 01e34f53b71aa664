// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! CRD extraction and full chart installation.

pub mod installer;

pub use installer::{InstallParams, Installer};
