// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Watchers that detect first use of an installed kind.

pub mod activation;
pub mod registry;

pub use activation::{Activation, ActivationWatcher};
pub use registry::{Binding, WatcherRegistry};
