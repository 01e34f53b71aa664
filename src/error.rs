// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HoistError {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Watch error: {0}")]
    WatchError(#[from] kube::runtime::watcher::Error),

    #[error("Conflict writing {0}, refetch and retry")]
    Conflict(String),

    #[error("Invalid chart values: {0}")]
    InvalidValues(String),

    #[error("Chart not found: {0}")]
    ChartNotFound(String),

    #[error("Chart failed to render: {0}")]
    RenderFailed(String),

    #[error("Chart install failed: {0}")]
    InstallFailed(String),

    #[error("Chart install did not finish within {0:?}")]
    InstallTimeout(Duration),

    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("Failed to run helm: {0}")]
    HelmProcess(#[from] std::io::Error),

    #[error("Unknown kind: {0}")]
    UnknownKind(String),
}

impl HoistError {
    /// True when the error is an optimistic-concurrency loss on a status write.
    pub fn is_conflict(&self) -> bool {
        match self {
            HoistError::Conflict(_) => true,
            HoistError::KubeError(kube::Error::Api(err)) => err.code == 409,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, HoistError>;
