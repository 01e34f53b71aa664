// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::constants::{defaults, FIELD_MANAGER};
use anyhow::{Context, Result};
use std::env;
use std::time::Duration;

/// Operator configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Field manager used for status patches and server-side apply
    pub field_manager: String,
    /// Path or name of the helm executable
    pub helm_binary: String,
    /// Upper bound for a full chart install, including waiting for readiness
    pub install_timeout: Duration,
    /// Upper bound for locating and rendering a chart
    pub render_timeout: Duration,
    pub error_requeue: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            field_manager: FIELD_MANAGER.to_string(),
            helm_binary: defaults::HELM_BINARY.to_string(),
            install_timeout: Duration::from_secs(defaults::INSTALL_TIMEOUT_SECS),
            render_timeout: Duration::from_secs(defaults::RENDER_TIMEOUT_SECS),
            error_requeue: Duration::from_secs(defaults::ERROR_REQUEUE_SECS),
        }
    }
}

impl Config {
    /// Load configuration from environment variables, falling back to defaults
    pub fn from_env() -> Result<Self> {
        let defaults = Config::default();

        Ok(Config {
            field_manager: env::var("FIELD_MANAGER").unwrap_or(defaults.field_manager),
            helm_binary: env::var("HELM_BINARY").unwrap_or(defaults.helm_binary),
            install_timeout: secs_from_env("INSTALL_TIMEOUT_SECS")?
                .unwrap_or(defaults.install_timeout),
            render_timeout: secs_from_env("RENDER_TIMEOUT_SECS")?
                .unwrap_or(defaults.render_timeout),
            error_requeue: secs_from_env("ERROR_REQUEUE_SECS")?.unwrap_or(defaults.error_requeue),
        })
    }
}

fn secs_from_env(name: &str) -> Result<Option<Duration>> {
    match env::var(name) {
        Ok(value) => parse_secs(name, &value).map(Some),
        Err(_) => Ok(None),
    }
}

fn parse_secs(name: &str, value: &str) -> Result<Duration> {
    let secs: u64 = value
        .trim()
        .parse()
        .with_context(|| format!("{} must be a whole number of seconds, got '{}'", name, value))?;
    Ok(Duration::from_secs(secs))
}
