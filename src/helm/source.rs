// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Chart location, rendering and installation through the helm CLI

use crate::error::{HoistError, Result};
use crate::helm::values::Values;
use async_trait::async_trait;
use serde::Deserialize;
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, instrument, warn};

#[cfg(test)]
use mockall::automock;

/// A chart pinned to the version it resolved to
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChartArtifact {
    pub reference: String,
    pub name: String,
    pub version: String,
}

/// Where and under which name a release goes
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReleaseTarget {
    pub namespace: String,
    pub release_name: String,
    pub create_namespace: bool,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait PackageSource: Send + Sync {
    /// Resolve a chart reference, optionally at a given version
    async fn locate(&self, chart: &str, version: Option<String>) -> Result<ChartArtifact>;

    /// Render the chart to a multi-document manifest. A dry run never
    /// contacts the cluster.
    async fn render(
        &self,
        artifact: &ChartArtifact,
        values: &Values,
        target: &ReleaseTarget,
        dry_run: bool,
    ) -> Result<String>;

    /// Whether a release with the target's name is already deployed there
    async fn release_deployed(&self, target: &ReleaseTarget) -> Result<bool>;

    /// Install the chart and wait for its workloads to become ready
    async fn install(
        &self,
        artifact: &ChartArtifact,
        values: &Values,
        target: &ReleaseTarget,
        timeout: Duration,
    ) -> Result<()>;
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct ChartMetadata {
    name: String,
    version: String,
    #[serde(default)]
    app_version: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ReleaseStatus {
    info: ReleaseInfo,
}

#[derive(Deserialize, Debug)]
struct ReleaseInfo {
    status: String,
}

pub struct HelmCli {
    binary: String,
}

impl HelmCli {
    pub fn new(binary: &str) -> Self {
        Self {
            binary: binary.to_string(),
        }
    }

    async fn run(&self, args: Vec<String>, stdin: Option<Vec<u8>>) -> Result<Output> {
        debug!("Running {} {}", self.binary, args.join(" "));

        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            tokio::spawn(async move {
                if let Err(e) = pipe.write_all(&input).await {
                    warn!("Failed to pass values to helm: {}", e);
                }
            });
        }

        Ok(child.wait_with_output().await?)
    }
}

#[async_trait]
impl PackageSource for HelmCli {
    #[instrument(skip(self))]
    async fn locate(&self, chart: &str, version: Option<String>) -> Result<ChartArtifact> {
        let output = self.run(show_chart_args(chart, version.as_deref()), None).await?;
        if !output.status.success() {
            return Err(HoistError::ChartNotFound(format!(
                "{}: {}",
                chart,
                stderr_of(&output)
            )));
        }

        let metadata: ChartMetadata = serde_yaml::from_slice(&output.stdout).map_err(|e| {
            HoistError::ChartNotFound(format!("{}: unreadable chart metadata: {}", chart, e))
        })?;
        debug!(
            "Located chart {} version {} (app version {})",
            metadata.name,
            metadata.version,
            metadata.app_version.as_deref().unwrap_or("unknown")
        );

        Ok(ChartArtifact {
            reference: chart.to_string(),
            name: metadata.name,
            version: metadata.version,
        })
    }

    #[instrument(skip(self, artifact, values), fields(chart = %artifact.reference))]
    async fn render(
        &self,
        artifact: &ChartArtifact,
        values: &Values,
        target: &ReleaseTarget,
        dry_run: bool,
    ) -> Result<String> {
        let output = self
            .run(template_args(artifact, target, dry_run), Some(values_input(values)?))
            .await?;
        if !output.status.success() {
            return Err(HoistError::RenderFailed(stderr_of(&output)));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    #[instrument(skip(self))]
    async fn release_deployed(&self, target: &ReleaseTarget) -> Result<bool> {
        let output = self.run(status_args(target), None).await?;
        if !output.status.success() {
            let stderr = stderr_of(&output);
            if stderr.contains("not found") {
                return Ok(false);
            }
            return Err(HoistError::InstallFailed(stderr));
        }

        let status: ReleaseStatus = serde_json::from_slice(&output.stdout).map_err(|e| {
            HoistError::InstallFailed(format!(
                "unreadable status of release {}: {}",
                target.release_name, e
            ))
        })?;
        debug!("Release {} is {}", target.release_name, status.info.status);
        Ok(status.info.status == "deployed")
    }

    #[instrument(skip(self, artifact, values), fields(chart = %artifact.reference))]
    async fn install(
        &self,
        artifact: &ChartArtifact,
        values: &Values,
        target: &ReleaseTarget,
        timeout: Duration,
    ) -> Result<()> {
        let output = self
            .run(install_args(artifact, target, timeout), Some(values_input(values)?))
            .await?;
        if !output.status.success() {
            return Err(HoistError::InstallFailed(stderr_of(&output)));
        }
        Ok(())
    }
}

fn show_chart_args(chart: &str, version: Option<&str>) -> Vec<String> {
    let mut args = vec!["show".to_string(), "chart".to_string(), chart.to_string()];
    if let Some(version) = version {
        args.extend(["--version".to_string(), version.to_string()]);
    }
    args
}

fn status_args(target: &ReleaseTarget) -> Vec<String> {
    vec![
        "status".to_string(),
        target.release_name.clone(),
        "--namespace".to_string(),
        target.namespace.clone(),
        "--output".to_string(),
        "json".to_string(),
    ]
}

fn release_args(command: &str, artifact: &ChartArtifact, target: &ReleaseTarget) -> Vec<String> {
    vec![
        command.to_string(),
        target.release_name.clone(),
        artifact.reference.clone(),
        "--namespace".to_string(),
        target.namespace.clone(),
        "--version".to_string(),
        artifact.version.clone(),
        "--values".to_string(),
        "-".to_string(),
    ]
}

fn template_args(artifact: &ChartArtifact, target: &ReleaseTarget, dry_run: bool) -> Vec<String> {
    let mut args = release_args("template", artifact, target);
    args.push("--include-crds".to_string());
    if !dry_run {
        args.push("--validate".to_string());
    }
    args
}

fn install_args(artifact: &ChartArtifact, target: &ReleaseTarget, timeout: Duration) -> Vec<String> {
    let mut args = release_args("install", artifact, target);
    args.extend([
        "--wait".to_string(),
        "--timeout".to_string(),
        format!("{}s", timeout.as_secs()),
    ]);
    if target.create_namespace {
        args.push("--create-namespace".to_string());
    }
    args
}

fn values_input(values: &Values) -> Result<Vec<u8>> {
    serde_json::to_vec(values).map_err(|e| HoistError::InvalidValues(e.to_string()))
}

fn stderr_of(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if stderr.is_empty() {
        format!("helm exited with {}", output.status)
    } else {
        stderr
    }
}
