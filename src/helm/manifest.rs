// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Splitting rendered manifests and picking out the CRDs

use crate::constants::{crd, ownership};
use crate::types::InstalledKind;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use std::collections::BTreeMap;
use tracing::debug;

/// Split a multi-document manifest at every line starting with `---`
pub fn split_documents(manifest: &str) -> Vec<String> {
    let mut documents = Vec::new();
    let mut current = String::new();

    for line in manifest.lines() {
        if line.starts_with("---") {
            documents.push(std::mem::take(&mut current));
            continue;
        }
        current.push_str(line);
        current.push('\n');
    }
    documents.push(current);

    documents
        .into_iter()
        .filter(|doc| {
            doc.lines()
                .any(|l| !l.trim().is_empty() && !l.trim_start().starts_with('#'))
        })
        .collect()
}

/// Decode every CustomResourceDefinition in `manifest`. Documents of other
/// kinds, or that fail to decode, are skipped.
pub fn extract_crds(manifest: &str) -> Vec<CustomResourceDefinition> {
    split_documents(manifest)
        .iter()
        .filter_map(|doc| match decode_crd(doc) {
            Ok(found) => found,
            Err(e) => {
                debug!("Skipping undecodable manifest document: {}", e);
                None
            }
        })
        .collect()
}

fn decode_crd(doc: &str) -> Result<Option<CustomResourceDefinition>, serde_yaml::Error> {
    let value: serde_json::Value = serde_yaml::from_str(doc)?;
    let kind = InstalledKind::from_type_meta(
        value["apiVersion"].as_str().unwrap_or_default(),
        value["kind"].as_str().unwrap_or_default(),
    );
    if kind.group != crd::GROUP || kind.kind != crd::KIND {
        return Ok(None);
    }
    serde_json::from_value(value)
        .map(Some)
        .map_err(serde::de::Error::custom)
}

/// Mark a CRD as owned by the release so helm adopts it on the full install
pub fn stamp_release_ownership(
    crd: &mut CustomResourceDefinition,
    release_name: &str,
    release_namespace: &str,
) {
    let annotations = crd.metadata.annotations.get_or_insert_with(BTreeMap::new);
    annotations.insert(ownership::RELEASE_NAME.to_string(), release_name.to_string());
    annotations.insert(
        ownership::RELEASE_NAMESPACE.to_string(),
        release_namespace.to_string(),
    );

    crd.metadata
        .labels
        .get_or_insert_with(BTreeMap::new)
        .insert(
            ownership::MANAGED_BY.to_string(),
            ownership::MANAGED_BY_HELM.to_string(),
        );
}

/// One kind per version the CRD declares
pub fn crd_kinds(crd: &CustomResourceDefinition) -> Vec<InstalledKind> {
    crd.spec
        .versions
        .iter()
        .map(|v| InstalledKind::new(&crd.spec.group, &v.name, &crd.spec.names.kind))
        .collect()
}
