// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Chart values parsing

use crate::error::{HoistError, Result};
use serde_json::Value;

/// Structured chart values, always a mapping at the top level
pub type Values = serde_json::Map<String, Value>;

/// Parse raw values text (YAML or JSON). Absent, blank or `null` text yields
/// an empty mapping; anything that is not a mapping is rejected.
pub fn parse_values(raw: Option<&str>) -> Result<Values> {
    let Some(raw) = raw.filter(|r| !r.trim().is_empty()) else {
        return Ok(Values::new());
    };

    let parsed: Value =
        serde_yaml::from_str(raw).map_err(|e| HoistError::InvalidValues(e.to_string()))?;

    match parsed {
        Value::Object(values) => Ok(values),
        Value::Null => Ok(Values::new()),
        other => Err(HoistError::InvalidValues(format!(
            "values must be a mapping, got {}",
            type_name(&other)
        ))),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a mapping",
    }
}
