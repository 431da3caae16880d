// Copyright (c) Contributors to the SPK project.
// SPDX-License-Identifier: Apache-2.0

//! Installations and inline import parameters.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Error, Result};

#[cfg(test)]
#[path = "./installation_test.rs"]
mod installation_test;

pub const INSTALLATION_KIND: &str = "Installation";

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Installation {
    pub api_version: String,
    pub kind: String,

    #[serde(default)]
    pub metadata: Value,

    #[serde(default)]
    pub spec: InstallationSpec,

    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

impl Installation {
    /// `metadata.name`, or an empty string.
    pub fn name(&self) -> &str {
        self.metadata
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InstallationSpec {
    #[serde(default)]
    pub imports: InstallationImports,

    /// Import values given inline instead of through data objects.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub import_data_mappings: IndexMap<String, Value>,

    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct InstallationImports {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub data: Vec<DataImport>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub targets: Vec<Value>,

    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct DataImport {
    pub name: String,

    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

/// Parse `name=value` arguments, keeping their order.
pub fn parse_import_parameters<S: AsRef<str>>(args: &[S]) -> Result<IndexMap<String, String>> {
    let mut out = IndexMap::new();
    for arg in args {
        let arg = arg.as_ref();
        match arg.split_once('=') {
            Some((name, value)) if !name.is_empty() => {
                out.insert(name.to_string(), value.to_string());
            }
            _ => {
                return Err(Error::InvalidImportParameter {
                    given: arg.to_string(),
                });
            }
        }
    }
    Ok(out)
}

/// The JSON value of a raw parameter: numbers stay numbers, everything
/// else is a string.
pub fn parameter_value(raw: &str) -> Value {
    match serde_json::from_str::<serde_json::Number>(raw.trim()) {
        Ok(number) if !raw.trim().is_empty() => Value::Number(number),
        _ => Value::String(raw.to_string()),
    }
}

/// Move the named data imports to inline import data mappings.
///
/// Imports that are not named in `params` stay untouched. Returns the
/// names of parameters that did not match any data import.
pub fn set_import_parameters(
    installation: &mut Installation,
    params: &IndexMap<String, String>,
) -> Vec<String> {
    let mut unused: Vec<String> = params.keys().cloned().collect();
    let data = std::mem::take(&mut installation.spec.imports.data);
    for import in data {
        match params.get(&import.name) {
            Some(raw) => {
                tracing::debug!(import = %import.name, "setting import parameter");
                unused.retain(|n| n != &import.name);
                installation
                    .spec
                    .import_data_mappings
                    .insert(import.name, parameter_value(raw));
            }
            None => installation.spec.imports.data.push(import),
        }
    }
    unused
}
