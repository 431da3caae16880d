// Copyright (c) Contributors to the SPK project.
// SPDX-License-Identifier: Apache-2.0

//! Decoding and encoding of landscaper documents.
//!
//! All decoding is two-staged: the document is first read into a generic
//! value to check its identifying fields, then converted into its typed
//! form. Unknown fields survive in each type's flattened `extra` map.

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::blueprint::{BLUEPRINT_KIND, Blueprint, LANDSCAPER_API_VERSION};
use crate::descriptor::{ComponentDescriptor, SCHEMA_VERSION_V2};
use crate::installation::Installation;
use crate::{Error, Result};

#[cfg(test)]
#[path = "./codec_test.rs"]
mod codec_test;

/// Separator line between documents of a multi-document YAML stream.
pub const DOCUMENT_SEPARATOR: &str = "---";

pub fn decode_blueprint(data: &[u8]) -> Result<Blueprint> {
    let malformed = |reason: String| Error::MalformedBlueprint { reason };

    let value: serde_yaml::Value =
        serde_yaml::from_slice(data).map_err(|e| malformed(e.to_string()))?;

    let api_version = value.get("apiVersion").and_then(|v| v.as_str());
    if api_version != Some(LANDSCAPER_API_VERSION) {
        return Err(malformed(format!(
            "expected apiVersion '{LANDSCAPER_API_VERSION}', got {}",
            describe(api_version)
        )));
    }
    let kind = value.get("kind").and_then(|v| v.as_str());
    if kind != Some(BLUEPRINT_KIND) {
        return Err(malformed(format!(
            "expected kind '{BLUEPRINT_KIND}', got {}",
            describe(kind)
        )));
    }

    serde_yaml::from_value(value).map_err(|e| malformed(e.to_string()))
}

pub fn decode_descriptor(data: &[u8]) -> Result<ComponentDescriptor> {
    let malformed = |reason: String| Error::MalformedDescriptor { reason };

    let value: serde_yaml::Value =
        serde_yaml::from_slice(data).map_err(|e| malformed(e.to_string()))?;

    let schema_version = value
        .get("meta")
        .and_then(|m| m.get("schemaVersion"))
        .and_then(|v| v.as_str());
    if schema_version != Some(SCHEMA_VERSION_V2) {
        return Err(malformed(format!(
            "expected meta.schemaVersion '{SCHEMA_VERSION_V2}', got {}",
            describe(schema_version)
        )));
    }

    let cd: ComponentDescriptor =
        serde_yaml::from_value(value).map_err(|e| malformed(e.to_string()))?;
    if cd.component.repository_contexts.is_empty() {
        return Err(malformed(format!(
            "component {}:{} has no repository contexts",
            cd.component.name, cd.component.version
        )));
    }
    Ok(cd)
}

pub fn decode_installation(data: &[u8]) -> Result<Installation> {
    serde_yaml::from_slice(data).map_err(|e| Error::MalformedDescriptor {
        reason: format!("invalid installation: {e}"),
    })
}

/// Decode every document of a multi-document YAML stream.
pub fn decode_documents<T: DeserializeOwned>(
    data: &[u8],
) -> std::result::Result<Vec<T>, serde_yaml::Error> {
    serde_yaml::Deserializer::from_slice(data)
        .map(|doc| T::deserialize(doc))
        .collect()
}

pub fn encode_yaml<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    serde_yaml::to_string(value)
        .map(String::into_bytes)
        .map_err(|e| Error::Encode(e.to_string()))
}

pub fn encode_json_indented<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec_pretty(value).map_err(|e| Error::Encode(e.to_string()))
}

/// Join encoded YAML documents with separator lines.
pub fn join_documents<D: AsRef<[u8]>>(docs: &[D]) -> Vec<u8> {
    let mut out = Vec::new();
    for (i, doc) in docs.iter().enumerate() {
        let doc = doc.as_ref();
        if i > 0 {
            out.extend_from_slice(DOCUMENT_SEPARATOR.as_bytes());
            out.push(b'\n');
        }
        out.extend_from_slice(doc);
        if !doc.ends_with(b"\n") {
            out.push(b'\n');
        }
    }
    out
}

/// How rendered documents are written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Yaml,
    Json,
}

impl OutputFormat {
    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        match self {
            OutputFormat::Yaml => encode_yaml(value),
            OutputFormat::Json => encode_json_indented(value),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "yaml" => Ok(OutputFormat::Yaml),
            "json" => Ok(OutputFormat::Json),
            other => Err(Error::UnsupportedOutputFormat {
                given: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Yaml => f.write_str("yaml"),
            OutputFormat::Json => f.write_str("json"),
        }
    }
}

fn describe(value: Option<&str>) -> String {
    match value {
        Some(v) => format!("'{v}'"),
        None => "nothing".to_string(),
    }
}
