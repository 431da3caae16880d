// Copyright (c) Contributors to the SPK project.
// SPDX-License-Identifier: Apache-2.0

//! Import values read from value files.
//!
//! A value file carries an `imports` map:
//!
//! ```yaml
//! imports:
//!   replicas: 3
//!   cluster:
//!     apiVersion: landscaper.gardener.cloud/v1alpha1
//!     kind: Target
//!     metadata:
//!       name: my-target
//!       namespace: test
//!     spec:
//!       type: landscaper.gardener.cloud/kubernetes-cluster
//! ```
//!
//! Files are merged in order, later files win.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::{Error, Result};

#[cfg(test)]
#[path = "./imports_test.rs"]
mod imports_test;

pub type ImportMap = Map<String, Value>;

#[derive(Debug, Default, Deserialize)]
struct ValueFile {
    #[serde(default)]
    imports: Option<ImportMap>,
}

/// True for objects that look like a target: they carry a
/// `metadata.name` and a `metadata.namespace`.
pub fn is_target_reference(value: &Value) -> bool {
    let Some(metadata) = value.get("metadata") else {
        return false;
    };
    metadata.get("name").is_some_and(Value::is_string)
        && metadata.get("namespace").is_some_and(Value::is_string)
}

/// Merge import documents left to right.
///
/// Maps merge key by key and recursively; any other value is replaced by
/// the later one. Targets are replaced as a whole.
pub fn merge_imports<I>(docs: I) -> ImportMap
where
    I: IntoIterator<Item = ImportMap>,
{
    let mut merged = ImportMap::new();
    for doc in docs {
        for (key, value) in doc {
            match merged.get_mut(&key) {
                Some(existing) if !is_target_reference(&value) => merge_value(existing, value),
                _ => {
                    merged.insert(key, value);
                }
            }
        }
    }
    merged
}

fn merge_value(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_value(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// Parse the `imports` map of one value file.
pub fn parse_value_file(path: &Path, data: &[u8]) -> Result<ImportMap> {
    if data.iter().all(u8::is_ascii_whitespace) {
        return Ok(ImportMap::new());
    }
    let file: ValueFile = serde_yaml::from_slice(data).map_err(|e| Error::MalformedValueFile {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    Ok(file.imports.unwrap_or_default())
}

/// Read and merge value files in the given order.
pub fn load_value_files<P: AsRef<Path>>(paths: &[P]) -> Result<ImportMap> {
    let mut docs = Vec::with_capacity(paths.len());
    for path in paths {
        let path = path.as_ref();
        tracing::debug!(?path, "reading value file");
        let data = std::fs::read(path).map_err(|error| Error::ValueFileUnreadable {
            path: PathBuf::from(path),
            error,
        })?;
        docs.push(parse_value_file(path, &data)?);
    }
    Ok(merge_imports(docs))
}
