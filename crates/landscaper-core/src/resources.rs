// Copyright (c) Contributors to the SPK project.
// SPDX-License-Identifier: Apache-2.0

//! Resource lists that point at local files instead of registry blobs.
//!
//! A resource list is a multi-document YAML file. Each document is a
//! component resource that either carries a regular `access`, or an
//! `input` naming a file or directory next to the list:
//!
//! ```yaml
//! name: config
//! type: json-schema
//! input:
//!   type: file
//!   path: ./schemas/config.json
//!   mediaType: application/schema+json
//! ---
//! name: charts
//! type: helm
//! input:
//!   type: dir
//!   path: ./charts
//!   compressWithGzip: true
//! ```

use serde::{Deserialize, Serialize};

use crate::descriptor::{Access, ComponentDescriptor, Resource};
use crate::{Error, Result};

#[cfg(test)]
#[path = "./resources_test.rs"]
mod resources_test;

fn is_false(v: &bool) -> bool {
    !*v
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BlobInputType {
    File,
    Dir,
}

/// A local file or directory that provides the bytes of a resource.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BlobInput {
    #[serde(rename = "type")]
    pub input_type: BlobInputType,

    pub path: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,

    #[serde(default, skip_serializing_if = "is_false")]
    pub compress_with_gzip: bool,

    /// Keep the directory itself as the top-level tar entry.
    #[serde(default, skip_serializing_if = "is_false")]
    pub preserve_dir: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include_files: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude_files: Vec<String>,
}

/// One document of a resource list.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ResourceOptions {
    #[serde(flatten)]
    pub resource: Resource,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<BlobInput>,
}

/// Parse a multi-document resource list.
pub fn read_resource_list(data: &[u8]) -> Result<Vec<ResourceOptions>> {
    let mut out = Vec::new();
    for (index, doc) in crate::codec::decode_documents::<serde_json::Value>(data)
        .map_err(|e| Error::MalformedDescriptor {
            reason: format!("invalid resource list: {e}"),
        })?
        .into_iter()
        .enumerate()
    {
        if doc.is_null() {
            continue;
        }
        let opts: ResourceOptions =
            serde_json::from_value(doc).map_err(|e| Error::MalformedDescriptor {
                reason: format!("invalid resource at index {index}: {e}"),
            })?;
        if opts.input.is_some() && opts.resource.access.is_some() {
            return Err(Error::MalformedDescriptor {
                reason: format!(
                    "resource '{}' must define either an input or an access, not both",
                    opts.resource.name
                ),
            });
        }
        out.push(opts);
    }
    Ok(out)
}

/// Add local resources to a descriptor.
///
/// A resource with the name of an existing one replaces it in place,
/// otherwise it is appended. Inputs become `localFilesystemResource`
/// accesses.
pub fn add_local_resources(
    cd: &ComponentDescriptor,
    resources: &[ResourceOptions],
) -> Result<ComponentDescriptor> {
    let mut cd = cd.clone();
    for opts in resources {
        let mut res = opts.resource.clone();
        if let Some(input) = &opts.input {
            res.access = Some(Access::local_filesystem(input)?);
        }
        if res.version.is_empty() {
            res.version = cd.component.version.clone();
        }
        match cd.component.resources.iter_mut().find(|r| r.name == res.name) {
            Some(existing) => *existing = res,
            None => cd.component.resources.push(res),
        }
    }
    Ok(cd)
}
