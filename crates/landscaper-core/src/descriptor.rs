// Copyright (c) Contributors to the SPK project.
// SPDX-License-Identifier: Apache-2.0

//! Component descriptors (schema version v2) and resource access types.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::resources::BlobInput;
use crate::{Error, Result};

#[cfg(test)]
#[path = "./descriptor_test.rs"]
mod descriptor_test;

pub const SCHEMA_VERSION_V2: &str = "v2";

pub const OCI_REGISTRY_TYPE: &str = "ociRegistry";
pub const LOCAL_OCI_BLOB_TYPE: &str = "localOciBlob";
pub const LOCAL_FILESYSTEM_TYPE: &str = "localFilesystemResource";
pub const INLINE_JSON_SCHEMA_TYPE: &str = "inlineJsonSchema";

/// Descriptor used when rendering without one.
pub const DEFAULT_COMPONENT_NAME: &str = "my-example-component";
pub const DEFAULT_COMPONENT_VERSION: &str = "v0.0.0";

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ComponentDescriptor {
    pub meta: DescriptorMeta,
    pub component: ComponentSpec,

    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DescriptorMeta {
    #[serde(default)]
    pub schema_version: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ComponentSpec {
    pub name: String,
    pub version: String,

    #[serde(default)]
    pub repository_contexts: Vec<RepositoryContext>,

    #[serde(default)]
    pub provider: Value,

    #[serde(default)]
    pub sources: Vec<Source>,

    #[serde(default)]
    pub component_references: Vec<ComponentReference>,

    #[serde(default)]
    pub resources: Vec<Resource>,

    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

/// Where a component is stored, e.g. an OCI registry base URL.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryContext {
    #[serde(rename = "type")]
    pub context_type: String,

    #[serde(default)]
    pub base_url: String,
}

impl RepositoryContext {
    pub fn oci(base_url: impl Into<String>) -> Self {
        Self {
            context_type: OCI_REGISTRY_TYPE.to_string(),
            base_url: base_url.into(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ComponentReference {
    pub name: String,
    pub component_name: String,
    pub version: String,

    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct Resource {
    pub name: String,

    #[serde(default)]
    pub version: String,

    #[serde(rename = "type")]
    pub resource_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access: Option<Access>,

    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct Source {
    pub name: String,

    #[serde(default)]
    pub version: String,

    #[serde(rename = "type")]
    pub source_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access: Option<Access>,

    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

/// An untyped access: its `type` plus whatever fields that type defines.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct Access {
    #[serde(rename = "type")]
    pub access_type: String,

    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// Typed view of the access types this crate understands.
#[derive(Debug, Clone, PartialEq)]
pub enum AccessKind {
    OciRegistry { image_reference: String },
    LocalOciBlob { digest: String, media_type: Option<String> },
    LocalFilesystem(BlobInput),
    InlineJsonSchema { schema: Value },
    Unknown(String),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OciRegistryFields {
    image_reference: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LocalOciBlobFields {
    digest: String,
    #[serde(default)]
    media_type: Option<String>,
}

#[derive(Deserialize)]
struct LocalFilesystemFields {
    input: BlobInput,
}

#[derive(Deserialize)]
struct InlineJsonSchemaFields {
    schema: Value,
}

impl Access {
    pub fn new(access_type: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            access_type: access_type.into(),
            fields,
        }
    }

    /// A `localFilesystemResource` access carrying the given input.
    pub fn local_filesystem(input: &BlobInput) -> Result<Self> {
        let input = serde_json::to_value(input).map_err(|e| Error::Encode(e.to_string()))?;
        let mut fields = Map::new();
        fields.insert("input".to_string(), input);
        Ok(Self::new(LOCAL_FILESYSTEM_TYPE, fields))
    }

    /// Decode the fields according to the access type.
    pub fn kind(&self) -> Result<AccessKind> {
        let fields = Value::Object(self.fields.clone());
        let malformed = |e: serde_json::Error| Error::MalformedDescriptor {
            reason: format!("invalid {} access: {e}", self.access_type),
        };
        let kind = match self.access_type.as_str() {
            OCI_REGISTRY_TYPE => {
                let f: OciRegistryFields = serde_json::from_value(fields).map_err(malformed)?;
                AccessKind::OciRegistry {
                    image_reference: f.image_reference,
                }
            }
            LOCAL_OCI_BLOB_TYPE => {
                let f: LocalOciBlobFields = serde_json::from_value(fields).map_err(malformed)?;
                AccessKind::LocalOciBlob {
                    digest: f.digest,
                    media_type: f.media_type,
                }
            }
            LOCAL_FILESYSTEM_TYPE => {
                let f: LocalFilesystemFields = serde_json::from_value(fields).map_err(malformed)?;
                AccessKind::LocalFilesystem(f.input)
            }
            INLINE_JSON_SCHEMA_TYPE => {
                let f: InlineJsonSchemaFields = serde_json::from_value(fields).map_err(malformed)?;
                AccessKind::InlineJsonSchema { schema: f.schema }
            }
            other => AccessKind::Unknown(other.to_string()),
        };
        Ok(kind)
    }
}

impl ComponentDescriptor {
    /// An empty v2 descriptor, used when rendering without a descriptor.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            meta: DescriptorMeta {
                schema_version: SCHEMA_VERSION_V2.to_string(),
            },
            component: ComponentSpec {
                name: name.into(),
                version: version.into(),
                provider: Value::String("internal".to_string()),
                ..Default::default()
            },
            extra: IndexMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.component.name
    }

    pub fn version(&self) -> &str {
        &self.component.version
    }

    /// The repository context the component is currently stored in.
    pub fn effective_repository_context(&self) -> Option<&RepositoryContext> {
        self.component.repository_contexts.last()
    }

    pub fn resource(&self, name: &str) -> Option<&Resource> {
        self.component.resources.iter().find(|r| r.name == name)
    }

    pub fn component_reference(&self, name: &str) -> Option<&ComponentReference> {
        self.component
            .component_references
            .iter()
            .find(|r| r.name == name)
    }

    /// The descriptor as a JSON value, as seen by templates.
    pub fn to_value(&self) -> Result<Value> {
        serde_json::to_value(self).map_err(|e| Error::Encode(e.to_string()))
    }
}
