// Copyright (c) Contributors to the SPK project.
// SPDX-License-Identifier: Apache-2.0

//! Component descriptors and blobs stored in OCI registries.
//!
//! A component `name:version` in a repository context with base URL
//! `example.com/components` lives at
//! `example.com/components/component-descriptors/<name>:<version>`. The
//! manifest of that artifact has one layer holding the descriptor.

use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use crate::blob::{BlobInfo, BlobResolver, DEFAULT_FILE_MEDIA_TYPE, HashingWriter, unsupported};
use crate::cancel::CancelToken;
use crate::codec::decode_descriptor;
use crate::descriptor::{AccessKind, ComponentDescriptor, OCI_REGISTRY_TYPE, RepositoryContext, Resource};
use crate::resolver::ComponentResolver;
use crate::{Error, Result};

#[cfg(test)]
#[path = "./oci_test.rs"]
mod oci_test;

/// Registry used when a reference names none.
const DEFAULT_REGISTRY: &str = "docker.io";

const DEFAULT_TAG: &str = "latest";

pub const COMPONENT_DESCRIPTOR_PATH: &str = "component-descriptors";
pub const COMPONENT_DESCRIPTOR_FILENAME: &str = "component-descriptor.yaml";

pub const COMPONENT_DESCRIPTOR_JSON_MEDIA_TYPE: &str =
    "application/vnd.gardener.cloud.cnudie.component-descriptor.v2+json";
pub const COMPONENT_DESCRIPTOR_YAML_MEDIA_TYPE: &str =
    "application/vnd.gardener.cloud.cnudie.component-descriptor.v2+yaml";
pub const COMPONENT_DESCRIPTOR_TAR_MEDIA_TYPE: &str =
    "application/vnd.gardener.cloud.cnudie.component-descriptor.v2+yaml+tar";

pub const OCI_MANIFEST_MEDIA_TYPE: &str = "application/vnd.oci.image.manifest.v1+json";
pub const DOCKER_MANIFEST_MEDIA_TYPE: &str =
    "application/vnd.docker.distribution.manifest.v2+json";

/// A parsed OCI reference such as `ghcr.io/org/repo:v1` or `repo@sha256:…`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OciReference {
    pub registry: String,
    pub repository: String,
    pub tag: Option<String>,
    pub digest: Option<String>,
}

impl OciReference {
    pub fn parse(reference: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::Registry {
            reference: reference.to_string(),
            reason: reason.to_string(),
        };

        let reference = reference.trim();
        let reference = reference
            .strip_prefix("https://")
            .or_else(|| reference.strip_prefix("http://"))
            .unwrap_or(reference);
        if reference.is_empty() {
            return Err(invalid("empty reference"));
        }

        let (name_tag, digest) = match reference.rsplit_once('@') {
            Some((name, digest)) => {
                if !digest.contains(':') {
                    return Err(invalid("digest must be <algorithm>:<hex>"));
                }
                (name, Some(digest.to_string()))
            }
            None => (reference, None),
        };

        // a tag is a colon after the last slash; a colon before it is a port
        let last_segment_start = name_tag.rfind('/').map(|i| i + 1).unwrap_or(0);
        let (name, tag) = match name_tag[last_segment_start..].rfind(':') {
            Some(i) => {
                let split = last_segment_start + i;
                (&name_tag[..split], Some(name_tag[split + 1..].to_string()))
            }
            None => (name_tag, None),
        };
        if matches!(&tag, Some(t) if t.is_empty()) {
            return Err(invalid("empty tag"));
        }

        let (registry, repository) = match name.split_once('/') {
            Some((first, rest))
                if first.contains('.') || first.contains(':') || first == "localhost" =>
            {
                (first.to_string(), rest.to_string())
            }
            _ => (DEFAULT_REGISTRY.to_string(), name.to_string()),
        };
        if repository.is_empty() {
            return Err(invalid("empty repository"));
        }

        let tag = match (&tag, &digest) {
            (None, None) => Some(DEFAULT_TAG.to_string()),
            _ => tag,
        };
        Ok(Self {
            registry,
            repository,
            tag,
            digest,
        })
    }

    /// Reference of the descriptor artifact of a component.
    pub fn for_component(base_url: &str, name: &str, version: &str) -> Result<Self> {
        Self::parse(&format!(
            "{}/{COMPONENT_DESCRIPTOR_PATH}/{name}:{version}",
            base_url.trim_end_matches('/')
        ))
    }

    /// The digest if present, else the tag.
    pub fn reference(&self) -> &str {
        self.digest
            .as_deref()
            .or(self.tag.as_deref())
            .unwrap_or(DEFAULT_TAG)
    }
}

impl std::fmt::Display for OciReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.registry, self.repository)?;
        if let Some(tag) = &self.tag {
            write!(f, ":{tag}")?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{digest}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    #[serde(default)]
    pub schema_version: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,

    #[serde(default)]
    pub config: OciDescriptor,

    #[serde(default)]
    pub layers: Vec<OciDescriptor>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OciDescriptor {
    #[serde(default)]
    pub media_type: String,
    #[serde(default)]
    pub digest: String,
    #[serde(default)]
    pub size: u64,
}

/// Low level registry access.
pub trait OciClient {
    /// Raw manifest bytes, or `None` if the registry does not know the reference.
    fn get_manifest(&self, reference: &OciReference) -> Result<Option<Vec<u8>>>;

    /// Stream the blob `digest` of the reference's repository into `sink`.
    fn fetch_blob(&self, reference: &OciReference, digest: &str, sink: &mut dyn Write)
    -> Result<u64>;
}

impl<T: OciClient + ?Sized> OciClient for &T {
    fn get_manifest(&self, reference: &OciReference) -> Result<Option<Vec<u8>>> {
        (**self).get_manifest(reference)
    }

    fn fetch_blob(
        &self,
        reference: &OciReference,
        digest: &str,
        sink: &mut dyn Write,
    ) -> Result<u64> {
        (**self).fetch_blob(reference, digest, sink)
    }
}

/// Resolves components from OCI repository contexts.
pub struct OciComponentResolver<C> {
    client: C,
}

impl<C: OciClient> OciComponentResolver<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }

    fn fetch_descriptor(
        &self,
        cancel: &CancelToken,
        reference: &OciReference,
        name: &str,
        version: &str,
    ) -> Result<ComponentDescriptor> {
        let registry_err = |reason: String| Error::Registry {
            reference: reference.to_string(),
            reason,
        };

        cancel.check()?;
        let Some(raw) = self.client.get_manifest(reference)? else {
            return Err(Error::ComponentNotFound {
                name: name.to_string(),
                version: version.to_string(),
            });
        };
        let manifest: Manifest = serde_json::from_slice(&raw)
            .map_err(|e| registry_err(format!("invalid manifest: {e}")))?;

        let layer = manifest
            .layers
            .iter()
            .find(|l| {
                matches!(
                    l.media_type.as_str(),
                    COMPONENT_DESCRIPTOR_JSON_MEDIA_TYPE
                        | COMPONENT_DESCRIPTOR_YAML_MEDIA_TYPE
                        | COMPONENT_DESCRIPTOR_TAR_MEDIA_TYPE
                )
            })
            .ok_or_else(|| registry_err("manifest has no component descriptor layer".into()))?;

        cancel.check()?;
        let mut data = Vec::new();
        self.client.fetch_blob(reference, &layer.digest, &mut data)?;

        if layer.media_type == COMPONENT_DESCRIPTOR_TAR_MEDIA_TYPE {
            data = descriptor_from_tar(&data).map_err(|e| registry_err(e.to_string()))?;
        }
        decode_descriptor(&data)
    }
}

fn descriptor_from_tar(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut archive = tar::Archive::new(data);
    for entry in archive.entries()? {
        let mut entry = entry?;
        if entry.path()?.as_os_str() == COMPONENT_DESCRIPTOR_FILENAME {
            let mut out = Vec::new();
            entry.read_to_end(&mut out)?;
            return Ok(out);
        }
    }
    Err(std::io::Error::new(
        std::io::ErrorKind::NotFound,
        format!("{COMPONENT_DESCRIPTOR_FILENAME} not found in layer"),
    ))
}

impl<C: OciClient> ComponentResolver for OciComponentResolver<C> {
    fn resolve_with_blobs<'s>(
        &'s self,
        cancel: &CancelToken,
        repo_ctx: Option<&RepositoryContext>,
        name: &str,
        version: &str,
    ) -> Result<(ComponentDescriptor, Box<dyn BlobResolver + 's>)> {
        let Some(ctx) = repo_ctx else {
            tracing::debug!(component = %name, %version, "no repository context to look in");
            return Err(Error::ComponentNotFound {
                name: name.to_string(),
                version: version.to_string(),
            });
        };
        if ctx.context_type != OCI_REGISTRY_TYPE {
            return Err(Error::UnsupportedAccess {
                access_type: ctx.context_type.clone(),
            });
        }

        let reference = OciReference::for_component(&ctx.base_url, name, version)?;
        tracing::debug!(%reference, "fetching component descriptor");
        let cd = self.fetch_descriptor(cancel, &reference, name, version)?;
        let blobs = OciBlobResolver {
            client: &self.client,
            component: reference,
        };
        Ok((cd, Box::new(blobs)))
    }
}

/// Serves `localOciBlob` and `ociRegistry` accesses of one component.
pub struct OciBlobResolver<'a, C> {
    client: &'a C,
    component: OciReference,
}

impl<'a, C: OciClient> OciBlobResolver<'a, C> {
    pub fn new(client: &'a C, component: OciReference) -> Self {
        Self { client, component }
    }
}

impl<C: OciClient> BlobResolver for OciBlobResolver<'_, C> {
    fn resolve(
        &self,
        cancel: &CancelToken,
        resource: &Resource,
        sink: &mut dyn Write,
    ) -> Result<BlobInfo> {
        let Some(access) = &resource.access else {
            return Err(unsupported(resource));
        };
        match access.kind()? {
            AccessKind::LocalOciBlob { digest, media_type } => {
                cancel.check()?;
                let mut hashing = HashingWriter::new(sink);
                self.client
                    .fetch_blob(&self.component, &digest, &mut hashing)?;
                let media_type = media_type.unwrap_or_else(|| DEFAULT_FILE_MEDIA_TYPE.to_string());
                let info = hashing.finish(media_type);
                if info.digest != digest {
                    return Err(Error::Registry {
                        reference: self.component.to_string(),
                        reason: format!("blob digest mismatch: expected {digest}, got {}", info.digest),
                    });
                }
                Ok(info)
            }
            AccessKind::OciRegistry { image_reference } => {
                cancel.check()?;
                let reference = OciReference::parse(&image_reference)?;
                let raw = self.client.get_manifest(&reference)?.ok_or_else(|| Error::Registry {
                    reference: reference.to_string(),
                    reason: "manifest not found".to_string(),
                })?;
                let media_type = serde_json::from_slice::<Manifest>(&raw)
                    .ok()
                    .and_then(|m| m.media_type)
                    .unwrap_or_else(|| OCI_MANIFEST_MEDIA_TYPE.to_string());
                let mut hashing = HashingWriter::new(sink);
                hashing.write_all(&raw)?;
                Ok(hashing.finish(media_type))
            }
            _ => Err(unsupported(resource)),
        }
    }
}
