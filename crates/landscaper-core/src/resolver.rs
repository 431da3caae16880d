// Copyright (c) Contributors to the SPK project.
// SPDX-License-Identifier: Apache-2.0

//! Component descriptor lookup across local files and a remote store.

use indexmap::IndexMap;

use crate::blob::{BlobResolver, EmptyBlobResolver, LocalBlobResolver};
use crate::cancel::CancelToken;
use crate::descriptor::{ComponentDescriptor, RepositoryContext};
use crate::vfs::OverlayFs;
use crate::{Error, Result};

#[cfg(test)]
#[path = "./resolver_test.rs"]
mod resolver_test;

/// Finds component descriptors and the blobs of their resources.
pub trait ComponentResolver {
    /// The descriptor together with a resolver for its resources' blobs.
    fn resolve_with_blobs<'s>(
        &'s self,
        cancel: &CancelToken,
        repo_ctx: Option<&RepositoryContext>,
        name: &str,
        version: &str,
    ) -> Result<(ComponentDescriptor, Box<dyn BlobResolver + 's>)>;

    fn resolve(
        &self,
        cancel: &CancelToken,
        repo_ctx: Option<&RepositoryContext>,
        name: &str,
        version: &str,
    ) -> Result<ComponentDescriptor> {
        self.resolve_with_blobs(cancel, repo_ctx, name, version)
            .map(|(cd, _)| cd)
    }
}

/// Descriptors keyed by name and version, in insertion order.
///
/// The first descriptor inserted under a key is kept; later inserts with
/// the same key are ignored.
#[derive(Debug, Default, Clone)]
pub struct DescriptorTable {
    entries: IndexMap<(String, String), ComponentDescriptor>,
}

impl DescriptorTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a descriptor. Returns false if its key was already taken.
    pub fn insert(&mut self, cd: ComponentDescriptor) -> bool {
        let key = (cd.component.name.clone(), cd.component.version.clone());
        if self.entries.contains_key(&key) {
            tracing::debug!(
                component = %key.0,
                version = %key.1,
                "ignoring descriptor shadowed by an earlier one"
            );
            return false;
        }
        self.entries.insert(key, cd);
        true
    }

    pub fn get(&self, name: &str, version: &str) -> Option<&ComponentDescriptor> {
        self.entries.get(&(name.to_string(), version.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ComponentDescriptor> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Local descriptors in front of an optional remote resolver.
///
/// Descriptors in the table win. Their blobs are served from the
/// resources overlay first, then from whatever the remote resolver
/// offers for the same component.
pub struct LayeredResolver<'a> {
    table: DescriptorTable,
    inner: Option<&'a dyn ComponentResolver>,
    resources: OverlayFs,
}

impl<'a> LayeredResolver<'a> {
    pub fn new(
        table: DescriptorTable,
        inner: Option<&'a dyn ComponentResolver>,
        resources: OverlayFs,
    ) -> Self {
        Self {
            table,
            inner,
            resources,
        }
    }

    pub fn table(&self) -> &DescriptorTable {
        &self.table
    }

    pub fn resources(&self) -> &OverlayFs {
        &self.resources
    }
}

impl ComponentResolver for LayeredResolver<'_> {
    fn resolve_with_blobs<'s>(
        &'s self,
        cancel: &CancelToken,
        repo_ctx: Option<&RepositoryContext>,
        name: &str,
        version: &str,
    ) -> Result<(ComponentDescriptor, Box<dyn BlobResolver + 's>)> {
        if let Some(cd) = self.table.get(name, version) {
            tracing::debug!(component = %name, %version, "resolved from local descriptors");
            let remote: Box<dyn BlobResolver + 's> = match self.inner {
                Some(inner) => {
                    let ctx = repo_ctx.or(cd.effective_repository_context());
                    match inner.resolve_with_blobs(cancel, ctx, name, version) {
                        Ok((_, blobs)) => blobs,
                        Err(err) if err.is_cancelled() => return Err(err),
                        Err(err) => {
                            tracing::debug!(
                                component = %name,
                                %version,
                                %err,
                                "no remote blobs for local component"
                            );
                            Box::new(EmptyBlobResolver)
                        }
                    }
                }
                None => Box::new(EmptyBlobResolver),
            };
            let blobs = LocalBlobResolver::new(&self.resources, remote);
            return Ok((cd.clone(), Box::new(blobs)));
        }

        match self.inner {
            Some(inner) => inner.resolve_with_blobs(cancel, repo_ctx, name, version),
            None => Err(Error::ComponentNotFound {
                name: name.to_string(),
                version: version.to_string(),
            }),
        }
    }
}
