// Copyright (c) Contributors to the SPK project.
// SPDX-License-Identifier: Apache-2.0

//! Resolution of resource blobs.
//!
//! Every component comes with a [`BlobResolver`]. Remote components use
//! the registry's resolver; components loaded from local files wrap it in
//! a [`LocalBlobResolver`], which serves `localFilesystemResource` and
//! `inlineJsonSchema` accesses itself.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::write::GzEncoder;
use sha2::{Digest, Sha256};

use crate::cancel::CancelToken;
use crate::descriptor::{AccessKind, Resource};
use crate::resources::{BlobInput, BlobInputType};
use crate::vfs::OverlayFs;
use crate::{Error, Result};

#[cfg(test)]
#[path = "./blob_test.rs"]
mod blob_test;

pub const DEFAULT_FILE_MEDIA_TYPE: &str = "application/octet-stream";
pub const DEFAULT_DIR_MEDIA_TYPE: &str = "application/x-tar";
pub const JSON_SCHEMA_MEDIA_TYPE: &str = "application/schema+json";
pub const GZIP_SUFFIX: &str = "+gzip";

/// What was produced when a blob was resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobInfo {
    pub media_type: String,
    /// `sha256:<hex>` of the bytes written to the sink.
    pub digest: String,
    pub size: u64,
}

pub trait BlobResolver {
    /// Stream the blob of `resource` into `sink`.
    fn resolve(
        &self,
        cancel: &CancelToken,
        resource: &Resource,
        sink: &mut dyn Write,
    ) -> Result<BlobInfo>;

    /// Metadata of the blob. The content is produced and discarded.
    fn info(&self, cancel: &CancelToken, resource: &Resource) -> Result<BlobInfo> {
        self.resolve(cancel, resource, &mut io::sink())
    }
}

/// Resolves nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyBlobResolver;

impl BlobResolver for EmptyBlobResolver {
    fn resolve(
        &self,
        _cancel: &CancelToken,
        resource: &Resource,
        _sink: &mut dyn Write,
    ) -> Result<BlobInfo> {
        Err(unsupported(resource))
    }
}

pub(crate) fn unsupported(resource: &Resource) -> Error {
    Error::UnsupportedAccess {
        access_type: resource
            .access
            .as_ref()
            .map(|a| a.access_type.clone())
            .unwrap_or_else(|| "<none>".to_string()),
    }
}

/// Serves local inputs from an overlay and delegates everything else.
pub struct LocalBlobResolver<'a> {
    fs: &'a OverlayFs,
    inner: Box<dyn BlobResolver + 'a>,
}

impl<'a> LocalBlobResolver<'a> {
    pub fn new(fs: &'a OverlayFs, inner: Box<dyn BlobResolver + 'a>) -> Self {
        Self { fs, inner }
    }

    fn resolve_input(&self, input: &BlobInput, sink: &mut dyn Write) -> Result<BlobInfo> {
        let mut media_type = input.media_type.clone().unwrap_or_else(|| {
            match input.input_type {
                BlobInputType::File => DEFAULT_FILE_MEDIA_TYPE,
                BlobInputType::Dir => DEFAULT_DIR_MEDIA_TYPE,
            }
            .to_string()
        });

        let mut hashing = HashingWriter::new(sink);
        if input.compress_with_gzip {
            let mut gz = GzEncoder::new(&mut hashing, Compression::default());
            self.write_input(input, &mut gz)?;
            gz.finish()?;
            media_type.push_str(GZIP_SUFFIX);
        } else {
            self.write_input(input, &mut hashing)?;
        }
        Ok(hashing.finish(media_type))
    }

    fn write_input(&self, input: &BlobInput, out: &mut dyn Write) -> Result<()> {
        match input.input_type {
            BlobInputType::File => {
                let mut reader = self.fs.open(&input.path).map_err(|error| {
                    Error::ResourceNotReadable {
                        path: self.fs.host_path(&input.path),
                        error,
                    }
                })?;
                io::copy(&mut reader, out).map_err(|error| Error::ResourceNotReadable {
                    path: self.fs.host_path(&input.path),
                    error,
                })?;
                Ok(())
            }
            BlobInputType::Dir => self.write_tar(input, out),
        }
    }

    /// A tar of the input directory with sorted entries and zeroed metadata,
    /// so the same tree always yields the same digest.
    fn write_tar(&self, input: &BlobInput, out: &mut dyn Write) -> Result<()> {
        let root = crate::vfs::normalize(Path::new(&input.path));
        let not_readable = |error: io::Error| Error::ResourceNotReadable {
            path: self.fs.host_path(&root),
            error,
        };
        if !self.fs.is_dir(&root) {
            return Err(not_readable(io::Error::new(
                io::ErrorKind::NotFound,
                "input directory does not exist",
            )));
        }

        let includes = compile_patterns(&input.include_files)?;
        let excludes = compile_patterns(&input.exclude_files)?;
        let prefix = match (input.preserve_dir, root.file_name()) {
            (true, Some(name)) => PathBuf::from(name),
            _ => PathBuf::new(),
        };

        let mut builder = tar::Builder::new(out);
        for file in self.fs.walk_files(&root).map_err(not_readable)? {
            let rel = file.strip_prefix(&root).unwrap_or(&file).to_path_buf();
            if !includes.is_empty() && !includes.iter().any(|p| p.matches_path(&rel)) {
                continue;
            }
            if excludes.iter().any(|p| p.matches_path(&rel)) {
                tracing::debug!(path = ?rel, "excluding file from blob");
                continue;
            }
            let data = self.fs.read(&file).map_err(|error| Error::ResourceNotReadable {
                path: self.fs.host_path(&file),
                error,
            })?;

            let mut header = tar::Header::new_gnu();
            header.set_entry_type(tar::EntryType::Regular);
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_mtime(0);
            header.set_uid(0);
            header.set_gid(0);
            builder.append_data(&mut header, prefix.join(&rel), data.as_slice())?;
        }
        builder.finish()?;
        Ok(())
    }
}

impl BlobResolver for LocalBlobResolver<'_> {
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
            AccessKind::LocalFilesystem(input) => {
                tracing::debug!(resource = %resource.name, path = %input.path, "resolving local blob");
                self.resolve_input(&input, sink)
            }
            AccessKind::InlineJsonSchema { schema } => {
                let data =
                    serde_json::to_vec(&schema).map_err(|e| Error::Encode(e.to_string()))?;
                let mut hashing = HashingWriter::new(sink);
                hashing.write_all(&data)?;
                Ok(hashing.finish(JSON_SCHEMA_MEDIA_TYPE.to_string()))
            }
            _ => self.inner.resolve(cancel, resource, sink),
        }
    }
}

fn compile_patterns(patterns: &[String]) -> Result<Vec<glob::Pattern>> {
    patterns
        .iter()
        .map(|p| {
            glob::Pattern::new(p).map_err(|e| Error::MalformedDescriptor {
                reason: format!("invalid file pattern '{p}': {e}"),
            })
        })
        .collect()
}

/// Passes bytes through while hashing and counting them.
pub struct HashingWriter<W> {
    inner: W,
    hasher: Sha256,
    size: u64,
}

impl<W: Write> HashingWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
            size: 0,
        }
    }

    pub fn finish(self, media_type: String) -> BlobInfo {
        BlobInfo {
            media_type,
            digest: format!("sha256:{:x}", self.hasher.finalize()),
            size: self.size,
        }
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.size += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
