// Copyright (c) Contributors to the SPK project.
// SPDX-License-Identifier: Apache-2.0

//! Writing render results to stdout or to a directory.

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Serialize;

use crate::codec::OutputFormat;
use crate::render::{RenderOutput, StateMap};
use crate::vfs::OverlayFs;
use crate::{Error, Result};

#[cfg(test)]
#[path = "./output_test.rs"]
mod output_test;

pub const DEPLOY_ITEMS_DIR: &str = "deployitems";
pub const SUBINSTALLATIONS_DIR: &str = "subinstallations";
pub const STATE_FILE: &str = "state";

const RULE: &str = "--------------------------------------";

const NO_DEPLOY_ITEMS: &str = "No deploy items defined";
const NO_SUBINSTALLATIONS: &str = "No subinstallations defined";

/// Which kinds of rendered objects are wanted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputKinds {
    pub deploy_items: bool,
    pub subinstallations: bool,
}

impl OutputKinds {
    pub const ALL: OutputKinds = OutputKinds {
        deploy_items: true,
        subinstallations: true,
    };

    pub const NONE: OutputKinds = OutputKinds {
        deploy_items: false,
        subinstallations: false,
    };
}

impl Default for OutputKinds {
    fn default() -> Self {
        Self::ALL
    }
}

impl FromStr for OutputKinds {
    type Err = Error;

    /// Parse a comma separated list such as `di,subinst` or `all`.
    fn from_str(s: &str) -> Result<Self> {
        let mut kinds = Self::NONE;
        for term in s.split(',').map(str::trim) {
            match term {
                "all" => return Ok(Self::ALL),
                "deployitems" | "di" => kinds.deploy_items = true,
                "subinstallations" | "subinst" | "inst" => kinds.subinstallations = true,
                other => {
                    return Err(Error::UnsupportedOutputKind {
                        given: other.to_string(),
                    });
                }
            }
        }
        Ok(kinds)
    }
}

impl fmt::Display for OutputKinds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        if self.deploy_items {
            names.push(DEPLOY_ITEMS_DIR);
        }
        if self.subinstallations {
            names.push(SUBINSTALLATIONS_DIR);
        }
        f.write_str(&names.join(","))
    }
}

/// One encoded object, addressed as `<kind>/<name>`.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputDocument {
    pub kind: &'static str,
    pub name: String,
    pub data: Vec<u8>,
}

impl OutputDocument {
    pub fn path(&self) -> PathBuf {
        Path::new(self.kind).join(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OutputEntry {
    /// A requested kind has nothing to show.
    Notice(&'static str),
    Document(OutputDocument),
}

#[derive(Serialize)]
struct StateDocument<'a> {
    state: &'a StateMap,
}

/// Encodes a [`RenderOutput`] and writes it out.
#[derive(Debug, Clone, Copy, Default)]
pub struct Materializer {
    format: OutputFormat,
}

impl Materializer {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Everything to be written, in output order: deploy item state, deploy
    /// items, sub-installation state, sub-installations.
    pub fn entries(&self, output: &RenderOutput) -> Result<Vec<OutputEntry>> {
        let mut entries = Vec::new();
        if output.outputs.deploy_items {
            if output.deploy_items.is_empty() {
                entries.push(OutputEntry::Notice(NO_DEPLOY_ITEMS));
            }
            entries.push(self.state_entry(DEPLOY_ITEMS_DIR, &output.deploy_item_state)?);
            for rendered in &output.deploy_items {
                entries.push(OutputEntry::Document(OutputDocument {
                    kind: DEPLOY_ITEMS_DIR,
                    name: rendered.item.metadata.name.clone(),
                    data: self.format.encode(&rendered.item)?,
                }));
            }
        }
        if output.outputs.subinstallations {
            if output.subinstallations.is_empty() {
                entries.push(OutputEntry::Notice(NO_SUBINSTALLATIONS));
            }
            entries.push(self.state_entry(SUBINSTALLATIONS_DIR, &output.subinstallation_state)?);
            for inst in &output.subinstallations {
                entries.push(OutputEntry::Document(OutputDocument {
                    kind: SUBINSTALLATIONS_DIR,
                    name: inst.name().to_string(),
                    data: self.format.encode(inst)?,
                }));
            }
        }
        Ok(entries)
    }

    fn state_entry(&self, kind: &'static str, state: &StateMap) -> Result<OutputEntry> {
        Ok(OutputEntry::Document(OutputDocument {
            kind,
            name: STATE_FILE.to_string(),
            data: self.format.encode(&StateDocument { state })?,
        }))
    }

    /// Write all entries to `out` in one go, each document behind a
    /// `-- <kind>/<name>` header.
    pub fn write_to(&self, output: &RenderOutput, out: &mut dyn Write) -> Result<()> {
        let mut buf = Vec::new();
        for entry in self.entries(output)? {
            match entry {
                OutputEntry::Notice(text) => writeln!(buf, "{text}")?,
                OutputEntry::Document(doc) => {
                    writeln!(buf, "{RULE}")?;
                    writeln!(buf, "-- {}/{}", doc.kind, doc.name)?;
                    writeln!(buf, "{RULE}")?;
                    buf.extend_from_slice(&doc.data);
                    buf.push(b'\n');
                }
            }
        }
        out.write_all(&buf)?;
        out.flush()?;
        Ok(())
    }

    /// Write one file per document below `dir`. Nothing is written unless
    /// every document could be staged; a failed flush removes what it wrote.
    pub fn write_dir(&self, output: &RenderOutput, dir: &Path) -> Result<Vec<PathBuf>> {
        let mut fs = OverlayFs::new(dir);
        for entry in self.entries(output)? {
            match entry {
                OutputEntry::Notice(text) => tracing::info!("{text}"),
                OutputEntry::Document(doc) => {
                    let path = doc.path();
                    fs.write(&path, doc.data).map_err(|error| Error::WriteFailed {
                        path: dir.join(&path),
                        error,
                    })?;
                }
            }
        }
        let written = fs.persist().map_err(|error| Error::WriteFailed {
            path: dir.to_path_buf(),
            error,
        })?;
        tracing::info!(count = written.len(), dir = ?dir, "wrote rendered files");
        Ok(written)
    }
}
