// Copyright (c) Contributors to the SPK project.
// SPDX-License-Identifier: Apache-2.0

//! Replace data imports of an installation with fixed values.

use std::path::PathBuf;

use clap::Args;
use colored::Colorize;
use landscaper_core::codec::{decode_installation, encode_yaml};
use landscaper_core::{Error, parse_import_parameters, set_import_parameters};
use miette::Result;

/// Set import parameters of an installation. Quote values with spaces.
#[derive(Debug, Args)]
pub struct CmdSetImportParameters {
    /// The installation file
    installation: PathBuf,

    /// Import values as NAME=VALUE
    #[clap(required = true)]
    parameters: Vec<String>,

    /// Write the result back to the installation file
    #[clap(short, long)]
    write: bool,
}

impl CmdSetImportParameters {
    pub fn run(&mut self) -> Result<i32> {
        let params = parse_import_parameters(&self.parameters)?;
        let data = std::fs::read(&self.installation).map_err(|error| Error::ReadFailed {
            path: self.installation.clone(),
            error,
        })?;
        let mut installation = decode_installation(&data)?;

        for unused in set_import_parameters(&mut installation, &params) {
            eprintln!(
                "{} no data import named '{unused}' in {}",
                "Warning:".yellow(),
                self.installation.display()
            );
        }

        let encoded = encode_yaml(&installation)?;
        if self.write {
            std::fs::write(&self.installation, &encoded).map_err(|error| Error::WriteFailed {
                path: self.installation.clone(),
                error,
            })?;
            tracing::info!(path = ?self.installation, "updated installation");
        } else {
            print!("{}", String::from_utf8_lossy(&encoded));
        }
        Ok(0)
    }
}
