// Copyright (c) Contributors to the SPK project.
// SPDX-License-Identifier: Apache-2.0

//! Check a blueprint directory without rendering it.

use std::path::PathBuf;

use clap::Args;
use colored::Colorize;
use landscaper_core::validate_blueprint;
use miette::Result;

/// Validate a local blueprint directory containing a blueprint.yaml
#[derive(Debug, Args)]
pub struct CmdValidate {
    /// The blueprint directory
    blueprint: PathBuf,
}

impl CmdValidate {
    pub fn run(&mut self) -> Result<i32> {
        validate_blueprint(&self.blueprint)?;
        println!("{} Blueprint validated without errors", "✓".green());
        Ok(0)
    }
}
