// Copyright (c) Contributors to the SPK project.
// SPDX-License-Identifier: Apache-2.0

//! Show the resolved JSON schemas of a blueprint's imports.

use std::path::PathBuf;

use clap::Args;
use colored::Colorize;
use landscaper_core::schema::render_schema_list;
use landscaper_core::{CancelToken, ComponentResolver, Config, OciComponentResolver, RenderRequest};
use miette::Result;

/// Resolve the JSON schemas of a blueprint's imports
#[derive(Debug, Args)]
pub struct CmdSchema {
    /// The blueprint directory
    blueprint: PathBuf,

    /// Only show the schema of this import
    #[clap(short, long)]
    import: Option<String>,

    /// Path to the local component descriptor
    #[clap(short = 'c', long = "component-descriptor", env = "LANDSCAPER_CLI_COMPONENT_DESCRIPTOR")]
    component_descriptor: Option<PathBuf>,

    /// Paths to additional local component descriptors
    #[clap(short = 'a', long = "additional-component-descriptor")]
    additional_component_descriptors: Vec<PathBuf>,

    /// Path to a resources file whose inputs are read from local files
    #[clap(short = 'r', long)]
    resources: Option<PathBuf>,

    /// Maximum depth of nested JSON schema references
    #[clap(long, env = "LANDSCAPER_CLI_MAX_REF_DEPTH")]
    max_ref_depth: Option<usize>,

    #[clap(flatten)]
    registry: crate::RegistryFlags,
}

impl CmdSchema {
    pub fn run(&mut self) -> Result<i32> {
        let config = Config::load()?;
        let request = RenderRequest {
            blueprint_path: self.blueprint.clone(),
            component_descriptor_path: self.component_descriptor.clone(),
            additional_component_descriptor_paths: self.additional_component_descriptors.clone(),
            resources_path: self.resources.clone(),
            max_ref_depth: self
                .max_ref_depth
                .or(config.render.max_ref_depth)
                .unwrap_or_default(),
            ..Default::default()
        };
        let prepared = request.prepare()?;

        let remote = OciComponentResolver::new(self.registry.client(&config)?);
        let remote: &dyn ComponentResolver = &remote;
        let schemas = prepared.import_schemas(Some(remote), &CancelToken::new())?;

        let mut found = false;
        for (name, nodes) in schemas {
            if self.import.as_ref().is_some_and(|wanted| wanted != &name) {
                continue;
            }
            found = true;
            println!("{}", format!("Import '{name}'").bold());
            println!("{}\n", render_schema_list(&nodes)?);
        }

        if !found {
            match &self.import {
                Some(name) => eprintln!("{} import '{name}' has no schema", "Warning:".yellow()),
                None => eprintln!("{} no import defines a schema", "Warning:".yellow()),
            }
            return Ok(1);
        }
        Ok(0)
    }
}
