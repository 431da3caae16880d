// Copyright (c) Contributors to the SPK project.
// SPDX-License-Identifier: Apache-2.0

//! Render a blueprint locally.

use std::path::PathBuf;

use clap::Args;
use colored::Colorize;
use landscaper_core::{
    CancelToken,
    ComponentResolver,
    Config,
    OciComponentResolver,
    OutputFormat,
    OutputKinds,
    RenderRequest,
};
use miette::Result;

/// Render a blueprint into deploy items and sub-installations
#[derive(Debug, Args)]
pub struct CmdRender {
    /// The blueprint directory
    blueprint: PathBuf,

    /// What to render: all, deployitems (di), subinstallations (subinst, inst)
    #[clap(default_value = "all")]
    outputs: String,

    /// Path to the local component descriptor
    #[clap(short = 'c', long = "component-descriptor", env = "LANDSCAPER_CLI_COMPONENT_DESCRIPTOR")]
    component_descriptor: Option<PathBuf>,

    /// Paths to additional local component descriptors
    #[clap(short = 'a', long = "additional-component-descriptor")]
    additional_component_descriptors: Vec<PathBuf>,

    /// Path to a resources file whose inputs are read from local files
    #[clap(short = 'r', long)]
    resources: Option<PathBuf>,

    /// Value files that define the imports, merged in order
    #[clap(short = 'f', long = "file")]
    value_files: Vec<PathBuf>,

    /// The output format, json or yaml
    #[clap(short = 'o', long = "output", env = "LANDSCAPER_CLI_OUTPUT_FORMAT")]
    output_format: Option<String>,

    /// Write the rendered files to this directory instead of stdout
    #[clap(short = 'w', long = "write")]
    out_dir: Option<PathBuf>,

    /// Output directory of a previous render to take the template state from
    #[clap(long, env = "LANDSCAPER_CLI_STATE_DIR")]
    state_dir: Option<PathBuf>,

    /// Maximum depth of nested JSON schema references
    #[clap(long, env = "LANDSCAPER_CLI_MAX_REF_DEPTH")]
    max_ref_depth: Option<usize>,

    #[clap(flatten)]
    registry: crate::RegistryFlags,
}

impl CmdRender {
    pub fn run(&mut self) -> Result<i32> {
        let config = Config::load()?;

        let output_format = match self.output_format.as_ref().or(config.render.output_format.as_ref()) {
            Some(format) => format.parse::<OutputFormat>()?,
            None => OutputFormat::default(),
        };
        let outputs: OutputKinds = self.outputs.parse()?;

        let request = RenderRequest {
            blueprint_path: self.blueprint.clone(),
            component_descriptor_path: self.component_descriptor.clone(),
            additional_component_descriptor_paths: self.additional_component_descriptors.clone(),
            resources_path: self.resources.clone(),
            value_files: self.value_files.clone(),
            output_format,
            output_dir: self.out_dir.clone(),
            outputs,
            state_dir: self.state_dir.clone(),
            max_ref_depth: self
                .max_ref_depth
                .or(config.render.max_ref_depth)
                .unwrap_or_default(),
        };
        let prepared = request.prepare()?;

        let remote = OciComponentResolver::new(self.registry.client(&config)?);
        let remote: &dyn ComponentResolver = &remote;
        let output = prepared.render(Some(remote), &CancelToken::new())?;

        let mut stdout = std::io::stdout().lock();
        prepared.materialize(&output, &mut stdout)?;

        if let Some(dir) = &self.out_dir {
            eprintln!(
                "{} rendered {} deploy items and {} subinstallations to {}",
                "✓".green(),
                output.deploy_items.len(),
                output.subinstallations.len(),
                dir.display()
            );
        }
        Ok(0)
    }
}
