// Copyright (c) Contributors to the SPK project.
// SPDX-License-Identifier: Apache-2.0

//! landscaper-cli - local tooling for Landscaper blueprints

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use landscaper_core::{Config, RegistryClient, RegistryOptions};
use miette::Result;

mod cmd_render;
mod cmd_schema;
mod cmd_set_import_parameters;
mod cmd_validate;

use cmd_render::CmdRender;
use cmd_schema::CmdSchema;
use cmd_set_import_parameters::CmdSetImportParameters;
use cmd_validate::CmdValidate;

#[derive(Parser)]
#[clap(
    name = "landscaper-cli",
    about = "Local tooling for Landscaper blueprints",
    version,
    long_about = "Render blueprints, resolve their import schemas and edit installations without a cluster"
)]
struct Opt {
    #[clap(flatten)]
    logging: Logging,

    #[clap(subcommand)]
    cmd: Command,
}

#[derive(Parser)]
struct Logging {
    /// Increase verbosity (-v, -vv, -vvv)
    #[clap(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[clap(short, long, global = true)]
    quiet: bool,
}

/// How to reach OCI registries for components that are not available locally.
#[derive(Parser, Clone, Debug, Default)]
pub struct RegistryFlags {
    /// Talk plain HTTP to registries
    #[clap(long, env = "LANDSCAPER_CLI_ALLOW_PLAIN_HTTP")]
    pub allow_plain_http: bool,

    /// Docker config.json with registry credentials
    #[clap(long, env = "LANDSCAPER_CLI_REGISTRY_CONFIG")]
    pub registry_config: Option<PathBuf>,

    /// Directory to cache downloaded blobs in
    #[clap(long, env = "LANDSCAPER_CLI_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,
}

impl RegistryFlags {
    /// A registry client from these flags, falling back to the config file.
    pub fn client(&self, config: &Config) -> Result<RegistryClient> {
        let registry_config = self
            .registry_config
            .clone()
            .or_else(|| config.oci.registry_config.clone());
        let credentials = match registry_config {
            Some(path) => landscaper_core::registry::load_docker_credentials(&path)?,
            None => Default::default(),
        };
        Ok(RegistryClient::new(RegistryOptions {
            allow_plain_http: self.allow_plain_http || config.oci.allow_plain_http,
            cache_dir: self.cache_dir.clone().or_else(|| config.oci.cache_dir.clone()),
            credentials,
        }))
    }
}

#[derive(Subcommand)]
enum Command {
    /// Render a blueprint into deploy items and sub-installations
    Render(CmdRender),

    /// Resolve the JSON schemas of a blueprint's imports
    Schema(CmdSchema),

    /// Set import parameters of an installation to fixed values
    #[clap(alias = "sip")]
    SetImportParameters(CmdSetImportParameters),

    /// Validate a local blueprint directory
    Validate(CmdValidate),
}

impl Opt {
    fn run(self) -> Result<i32> {
        let log_level = match (self.logging.quiet, self.logging.verbose) {
            (true, _) => tracing::Level::ERROR,
            (false, 0) => tracing::Level::WARN,
            (false, 1) => tracing::Level::INFO,
            (false, 2) => tracing::Level::DEBUG,
            (false, _) => tracing::Level::TRACE,
        };

        tracing_subscriber::fmt()
            .with_max_level(log_level)
            .with_writer(std::io::stderr)
            .init();

        match self.cmd {
            Command::Render(mut cmd) => cmd.run(),
            Command::Schema(mut cmd) => cmd.run(),
            Command::SetImportParameters(mut cmd) => cmd.run(),
            Command::Validate(mut cmd) => cmd.run(),
        }
    }
}

fn main() -> Result<()> {
    let opt = Opt::parse();
    let code = opt.run()?;
    std::process::exit(code);
}
