// Copyright (c) Contributors to the SPK project.
// SPDX-License-Identifier: Apache-2.0

//! User configuration.
//!
//! Read from `landscaper-cli/config.yaml` below the user's config directory:
//!
//! ```yaml
//! oci:
//!   allow_plain_http: false
//!   cache_dir: ~/.cache/landscaper-cli
//!   registry_config: ~/.docker/config.json
//! render:
//!   output_format: json
//!   max_ref_depth: 10
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

#[cfg(test)]
#[path = "./config_test.rs"]
mod config_test;

pub const CONFIG_DIR_NAME: &str = "landscaper-cli";
pub const CONFIG_FILE_NAME: &str = "config.yaml";

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub oci: OciConfig,
    pub render: RenderConfig,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct OciConfig {
    pub allow_plain_http: bool,
    pub cache_dir: Option<PathBuf>,
    /// A docker `config.json` with registry credentials.
    pub registry_config: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RenderConfig {
    pub output_format: Option<String>,
    pub max_ref_depth: Option<usize>,
}

impl Config {
    /// Where the configuration is looked up, if there is a config directory.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Load the user configuration. A missing file yields the defaults.
    pub fn load() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let invalid = |reason: String| Error::InvalidConfig {
            path: path.to_path_buf(),
            reason,
        };
        let data = std::fs::read(path).map_err(|e| invalid(e.to_string()))?;
        if data.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        let mut config: Config = serde_yaml::from_slice(&data).map_err(|e| invalid(e.to_string()))?;
        config.oci.cache_dir = config.oci.cache_dir.map(expand_home);
        config.oci.registry_config = config.oci.registry_config.map(expand_home);
        tracing::debug!(?path, "loaded configuration");
        Ok(config)
    }
}

/// Replace a leading `~` with the home directory.
fn expand_home(path: PathBuf) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path,
    }
}
