// Copyright (c) Contributors to the SPK project.
// SPDX-License-Identifier: Apache-2.0

//! The render command as a library: read all inputs from disk, render,
//! and write the result.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::blueprint::{BLUEPRINT_FILENAME, Blueprint, SubinstallationTemplate};
use crate::cancel::CancelToken;
use crate::codec::{OutputFormat, decode_blueprint, decode_descriptor};
use crate::descriptor::ComponentDescriptor;
use crate::error::StepContext;
use crate::imports::{ImportMap, load_value_files};
use crate::output::{DEPLOY_ITEMS_DIR, Materializer, OutputKinds, STATE_FILE, SUBINSTALLATIONS_DIR};
use crate::render::{RenderInput, RenderOutput, RenderState, Renderer, StateMap};
use crate::resolver::{ComponentResolver, DescriptorTable, LayeredResolver};
use crate::resources::{add_local_resources, read_resource_list};
use crate::schema::{JsonSchemaNode, SchemaLoader, SchemaResolver, resolve_import_schemas};
use crate::template::GoTemplateEngine;
use crate::vfs::OverlayFs;
use crate::{Error, Result};

#[cfg(test)]
#[path = "./pipeline_test.rs"]
mod pipeline_test;

/// The inputs of a render, as given on the command line.
#[derive(Debug, Clone, Default)]
pub struct RenderRequest {
    /// The blueprint directory, or the blueprint file itself.
    pub blueprint_path: PathBuf,
    pub component_descriptor_path: Option<PathBuf>,
    pub additional_component_descriptor_paths: Vec<PathBuf>,
    /// Resources whose blobs are read from local files.
    pub resources_path: Option<PathBuf>,
    pub value_files: Vec<PathBuf>,
    pub output_format: OutputFormat,
    /// Write one file per document here instead of printing.
    pub output_dir: Option<PathBuf>,
    pub outputs: OutputKinds,
    /// Output directory of a previous render whose state is fed back.
    pub state_dir: Option<PathBuf>,
    /// Limit for nested schema references, zero for the default.
    pub max_ref_depth: usize,
}

/// All inputs of a render, read and decoded.
#[derive(Debug)]
pub struct PreparedRender {
    pub blueprint: Blueprint,
    pub blueprint_fs: OverlayFs,
    pub component: Option<ComponentDescriptor>,
    pub additional: Vec<ComponentDescriptor>,
    pub imports: ImportMap,
    pub state: RenderState,
    pub table: DescriptorTable,
    pub resources_fs: OverlayFs,
    pub output_format: OutputFormat,
    pub output_dir: Option<PathBuf>,
    pub outputs: OutputKinds,
    pub max_ref_depth: usize,
}

#[derive(Deserialize)]
struct StateDocument {
    #[serde(default)]
    state: StateMap,
}

fn read(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|error| Error::ReadFailed {
        path: path.to_path_buf(),
        error,
    })
}

impl RenderRequest {
    /// Read and decode every input file.
    pub fn prepare(&self) -> Result<PreparedRender> {
        let (blueprint, blueprint_fs) = read_blueprint(&self.blueprint_path)?;

        let component = self
            .component_descriptor_path
            .as_deref()
            .map(|path| read(path).and_then(|data| decode_descriptor(&data)))
            .transpose()
            .step("reading component descriptor")?;
        let additional = self
            .additional_component_descriptor_paths
            .iter()
            .map(|path| read(path).and_then(|data| decode_descriptor(&data)))
            .collect::<Result<Vec<_>>>()
            .step("reading additional component descriptors")?;

        let (component, resources_fs) = self
            .attach_resources(component)
            .step("reading resources")?;

        let mut table = DescriptorTable::new();
        for cd in component.iter().chain(additional.iter()) {
            if !table.insert(cd.clone()) {
                tracing::warn!(
                    component = %cd.name(),
                    version = %cd.version(),
                    "component descriptor given more than once, keeping the first"
                );
            }
        }

        let imports = load_value_files(self.value_files.as_slice()).step("reading value files")?;
        let state = match &self.state_dir {
            Some(dir) => read_state(dir).step("reading previous state")?,
            None => RenderState::default(),
        };

        Ok(PreparedRender {
            blueprint,
            blueprint_fs,
            component,
            additional,
            imports,
            state,
            table,
            resources_fs,
            output_format: self.output_format,
            output_dir: self.output_dir.clone(),
            outputs: self.outputs,
            max_ref_depth: self.max_ref_depth,
        })
    }

    /// Add the resource list to the component under edit. Local resource
    /// paths are relative to the list.
    fn attach_resources(
        &self,
        component: Option<ComponentDescriptor>,
    ) -> Result<(Option<ComponentDescriptor>, OverlayFs)> {
        let Some(path) = &self.resources_path else {
            return Ok((component, OverlayFs::new(std::env::current_dir()?)));
        };
        let Some(component) = component else {
            return Err(Error::MalformedDescriptor {
                reason: "a resource list needs a component descriptor to be added to".to_string(),
            });
        };
        let resources = read_resource_list(&read(path)?)?;
        let root = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => std::env::current_dir()?,
        };
        tracing::debug!(count = resources.len(), root = ?root, "adding local resources");
        let component = add_local_resources(&component, &resources)?;
        Ok((Some(component), OverlayFs::new(root)))
    }
}

/// Read `blueprint.yaml` from a blueprint directory, or from the directory
/// of a blueprint file. The overlay is rooted at that directory.
pub fn read_blueprint(path: &Path) -> Result<(Blueprint, OverlayFs)> {
    let blueprint_dir = dunce::canonicalize(path)
        .map_err(|error| Error::ReadFailed {
            path: path.to_path_buf(),
            error,
        })
        .step("locating blueprint")?;
    let blueprint_dir = if blueprint_dir.is_file() {
        blueprint_dir
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or(blueprint_dir)
    } else {
        blueprint_dir
    };
    tracing::info!(dir = ?blueprint_dir, "reading blueprint");
    let blueprint_fs = OverlayFs::new(&blueprint_dir);
    let blueprint = blueprint_fs
        .read(BLUEPRINT_FILENAME)
        .map_err(|error| Error::ReadFailed {
            path: blueprint_dir.join(BLUEPRINT_FILENAME),
            error,
        })
        .and_then(|data| decode_blueprint(&data))
        .step("reading blueprint")?;
    Ok((blueprint, blueprint_fs))
}

/// Check a blueprint directory without rendering it: the blueprint's own
/// structure and that every file it points to exists.
pub fn validate_blueprint(path: &Path) -> Result<Blueprint> {
    let (blueprint, blueprint_fs) = read_blueprint(path)?;
    let mut reasons = blueprint.validate();

    let executions = blueprint
        .deploy_executions
        .iter()
        .chain(&blueprint.export_executions)
        .chain(&blueprint.subinstallation_executions);
    for exec in executions {
        if let Some(file) = &exec.file {
            if !blueprint_fs.exists(file) {
                reasons.push(format!("execution '{}': file '{file}' does not exist", exec.name));
            }
        }
    }
    for sub in &blueprint.subinstallations {
        if let SubinstallationTemplate::File(sub) = sub {
            if !blueprint_fs.exists(&sub.file) {
                reasons.push(format!("subinstallation file '{}' does not exist", sub.file));
            }
        }
    }

    if reasons.is_empty() {
        Ok(blueprint)
    } else {
        Err(Error::InvalidBlueprint { reasons })
    }
}

/// The state files of a previous render below `dir`. Missing files are empty.
pub fn read_state(dir: &Path) -> Result<RenderState> {
    let load = |kind: &str| -> Result<StateMap> {
        let path = dir.join(kind).join(STATE_FILE);
        let data = match std::fs::read(&path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(StateMap::new()),
            Err(error) => return Err(Error::ReadFailed { path, error }),
        };
        let doc: StateDocument =
            serde_yaml::from_slice(&data).map_err(|e| Error::MalformedValueFile {
                path,
                reason: e.to_string(),
            })?;
        Ok(doc.state)
    };
    Ok(RenderState {
        deploy_items: load(DEPLOY_ITEMS_DIR)?,
        subinstallations: load(SUBINSTALLATIONS_DIR)?,
    })
}

impl PreparedRender {
    /// The local descriptors in front of an optional remote resolver.
    pub fn resolver<'a>(&self, remote: Option<&'a dyn ComponentResolver>) -> LayeredResolver<'a> {
        LayeredResolver::new(self.table.clone(), remote, self.resources_fs.clone())
    }

    pub fn render(
        &self,
        remote: Option<&dyn ComponentResolver>,
        cancel: &CancelToken,
    ) -> Result<RenderOutput> {
        let resolver = self.resolver(remote);
        Renderer::new(&GoTemplateEngine, &resolver)
            .with_cancel(cancel.clone())
            .render(RenderInput {
                blueprint: &self.blueprint,
                blueprint_fs: &self.blueprint_fs,
                component: self.component.as_ref(),
                additional: &self.additional,
                imports: self.imports.clone(),
                state: self.state.clone(),
                outputs: self.outputs,
            })
            .step("rendering blueprint")
    }

    /// The resolved schema of every import that declares one.
    pub fn import_schemas(
        &self,
        remote: Option<&dyn ComponentResolver>,
        cancel: &CancelToken,
    ) -> Result<Vec<(String, Vec<JsonSchemaNode>)>> {
        let resolver = self.resolver(remote);
        let schemas = SchemaResolver::new(
            SchemaLoader {
                local_types: Some(&self.blueprint.local_types),
                blueprint_fs: Some(&self.blueprint_fs),
                component: self.component.as_ref(),
                resolver: Some(&resolver),
            },
            self.max_ref_depth,
        )
        .with_cancel(cancel.clone());
        resolve_import_schemas(&self.blueprint, &schemas).step("resolving import schemas")
    }

    /// Write the output to the output directory if one was given, to `out`
    /// otherwise.
    pub fn materialize(&self, output: &RenderOutput, out: &mut dyn Write) -> Result<()> {
        let materializer = Materializer::new(self.output_format);
        match &self.output_dir {
            Some(dir) => {
                materializer.write_dir(output, dir).step("writing output")?;
            }
            None => materializer.write_to(output, out).step("writing output")?,
        }
        Ok(())
    }
}
