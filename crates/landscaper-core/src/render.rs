// Copyright (c) Contributors to the SPK project.
// SPDX-License-Identifier: Apache-2.0

//! Rendering a blueprint into deploy items and sub-installations.
//!
//! A render is a pure function of the blueprint, the component descriptors
//! it can see, the import values and the state of a previous render. All
//! validation happens before the first template runs, so an invalid input
//! never produces partial output.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::blueprint::{
    Blueprint,
    ImportDefinition,
    InstallationTemplate,
    LANDSCAPER_API_VERSION,
    SubinstallationTemplate,
    TemplateExecutor,
};
use crate::cancel::CancelToken;
use crate::descriptor::{ComponentDescriptor, DEFAULT_COMPONENT_NAME, DEFAULT_COMPONENT_VERSION};
use crate::imports::{ImportMap, is_target_reference};
use crate::installation::{INSTALLATION_KIND, Installation, InstallationSpec};
use crate::output::OutputKinds;
use crate::resolver::ComponentResolver;
use crate::template::TemplateEngine;
use crate::vfs::OverlayFs;
use crate::{Error, Result};

#[cfg(test)]
#[path = "./render_test.rs"]
mod render_test;

pub const DEFAULT_INSTALLATION_NAME: &str = "root";
pub const DEFAULT_NAMESPACE: &str = "default";
pub const DEFAULT_BLUEPRINT_RESOURCE: &str = "example-blueprint";
pub const DEPLOY_ITEM_KIND: &str = "DeployItem";

pub const EXECUTION_NAME_ANNOTATION: &str = "execution.landscaper.gardener.cloud/name";
pub const DEPENDS_ON_ANNOTATION: &str = "execution.landscaper.gardener.cloud/dependsOn";

/// Opaque template state keyed by execution name.
pub type StateMap = BTreeMap<String, Value>;

/// State of a previous render, fed back into the next one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderState {
    pub deploy_items: StateMap,
    pub subinstallations: StateMap,
}

/// Everything a single render looks at.
pub struct RenderInput<'a> {
    pub blueprint: &'a Blueprint,
    /// The blueprint directory; execution and sub-installation files are
    /// read from here.
    pub blueprint_fs: &'a OverlayFs,
    /// The component under edit. A placeholder descriptor is used when absent.
    pub component: Option<&'a ComponentDescriptor>,
    pub additional: &'a [ComponentDescriptor],
    pub imports: ImportMap,
    pub state: RenderState,
    pub outputs: OutputKinds,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeployItem {
    pub api_version: String,
    pub kind: String,
    pub metadata: ObjectMeta,
    pub spec: DeployItemSpec,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct ObjectMeta {
    pub name: String,
    pub namespace: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct DeployItemSpec {
    #[serde(rename = "type")]
    pub item_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<ObjectReference>,

    #[serde(default)]
    pub config: Value,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct ObjectReference {
    pub name: String,

    #[serde(default)]
    pub namespace: String,
}

/// A deploy item together with the execution that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedDeployItem {
    pub execution: String,
    /// Position of the item within its execution's output.
    pub index: usize,
    pub depends_on: Vec<String>,
    pub item: DeployItem,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderOutput {
    pub outputs: OutputKinds,
    pub deploy_items: Vec<RenderedDeployItem>,
    pub deploy_item_state: StateMap,
    pub subinstallations: Vec<Installation>,
    pub subinstallation_state: StateMap,
}

impl RenderOutput {
    /// The state to feed into the next render.
    pub fn state(&self) -> RenderState {
        RenderState {
            deploy_items: self.deploy_item_state.clone(),
            subinstallations: self.subinstallation_state.clone(),
        }
    }
}

/// What a deploy execution's template produces.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeployExecutionOutput {
    #[serde(default)]
    deploy_items: Vec<DeployItemTemplate>,
    #[serde(default)]
    state: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeployItemTemplate {
    name: String,
    #[serde(rename = "type")]
    item_type: String,
    #[serde(default)]
    target: Option<TargetTemplate>,
    #[serde(default)]
    config: Value,
    #[serde(default)]
    depends_on: Vec<String>,
    #[serde(default)]
    labels: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TargetTemplate {
    /// The name of a target import.
    Import { import: String },
    Reference(ObjectReference),
}

#[derive(Debug, Default, Deserialize)]
struct SubinstallationExecutionOutput {
    #[serde(default)]
    subinstallations: Vec<InstallationTemplate>,
    #[serde(default)]
    state: Option<Value>,
}

/// Runs the render phases against a template engine and a component resolver.
pub struct Renderer<'a> {
    engine: &'a dyn TemplateEngine,
    resolver: &'a dyn ComponentResolver,
    cancel: CancelToken,
}

impl<'a> Renderer<'a> {
    pub fn new(engine: &'a dyn TemplateEngine, resolver: &'a dyn ComponentResolver) -> Self {
        Self {
            engine,
            resolver,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn render(&self, mut input: RenderInput<'_>) -> Result<RenderOutput> {
        let placeholder;
        let component = match input.component {
            Some(cd) => cd,
            None => {
                placeholder = ComponentDescriptor::new(DEFAULT_COMPONENT_NAME, DEFAULT_COMPONENT_VERSION);
                &placeholder
            }
        };

        let mut imports = std::mem::take(&mut input.imports);
        validate(input.blueprint, &mut imports)?;
        let imports = declared_imports(input.blueprint, imports);

        let components = self.resolve_components(component, input.additional)?;
        let context = self.context(imports, component, &components)?;

        let mut output = RenderOutput {
            outputs: input.outputs,
            ..Default::default()
        };
        self.run_deploy_executions(&input, &context, &mut output)?;
        self.run_subinstallations(&input, &context, &mut output)?;

        if !input.outputs.deploy_items {
            output.deploy_items.clear();
            output.deploy_item_state.clear();
        }
        if !input.outputs.subinstallations {
            output.subinstallations.clear();
            output.subinstallation_state.clear();
        }
        tracing::info!(
            deploy_items = output.deploy_items.len(),
            subinstallations = output.subinstallations.len(),
            "rendered blueprint"
        );
        Ok(output)
    }

    /// The component under edit, the additional descriptors and every
    /// component the former references.
    fn resolve_components(
        &self,
        component: &ComponentDescriptor,
        additional: &[ComponentDescriptor],
    ) -> Result<Vec<ComponentDescriptor>> {
        let mut components = vec![component.clone()];
        for cd in additional {
            if !contains(&components, cd.name(), cd.version()) {
                components.push(cd.clone());
            }
        }

        let repo_ctx = component.effective_repository_context();
        for reference in &component.component.component_references {
            if contains(&components, &reference.component_name, &reference.version) {
                continue;
            }
            tracing::debug!(
                name = %reference.component_name,
                version = %reference.version,
                "resolving referenced component"
            );
            let cd = self.resolver.resolve(
                &self.cancel,
                repo_ctx,
                &reference.component_name,
                &reference.version,
            )?;
            components.push(cd);
        }
        Ok(components)
    }

    fn context(
        &self,
        imports: ImportMap,
        component: &ComponentDescriptor,
        components: &[ComponentDescriptor],
    ) -> Result<Value> {
        let mut cd_ref = Map::new();
        cd_ref.insert("componentName".into(), component.name().into());
        cd_ref.insert("version".into(), component.version().into());
        if let Some(ctx) = component.effective_repository_context() {
            let ctx = serde_json::to_value(ctx).map_err(|e| Error::Encode(e.to_string()))?;
            cd_ref.insert("repositoryContext".into(), ctx);
        }

        let components = components
            .iter()
            .map(ComponentDescriptor::to_value)
            .collect::<Result<Vec<_>>>()?;

        Ok(json!({
            "imports": imports,
            "cd": component.to_value()?,
            "components": components,
            "installation": {
                "metadata": {"name": DEFAULT_INSTALLATION_NAME, "namespace": DEFAULT_NAMESPACE},
            },
            "blueprint": {"ref": {"resourceName": DEFAULT_BLUEPRINT_RESOURCE}},
            "componentDescriptorDef": {"ref": cd_ref},
            "state": {},
        }))
    }

    /// Execute one template with the execution's previous state bound to `.state`.
    fn execute(
        &self,
        exec: &TemplateExecutor,
        blueprint_fs: &OverlayFs,
        context: &Value,
        prior: &StateMap,
    ) -> Result<String> {
        if !self.engine.supports(&exec.executor_type) {
            return Err(Error::TemplateFailure {
                execution: exec.name.clone(),
                cause: format!("unsupported template type '{}'", exec.executor_type),
            });
        }
        let template = match (&exec.template, &exec.file) {
            (Some(template), _) => template.clone(),
            (None, Some(file)) => blueprint_fs
                .read_to_string(file)
                .map_err(|error| Error::ReadFailed {
                    path: blueprint_fs.host_path(file),
                    error,
                })?,
            (None, None) => {
                return Err(Error::TemplateFailure {
                    execution: exec.name.clone(),
                    cause: "neither a template nor a file is given".to_string(),
                });
            }
        };

        let mut context = context.clone();
        let state = match prior.get(&exec.name) {
            Some(Value::Null) | None => json!({}),
            Some(state) => state.clone(),
        };
        context["state"] = state;

        tracing::debug!(execution = %exec.name, "executing template");
        self.engine.execute(&exec.name, &template, &context)
    }

    fn run_deploy_executions(
        &self,
        input: &RenderInput<'_>,
        context: &Value,
        output: &mut RenderOutput,
    ) -> Result<()> {
        let mut producers: HashMap<String, String> = HashMap::new();
        for exec in &input.blueprint.deploy_executions {
            let text = self.execute(exec, input.blueprint_fs, context, &input.state.deploy_items)?;
            let produced: DeployExecutionOutput = parse_output(&exec.name, &text)?;

            for (index, tmpl) in produced.deploy_items.into_iter().enumerate() {
                if let Some(first) = producers.get(&tmpl.name) {
                    return Err(Error::DuplicateDeployItem {
                        name: tmpl.name,
                        executions: vec![first.clone(), exec.name.clone()],
                    });
                }
                producers.insert(tmpl.name.clone(), exec.name.clone());
                let rendered = self.deploy_item(&exec.name, index, tmpl, context)?;
                output.deploy_items.push(rendered);
            }
            output
                .deploy_item_state
                .insert(exec.name.clone(), produced.state.unwrap_or(Value::Null));
        }

        for rendered in &output.deploy_items {
            if let Some(missing) = rendered
                .depends_on
                .iter()
                .find(|dep| !producers.contains_key(dep.as_str()))
            {
                return Err(Error::TemplateFailure {
                    execution: rendered.execution.clone(),
                    cause: format!(
                        "deploy item '{}' depends on unknown deploy item '{missing}'",
                        rendered.item.metadata.name
                    ),
                });
            }
        }
        Ok(())
    }

    fn deploy_item(
        &self,
        execution: &str,
        index: usize,
        tmpl: DeployItemTemplate,
        context: &Value,
    ) -> Result<RenderedDeployItem> {
        let target = match tmpl.target {
            None => None,
            Some(TargetTemplate::Reference(reference)) => Some(reference),
            Some(TargetTemplate::Import { import }) => {
                let target = context["imports"]
                    .get(&import)
                    .filter(|v| is_target_reference(v))
                    .ok_or_else(|| Error::TemplateFailure {
                        execution: execution.to_string(),
                        cause: format!("'{import}' is not a target import"),
                    })?;
                let field = |key: &str| {
                    target["metadata"][key]
                        .as_str()
                        .unwrap_or_default()
                        .to_string()
                };
                Some(ObjectReference {
                    name: field("name"),
                    namespace: field("namespace"),
                })
            }
        };

        let mut annotations = BTreeMap::new();
        annotations.insert(EXECUTION_NAME_ANNOTATION.to_string(), execution.to_string());
        if !tmpl.depends_on.is_empty() {
            annotations.insert(DEPENDS_ON_ANNOTATION.to_string(), tmpl.depends_on.join(","));
        }

        Ok(RenderedDeployItem {
            execution: execution.to_string(),
            index,
            depends_on: tmpl.depends_on,
            item: DeployItem {
                api_version: LANDSCAPER_API_VERSION.to_string(),
                kind: DEPLOY_ITEM_KIND.to_string(),
                metadata: ObjectMeta {
                    name: tmpl.name,
                    namespace: DEFAULT_NAMESPACE.to_string(),
                    annotations,
                    labels: tmpl.labels,
                },
                spec: DeployItemSpec {
                    item_type: tmpl.item_type,
                    target,
                    config: tmpl.config,
                },
            },
        })
    }

    fn run_subinstallations(
        &self,
        input: &RenderInput<'_>,
        context: &Value,
        output: &mut RenderOutput,
    ) -> Result<()> {
        let mut templates = Vec::new();
        for sub in &input.blueprint.subinstallations {
            templates.push(static_subinstallation(sub, input.blueprint_fs)?);
        }

        for exec in &input.blueprint.subinstallation_executions {
            let text = self.execute(exec, input.blueprint_fs, context, &input.state.subinstallations)?;
            let produced: SubinstallationExecutionOutput = parse_output(&exec.name, &text)?;
            templates.extend(produced.subinstallations);
            output
                .subinstallation_state
                .insert(exec.name.clone(), produced.state.unwrap_or(Value::Null));
        }

        let mut seen = HashSet::new();
        for tmpl in templates {
            if !seen.insert(tmpl.name.clone()) {
                return Err(Error::DuplicateSubinstallation { name: tmpl.name });
            }
            output.subinstallations.push(to_installation(tmpl)?);
        }
        Ok(())
    }
}

/// Collect every problem with the blueprint and the given imports.
/// Defaults of missing imports are filled in.
fn validate(blueprint: &Blueprint, imports: &mut ImportMap) -> Result<()> {
    let mut reasons = blueprint.validate();
    check_imports(&blueprint.imports, imports, &mut reasons);
    if reasons.is_empty() {
        Ok(())
    } else {
        Err(Error::InvalidBlueprint { reasons })
    }
}

/// Fill in defaults and collect missing and mistyped imports.
///
/// Conditional imports are only looked at when their parent is given.
fn check_imports(defs: &[ImportDefinition], imports: &mut ImportMap, reasons: &mut Vec<String>) {
    for def in defs {
        if !imports.contains_key(&def.name) {
            if let Some(default) = &def.default {
                imports.insert(def.name.clone(), default.value.clone());
            }
        }
        let Some(value) = imports.get(&def.name) else {
            if def.required {
                reasons.push(format!("import '{}' is required but was not given", def.name));
            }
            continue;
        };
        if let Some(target_type) = &def.target_type {
            let targets: Vec<&Value> = match value {
                Value::Array(items) if def.import_type.as_deref() == Some("targetList") => {
                    items.iter().collect()
                }
                other => vec![other],
            };
            for target in targets {
                check_target(&def.name, target_type, target, reasons);
            }
        }
        check_imports(&def.import_definitions, imports, reasons);
    }
}

fn check_target(name: &str, target_type: &str, value: &Value, reasons: &mut Vec<String>) {
    if !is_target_reference(value) {
        reasons.push(format!("import '{name}' is not a target"));
        return;
    }
    let actual = value.pointer("/spec/type").and_then(Value::as_str).unwrap_or_default();
    if actual != target_type {
        reasons.push(format!(
            "import '{name}' expects a target of type '{target_type}' but got '{actual}'"
        ));
    }
}

/// Only the imports the blueprint declares, in the order they were given.
fn declared_imports(blueprint: &Blueprint, imports: ImportMap) -> ImportMap {
    let declared: HashSet<&str> = blueprint
        .all_imports()
        .into_iter()
        .map(|def| def.name.as_str())
        .collect();
    imports
        .into_iter()
        .filter(|(name, _)| {
            let keep = declared.contains(name.as_str());
            if !keep {
                tracing::debug!(import = %name, "dropping undeclared import");
            }
            keep
        })
        .collect()
}

fn contains(components: &[ComponentDescriptor], name: &str, version: &str) -> bool {
    components
        .iter()
        .any(|cd| cd.name() == name && cd.version() == version)
}

/// Parse an execution's YAML output. Empty output produces nothing.
fn parse_output<T: Default + DeserializeOwned>(execution: &str, text: &str) -> Result<T> {
    if text.trim().is_empty() {
        return Ok(T::default());
    }
    serde_yaml::from_str(text).map_err(|e| Error::TemplateFailure {
        execution: execution.to_string(),
        cause: format!("invalid execution output: {e}"),
    })
}

fn static_subinstallation(
    sub: &SubinstallationTemplate,
    blueprint_fs: &OverlayFs,
) -> Result<InstallationTemplate> {
    match sub {
        SubinstallationTemplate::Inline(tmpl) => Ok(tmpl.clone()),
        SubinstallationTemplate::File(file) => {
            let data = blueprint_fs
                .read(&file.file)
                .map_err(|error| Error::ReadFailed {
                    path: blueprint_fs.host_path(&file.file),
                    error,
                })?;
            serde_yaml::from_slice(&data).map_err(|e| Error::MalformedBlueprint {
                reason: format!("subinstallation file {}: {e}", file.file),
            })
        }
    }
}

/// The installation described by a sub-installation template.
pub fn to_installation(tmpl: InstallationTemplate) -> Result<Installation> {
    let mut spec: Map<String, Value> = tmpl.extra.into_iter().collect();
    if !tmpl.blueprint.is_null() {
        spec.insert("blueprint".to_string(), tmpl.blueprint);
    }
    let spec: InstallationSpec =
        serde_json::from_value(Value::Object(spec)).map_err(|e| Error::MalformedBlueprint {
            reason: format!("subinstallation '{}': {e}", tmpl.name),
        })?;

    Ok(Installation {
        api_version: LANDSCAPER_API_VERSION.to_string(),
        kind: INSTALLATION_KIND.to_string(),
        metadata: json!({"name": tmpl.name, "namespace": DEFAULT_NAMESPACE}),
        spec,
        extra: Default::default(),
    })
}
