// Copyright (c) Contributors to the SPK project.
// SPDX-License-Identifier: Apache-2.0

//! Blueprint documents: imports, exports and template executions.

use std::collections::HashSet;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[cfg(test)]
#[path = "./blueprint_test.rs"]
mod blueprint_test;

/// Well-known filename of a blueprint inside its directory.
pub const BLUEPRINT_FILENAME: &str = "blueprint.yaml";

/// API version shared by blueprints, installations and deploy items.
pub const LANDSCAPER_API_VERSION: &str = "landscaper.gardener.cloud/v1alpha1";

pub const BLUEPRINT_KIND: &str = "Blueprint";

/// The only template executor type this crate can run.
pub const GO_TEMPLATE_TYPE: &str = "GoTemplate";

fn default_true() -> bool {
    true
}

fn is_true(v: &bool) -> bool {
    *v
}

/// A parsed `blueprint.yaml`.
///
/// Fields this crate does not interpret are kept in `extra` and written
/// back unchanged.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Blueprint {
    pub api_version: String,
    pub kind: String,

    /// Named JSON schemas addressable as `local://<name>`.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub local_types: IndexMap<String, Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub imports: Vec<ImportDefinition>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exports: Vec<ExportDefinition>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deploy_executions: Vec<TemplateExecutor>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub export_executions: Vec<TemplateExecutor>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subinstallations: Vec<SubinstallationTemplate>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subinstallation_executions: Vec<TemplateExecutor>,

    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

/// Declares one import of a blueprint.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImportDefinition {
    pub name: String,

    /// `data`, `target` or `targetList`; inferred from the other fields when absent.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub import_type: Option<String>,

    #[serde(default = "default_true", skip_serializing_if = "is_true")]
    pub required: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<DefaultValue>,

    /// Conditional imports, only considered when this import is satisfied.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub import_definitions: Vec<ImportDefinition>,

    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

impl ImportDefinition {
    pub fn is_target(&self) -> bool {
        match self.import_type.as_deref() {
            Some(t) => t == "target" || t == "targetList",
            None => self.target_type.is_some(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct DefaultValue {
    pub value: Value,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExportDefinition {
    pub name: String,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub export_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_type: Option<String>,

    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

/// A named template producing deploy items, exports or sub-installations.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct TemplateExecutor {
    pub name: String,

    #[serde(rename = "type")]
    pub executor_type: String,

    /// Inline template source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,

    /// Template source file, relative to the blueprint directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

/// A static sub-installation, either inline or stored in a separate file.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(untagged)]
pub enum SubinstallationTemplate {
    File(SubinstallationFile),
    Inline(InstallationTemplate),
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct SubinstallationFile {
    pub file: String,
}

/// The template of an installation nested into a blueprint.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InstallationTemplate {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_version: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kind: String,

    pub name: String,

    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub blueprint: Value,

    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

impl Blueprint {
    /// All import definitions, with conditional imports flattened in after
    /// their parent.
    pub fn all_imports(&self) -> Vec<&ImportDefinition> {
        fn collect<'a>(defs: &'a [ImportDefinition], out: &mut Vec<&'a ImportDefinition>) {
            for def in defs {
                out.push(def);
                collect(&def.import_definitions, out);
            }
        }
        let mut out = Vec::new();
        collect(&self.imports, &mut out);
        out
    }

    /// Structural problems of the blueprint itself, independent of any imports.
    pub fn validate(&self) -> Vec<String> {
        let mut reasons = Vec::new();

        let mut seen = HashSet::new();
        for import in self.all_imports() {
            if import.name.is_empty() {
                reasons.push("import definition without a name".to_string());
                continue;
            }
            if !seen.insert(import.name.as_str()) {
                reasons.push(format!("import '{}' is defined more than once", import.name));
            }
            if import.schema.is_some() && import.target_type.is_some() {
                reasons.push(format!(
                    "import '{}' must define either a schema or a targetType, not both",
                    import.name
                ));
            }
        }

        let executions = [
            ("deployExecutions", &self.deploy_executions),
            ("exportExecutions", &self.export_executions),
            ("subinstallationExecutions", &self.subinstallation_executions),
        ];
        for (field, execs) in executions {
            let mut seen = HashSet::new();
            for exec in execs.iter() {
                if exec.name.is_empty() {
                    reasons.push(format!("{field}: execution without a name"));
                    continue;
                }
                if !seen.insert(exec.name.as_str()) {
                    reasons.push(format!("{field}: execution '{}' is defined more than once", exec.name));
                }
                if exec.template.is_none() && exec.file.is_none() {
                    reasons.push(format!(
                        "{field}: execution '{}' has neither a template nor a file",
                        exec.name
                    ));
                }
            }
        }

        for sub in &self.subinstallations {
            if let SubinstallationTemplate::Inline(tmpl) = sub {
                if tmpl.name.is_empty() {
                    reasons.push("subinstallation without a name".to_string());
                }
            }
        }

        reasons
    }
}
