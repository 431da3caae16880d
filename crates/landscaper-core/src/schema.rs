// Copyright (c) Contributors to the SPK project.
// SPDX-License-Identifier: Apache-2.0

//! Transitive resolution of JSON schema references.
//!
//! Blueprint import schemas may refer to other schemas with `$ref`:
//!
//! - `local://<name>` a schema declared in the blueprint's `localTypes`
//! - `blueprint://<path>` a file inside the blueprint directory
//! - `cd://componentReferences/<ref>/resources/<name>` a resource blob of a
//!   (transitively) referenced component, or `cd://resources/<name>` of the
//!   component itself
//! - `#/...` a location inside the current document
//!
//! Resolution yields the root schema followed by every schema it pulls in.

use std::io::Read;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

use crate::blob::BlobResolver;
use crate::blueprint::Blueprint;
use crate::cancel::CancelToken;
use crate::descriptor::ComponentDescriptor;
use crate::resolver::ComponentResolver;
use crate::vfs::OverlayFs;
use crate::{Error, Result};

#[cfg(test)]
#[path = "./schema_test.rs"]
mod schema_test;

pub const DEFAULT_MAX_REF_DEPTH: usize = 5;

/// Reference under which the schema passed to [`SchemaResolver::resolve`] is listed.
pub const ROOT_REF: &str = "root";

pub const LOCAL_SCHEME: &str = "local://";
pub const BLUEPRINT_SCHEME: &str = "blueprint://";
pub const COMPONENT_SCHEME: &str = "cd://";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JsonSchemaNode {
    #[serde(rename = "ref")]
    pub reference: String,
    pub schema: Value,
}

/// Where referenced schemas can be loaded from. Any source may be absent.
#[derive(Clone, Copy, Default)]
pub struct SchemaLoader<'a> {
    pub local_types: Option<&'a IndexMap<String, Value>>,
    pub blueprint_fs: Option<&'a OverlayFs>,
    pub component: Option<&'a ComponentDescriptor>,
    pub resolver: Option<&'a dyn ComponentResolver>,
}

pub struct SchemaResolver<'a> {
    loader: SchemaLoader<'a>,
    max_ref_depth: usize,
    cancel: CancelToken,
}

impl<'a> SchemaResolver<'a> {
    /// A resolver following at most `max_ref_depth` nested references.
    /// Zero selects [`DEFAULT_MAX_REF_DEPTH`].
    pub fn new(loader: SchemaLoader<'a>, max_ref_depth: usize) -> Self {
        let max_ref_depth = if max_ref_depth == 0 {
            DEFAULT_MAX_REF_DEPTH
        } else {
            max_ref_depth
        };
        Self {
            loader,
            max_ref_depth,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The root schema followed by all schemas it references, depth first.
    ///
    /// A reference is listed once per place it is reached from. Only a
    /// reference back into its own chain is cut off.
    pub fn resolve(&self, schema: &Value) -> Result<Vec<JsonSchemaNode>> {
        self.expand(ROOT_REF, schema.clone(), &[])
    }

    fn resolve_ref(&self, reference: &str, history: &[String]) -> Result<Vec<JsonSchemaNode>> {
        if history.iter().any(|h| h == reference) {
            tracing::debug!(%reference, "schema reference cycle");
            return Ok(Vec::new());
        }
        if history.len() > self.max_ref_depth {
            let mut history = history.to_vec();
            history.push(reference.to_string());
            return Err(Error::SchemaDepthExceeded {
                max_depth: self.max_ref_depth,
                history,
            });
        }
        let schema = self.load(reference)?;
        self.expand(reference, schema, history)
    }

    fn expand(
        &self,
        reference: &str,
        schema: Value,
        history: &[String],
    ) -> Result<Vec<JsonSchemaNode>> {
        let mut history = history.to_vec();
        history.push(reference.to_string());

        let refs = collect_refs(&schema);
        let mut out = vec![JsonSchemaNode {
            reference: reference.to_string(),
            schema,
        }];
        for r in refs {
            let document = r.split('#').next().unwrap_or_default();
            if document.is_empty() {
                continue;
            }
            out.extend(self.resolve_ref(document, &history)?);
        }
        Ok(out)
    }

    fn load(&self, reference: &str) -> Result<Value> {
        let failed = |reason: String| Error::SchemaLoadFailed {
            reference: reference.to_string(),
            reason,
        };

        if let Some(name) = reference.strip_prefix(LOCAL_SCHEME) {
            return self
                .loader
                .local_types
                .and_then(|types| types.get(name))
                .cloned()
                .ok_or_else(|| failed(format!("local type '{name}' is not defined")));
        }
        if let Some(path) = reference.strip_prefix(BLUEPRINT_SCHEME) {
            let fs = self
                .loader
                .blueprint_fs
                .ok_or_else(|| failed("no blueprint filesystem".to_string()))?;
            let data = fs.read(path).map_err(|e| failed(e.to_string()))?;
            return parse_schema(&data).map_err(failed);
        }
        if let Some(path) = reference.strip_prefix(COMPONENT_SCHEME) {
            return self.load_from_component(reference, path);
        }
        Err(failed("unsupported reference scheme".to_string()))
    }

    fn load_from_component(&self, reference: &str, path: &str) -> Result<Value> {
        let failed = |reason: String| Error::SchemaLoadFailed {
            reference: reference.to_string(),
            reason,
        };
        let lookup_failed = |err: Error| {
            if err.is_cancelled() {
                err
            } else {
                failed(err.to_string())
            }
        };

        let mut cd = self
            .loader
            .component
            .cloned()
            .ok_or_else(|| failed("no component descriptor".to_string()))?;
        let resolver = self
            .loader
            .resolver
            .ok_or_else(|| failed("no component resolver".to_string()))?;
        let mut blobs: Option<Box<dyn BlobResolver + 'a>> = None;

        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let mut rest = segments.as_slice();
        loop {
            match rest {
                ["componentReferences", name, tail @ ..] => {
                    let cref = cd.component_reference(name).cloned().ok_or_else(|| {
                        failed(format!(
                            "component {} has no component reference '{name}'",
                            cd.name()
                        ))
                    })?;
                    self.cancel.check()?;
                    let (next, next_blobs) = resolver
                        .resolve_with_blobs(
                            &self.cancel,
                            cd.effective_repository_context(),
                            &cref.component_name,
                            &cref.version,
                        )
                        .map_err(lookup_failed)?;
                    cd = next;
                    blobs = Some(next_blobs);
                    rest = tail;
                }
                ["resources", name] => {
                    let resource = cd.resource(name).cloned().ok_or_else(|| {
                        failed(format!("component {} has no resource '{name}'", cd.name()))
                    })?;
                    let blobs = match blobs {
                        Some(blobs) => blobs,
                        None => {
                            self.cancel.check()?;
                            resolver
                                .resolve_with_blobs(
                                    &self.cancel,
                                    cd.effective_repository_context(),
                                    cd.name(),
                                    cd.version(),
                                )
                                .map_err(lookup_failed)?
                                .1
                        }
                    };
                    let mut data = Vec::new();
                    let info = blobs
                        .resolve(&self.cancel, &resource, &mut data)
                        .map_err(lookup_failed)?;
                    if info.media_type.contains("gzip") {
                        let mut plain = Vec::new();
                        flate2::read::GzDecoder::new(data.as_slice())
                            .read_to_end(&mut plain)
                            .map_err(|e| failed(e.to_string()))?;
                        data = plain;
                    }
                    return parse_schema(&data).map_err(failed);
                }
                _ => {
                    return Err(failed(
                        "expected componentReferences/<name>/.../resources/<name>".to_string(),
                    ));
                }
            }
        }
    }
}

/// Decode a schema document, accepting JSON or YAML.
fn parse_schema(data: &[u8]) -> std::result::Result<Value, String> {
    match serde_json::from_slice(data) {
        Ok(value) => Ok(value),
        Err(json_err) => serde_yaml::from_slice(data)
            .map_err(|yaml_err| format!("not JSON ({json_err}) nor YAML ({yaml_err})")),
    }
}

/// All `$ref` strings of a document in document order, each once.
pub fn collect_refs(schema: &Value) -> Vec<String> {
    fn walk(value: &Value, out: &mut Vec<String>) {
        match value {
            Value::Object(map) => {
                for (key, child) in map {
                    match (key.as_str(), child) {
                        ("$ref", Value::String(r)) => out.push(r.clone()),
                        _ => walk(child, out),
                    }
                }
            }
            Value::Array(items) => items.iter().for_each(|item| walk(item, out)),
            _ => {}
        }
    }
    let mut out = Vec::new();
    walk(schema, &mut out);
    out
}

/// Resolve the schema of every import that declares one.
pub fn resolve_import_schemas(
    blueprint: &Blueprint,
    resolver: &SchemaResolver<'_>,
) -> Result<Vec<(String, Vec<JsonSchemaNode>)>> {
    blueprint
        .all_imports()
        .into_iter()
        .filter_map(|import| import.schema.as_ref().map(|s| (import.name.clone(), s)))
        .map(|(name, schema)| Ok((name, resolver.resolve(schema)?)))
        .collect()
}

/// Human readable listing of a resolved schema and its references.
pub fn render_schema_list(nodes: &[JsonSchemaNode]) -> Result<String> {
    let Some((root, referenced)) = nodes.split_first() else {
        return Ok(String::new());
    };
    let mut out = String::from("JSON schema\n");
    out.push_str(&to_pretty_json(&root.schema)?);
    if !referenced.is_empty() {
        out.push_str("\n \nReferenced JSON schemas\n");
        out.push_str(&to_pretty_json(&referenced)?);
    }
    Ok(out)
}

fn to_pretty_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(|e| Error::Encode(e.to_string()))
}
