// Copyright (c) Contributors to the SPK project.
// SPDX-License-Identifier: Apache-2.0

//! Template execution for blueprint executions.
//!
//! Templates are pure: the same template and context always produce the
//! same text. Everything a template may look at, including the resolved
//! component descriptors, is part of the context.

use std::collections::{BTreeMap, HashMap};

use gtmpl::{Context, Template};
use gtmpl_value::{FuncError, Value as TmplValue};
use serde_json::{Map, Number, Value};

use crate::blueprint::GO_TEMPLATE_TYPE;
use crate::{Error, Result};

#[cfg(test)]
#[path = "./template_test.rs"]
mod template_test;

/// Widest indentation `indent` and `nindent` accept.
pub const MAX_INDENT: u64 = 1024;

const RANGE_ENTRY_VAR: &str = "$landscaperRangeEntry";

/// Turns a template and a context into text.
pub trait TemplateEngine {
    /// True if executions of this type can be run.
    fn supports(&self, executor_type: &str) -> bool;

    /// Execute `template` for the execution `name`.
    fn execute(&self, name: &str, template: &str, context: &Value) -> Result<String>;
}

/// Go template syntax, with a small set of helper functions:
///
/// | function | usage |
/// |----------|-------|
/// | `toJson` | `{{ toJson .imports }}` |
/// | `toYaml` | `{{ toYaml .imports.config \| indent 2 }}` |
/// | `indent` / `nindent` | `{{ .text \| nindent 4 }}` |
/// | `quote` | `{{ quote .imports.name }}` |
/// | `getComponent` | `{{ getComponent .components "example.com/lib" "v1.0.0" }}`, the highest version if the version is empty |
/// | `getResource` | `{{ getResource .cd "name" "chart" }}` |
#[derive(Debug, Default, Clone, Copy)]
pub struct GoTemplateEngine;

impl TemplateEngine for GoTemplateEngine {
    fn supports(&self, executor_type: &str) -> bool {
        executor_type == GO_TEMPLATE_TYPE
    }

    fn execute(&self, name: &str, template: &str, context: &Value) -> Result<String> {
        let failure = |cause: String| Error::TemplateFailure {
            execution: name.to_string(),
            cause,
        };

        let mut tmpl = Template::default();
        tmpl.add_func("toJson", to_json_func);
        tmpl.add_func("toYaml", to_yaml_func);
        tmpl.add_func("indent", indent_func);
        tmpl.add_func("nindent", nindent_func);
        tmpl.add_func("quote", quote_func);
        tmpl.add_func("getComponent", get_component_func);
        tmpl.add_func("getResource", get_resource_func);
        tmpl.add_func("sortedValues", sorted_values_func);
        tmpl.add_func("sortedEntries", sorted_entries_func);
        tmpl.parse(sort_ranges(template)).map_err(|e| failure(e.to_string()))?;

        let context = Context::from(to_template_value(context));
        tmpl.render(&context).map_err(|e| failure(e.to_string()))
    }
}

/// Rewrite every `range` action so maps are walked in key order.
///
/// Template maps are hash maps, so a plain `range` would visit their keys in
/// a different order on every run. Arrays are walked unchanged.
///
/// ```text
/// {{ range .m }}                -> {{ range .m | sortedValues }}
/// {{ range $v := .m }}          -> {{ range $v := .m | sortedValues }}
/// {{ range $k, $v := .m }}      -> {{ range $e := .m | sortedEntries }}{{ $k := $e.key }}{{ $v := $e.value }}
/// ```
pub fn sort_ranges(template: &str) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        rest = &rest[start..];
        let Some(end) = rest.find("}}") else {
            break;
        };
        let (text, tail) = rest.split_at(end + 2);
        match rewrite_range(text) {
            Some(rewritten) => out.push_str(&rewritten),
            None => out.push_str(text),
        }
        rest = tail;
    }
    out.push_str(rest);
    out
}

fn rewrite_range(action: &str) -> Option<String> {
    let inner = action.strip_prefix("{{")?.strip_suffix("}}")?;
    let (open, inner) = match inner.strip_prefix('-') {
        Some(body) if body.starts_with(char::is_whitespace) => ("{{- ", body),
        _ => ("{{ ", inner),
    };
    let (inner, close) = match inner.strip_suffix('-') {
        Some(body) if body.ends_with(char::is_whitespace) => (body, " -}}"),
        _ => (inner, " }}"),
    };
    let pipeline = inner.trim().strip_prefix("range")?;
    if !pipeline.starts_with(char::is_whitespace) {
        return None;
    }
    let pipeline = pipeline.trim();

    let Some((decl, pipe)) = pipeline.split_once(":=") else {
        return Some(format!("{open}range {pipeline} | sortedValues{close}"));
    };
    let vars: Vec<&str> = decl.split(',').map(str::trim).collect();
    if !vars.iter().all(|v| v.starts_with('$')) {
        return None;
    }
    let pipe = pipe.trim();
    match vars.as_slice() {
        [value] => Some(format!("{open}range {value} := {pipe} | sortedValues{close}")),
        [key, value] => Some(format!(
            "{open}range {RANGE_ENTRY_VAR} := {pipe} | sortedEntries }}}}\
             {{{{ {key} := {RANGE_ENTRY_VAR}.key }}}}\
             {{{{ {value} := {RANGE_ENTRY_VAR}.value{close}"
        )),
        _ => None,
    }
}

/// Convert a JSON value into a template value.
pub fn to_template_value(value: &Value) -> TmplValue {
    match value {
        Value::Null => TmplValue::Nil,
        Value::Bool(b) => TmplValue::from(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                TmplValue::from(i)
            } else if let Some(u) = n.as_u64() {
                TmplValue::from(u)
            } else {
                TmplValue::from(n.as_f64().unwrap_or_default())
            }
        }
        Value::String(s) => TmplValue::from(s.as_str()),
        Value::Array(items) => TmplValue::Array(items.iter().map(to_template_value).collect()),
        Value::Object(map) => TmplValue::Map(
            map.iter()
                .map(|(k, v)| (k.clone(), to_template_value(v)))
                .collect::<HashMap<_, _>>(),
        ),
    }
}

/// Convert a template value back into JSON. Map keys come out sorted.
pub fn from_template_value(value: &TmplValue) -> Value {
    match value {
        TmplValue::Bool(b) => Value::Bool(*b),
        TmplValue::String(s) => Value::String(s.clone()),
        TmplValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::from(i)
            } else if let Some(u) = n.as_u64() {
                Value::from(u)
            } else {
                n.as_f64()
                    .and_then(Number::from_f64)
                    .map(Value::Number)
                    .unwrap_or(Value::Null)
            }
        }
        TmplValue::Array(items) => Value::Array(items.iter().map(from_template_value).collect()),
        TmplValue::Map(map) | TmplValue::Object(map) => {
            let sorted: BTreeMap<_, _> = map.iter().collect();
            Value::Object(
                sorted
                    .into_iter()
                    .map(|(k, v)| (k.clone(), from_template_value(v)))
                    .collect::<Map<_, _>>(),
            )
        }
        _ => Value::Null,
    }
}

fn generic(msg: impl Into<String>) -> FuncError {
    FuncError::Generic(msg.into())
}

fn exactly<'a>(name: &str, args: &'a [TmplValue], n: usize) -> std::result::Result<&'a [TmplValue], FuncError> {
    if args.len() != n {
        return Err(generic(format!("{name} expects {n} arguments, got {}", args.len())));
    }
    Ok(args)
}

fn as_text(value: &TmplValue) -> String {
    match value {
        TmplValue::String(s) => s.clone(),
        TmplValue::Nil | TmplValue::NoValue => String::new(),
        other => match from_template_value(other) {
            Value::String(s) => s,
            json => json.to_string(),
        },
    }
}

fn to_json_func(args: &[TmplValue]) -> std::result::Result<TmplValue, FuncError> {
    let args = exactly("toJson", args, 1)?;
    serde_json::to_string(&from_template_value(&args[0]))
        .map(TmplValue::from)
        .map_err(|e| generic(e.to_string()))
}

fn to_yaml_func(args: &[TmplValue]) -> std::result::Result<TmplValue, FuncError> {
    let args = exactly("toYaml", args, 1)?;
    serde_yaml::to_string(&from_template_value(&args[0]))
        .map(|s| TmplValue::from(s.trim_end().to_string()))
        .map_err(|e| generic(e.to_string()))
}

fn indent_by(name: &str, args: &[TmplValue]) -> std::result::Result<String, FuncError> {
    let args = exactly(name, args, 2)?;
    let width = match from_template_value(&args[0]) {
        Value::Number(n) => n.as_u64().unwrap_or_default(),
        other => return Err(generic(format!("{name}: width must be a number, got {other}"))),
    };
    if width > MAX_INDENT {
        return Err(generic(format!("{name}: width {width} is larger than {MAX_INDENT}")));
    }
    let pad = " ".repeat(width as usize);
    let text = as_text(&args[1]);
    Ok(text
        .split('\n')
        .map(|line| format!("{pad}{line}"))
        .collect::<Vec<_>>()
        .join("\n"))
}

fn indent_func(args: &[TmplValue]) -> std::result::Result<TmplValue, FuncError> {
    indent_by("indent", args).map(TmplValue::from)
}

fn nindent_func(args: &[TmplValue]) -> std::result::Result<TmplValue, FuncError> {
    indent_by("nindent", args).map(|s| TmplValue::from(format!("\n{s}")))
}

fn quote_func(args: &[TmplValue]) -> std::result::Result<TmplValue, FuncError> {
    let quoted: Vec<String> = args
        .iter()
        .filter(|a| !matches!(a, TmplValue::Nil | TmplValue::NoValue))
        .map(|a| format!("{:?}", as_text(a)))
        .collect();
    Ok(TmplValue::from(quoted.join(" ")))
}

/// Map values ordered by key. Arrays pass through.
fn sorted_values_func(args: &[TmplValue]) -> std::result::Result<TmplValue, FuncError> {
    let args = exactly("sortedValues", args, 1)?;
    match &args[0] {
        TmplValue::Map(map) | TmplValue::Object(map) => {
            let sorted: BTreeMap<_, _> = map.iter().collect();
            Ok(TmplValue::Array(sorted.into_values().cloned().collect()))
        }
        other => Ok(other.clone()),
    }
}

/// `{key, value}` pairs of a map ordered by key, or of an array by index.
fn sorted_entries_func(args: &[TmplValue]) -> std::result::Result<TmplValue, FuncError> {
    let args = exactly("sortedEntries", args, 1)?;
    let entry = |key: TmplValue, value: &TmplValue| {
        TmplValue::Map(HashMap::from([
            ("key".to_string(), key),
            ("value".to_string(), value.clone()),
        ]))
    };
    match &args[0] {
        TmplValue::Map(map) | TmplValue::Object(map) => {
            let sorted: BTreeMap<_, _> = map.iter().collect();
            Ok(TmplValue::Array(
                sorted
                    .into_iter()
                    .map(|(k, v)| entry(TmplValue::from(k.as_str()), v))
                    .collect(),
            ))
        }
        TmplValue::Array(items) => Ok(TmplValue::Array(
            items
                .iter()
                .enumerate()
                .map(|(i, v)| entry(TmplValue::from(i), v))
                .collect(),
        )),
        other => Ok(other.clone()),
    }
}

/// `getComponent <components> <name> [version]`
fn get_component_func(args: &[TmplValue]) -> std::result::Result<TmplValue, FuncError> {
    if args.len() < 2 || args.len() > 3 {
        return Err(generic("getComponent expects a component list, a name and an optional version"));
    }
    let Value::Array(components) = from_template_value(&args[0]) else {
        return Err(generic("getComponent: first argument must be a list of components"));
    };
    let name = as_text(&args[1]);
    let version = args.get(2).map(as_text).unwrap_or_default();

    let field = |cd: &Value, pointer: &str| {
        cd.pointer(pointer)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    let candidates = components
        .iter()
        .filter(|cd| field(*cd, "/component/name") == name);

    let found = if version.is_empty() {
        candidates
            .filter_map(|cd| parse_version(&field(cd, "/component/version")).map(|v| (v, cd)))
            .max_by(|(a, _), (b, _)| a.cmp(b))
            .map(|(_, cd)| cd)
    } else {
        candidates
            .into_iter()
            .find(|cd| field(*cd, "/component/version") == version)
    };
    found
        .map(to_template_value)
        .ok_or_else(|| generic(format!("component {name}:{version} not found")))
}

/// Lenient semver parsing that accepts a leading `v`.
fn parse_version(version: &str) -> Option<semver::Version> {
    semver::Version::parse(version.trim_start_matches('v')).ok()
}

/// `getResource <descriptor> <key> <value> [<key> <value>...]`
fn get_resource_func(args: &[TmplValue]) -> std::result::Result<TmplValue, FuncError> {
    if args.len() < 3 || args.len() % 2 == 0 {
        return Err(generic("getResource expects a component descriptor and key/value pairs"));
    }
    let cd = from_template_value(&args[0]);
    let selector: Vec<(String, String)> = args[1..]
        .chunks(2)
        .map(|pair| (as_text(&pair[0]), as_text(&pair[1])))
        .collect();

    let resources = cd
        .pointer("/component/resources")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    resources
        .iter()
        .find(|res| {
            selector
                .iter()
                .all(|(k, v)| res.get(k).and_then(Value::as_str) == Some(v.as_str()))
        })
        .map(to_template_value)
        .ok_or_else(|| generic("no resource matches the selector"))
}
