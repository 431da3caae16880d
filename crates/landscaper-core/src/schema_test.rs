// Copyright (c) Contributors to the SPK project.
// SPDX-License-Identifier: Apache-2.0

use std::io::Write;

use flate2::Compression;
use flate2::write::GzEncoder;
use rstest::rstest;
use serde_json::json;

use super::*;
use crate::descriptor::{ComponentReference, RepositoryContext, Resource};
use crate::resolver::{DescriptorTable, LayeredResolver};

fn refs(nodes: &[JsonSchemaNode]) -> Vec<&str> {
    nodes.iter().map(|n| n.reference.as_str()).collect()
}

fn local_types(types: serde_json::Value) -> IndexMap<String, Value> {
    serde_json::from_value(types).unwrap()
}

fn schema_resource(name: &str, access: Value) -> Resource {
    Resource {
        name: name.into(),
        resource_type: "jsonschema".into(),
        access: Some(serde_json::from_value(access).unwrap()),
        ..Default::default()
    }
}

#[rstest]
fn test_schema_without_refs() {
    let schema = json!({"type": "string"});
    let nodes = SchemaResolver::new(SchemaLoader::default(), 0)
        .resolve(&schema)
        .unwrap();
    assert_eq!(nodes, vec![JsonSchemaNode { reference: "root".into(), schema }]);
}

#[rstest]
fn test_internal_refs_are_not_followed() {
    let schema = json!({
        "definitions": {"port": {"type": "integer"}},
        "properties": {"port": {"$ref": "#/definitions/port"}}
    });
    let nodes = SchemaResolver::new(SchemaLoader::default(), 0)
        .resolve(&schema)
        .unwrap();
    assert_eq!(refs(&nodes), vec!["root"]);
}

#[rstest]
fn test_local_types() {
    let types = local_types(json!({
        "port": {"type": "integer"},
        "endpoint": {"type": "object", "properties": {"port": {"$ref": "local://port"}}},
    }));
    let loader = SchemaLoader {
        local_types: Some(&types),
        ..Default::default()
    };
    let nodes = SchemaResolver::new(loader, 0)
        .resolve(&json!({"$ref": "local://endpoint"}))
        .unwrap();
    assert_eq!(refs(&nodes), vec!["root", "local://endpoint", "local://port"]);
    assert_eq!(nodes[2].schema, json!({"type": "integer"}));
}

#[rstest]
fn test_same_reference_listed_per_branch() {
    let types = local_types(json!({"port": {"type": "integer"}}));
    let loader = SchemaLoader {
        local_types: Some(&types),
        ..Default::default()
    };
    let schema = json!({"properties": {
        "a": {"$ref": "local://port"},
        "b": {"items": [{"$ref": "local://port"}]}
    }});
    let nodes = SchemaResolver::new(loader, 0).resolve(&schema).unwrap();
    assert_eq!(refs(&nodes), vec!["root", "local://port", "local://port"]);
}

#[rstest]
fn test_shared_reference_in_sibling_schemas() {
    let types = local_types(json!({
        "a": {"properties": {"c": {"$ref": "local://c"}}},
        "b": {"items": {"$ref": "local://c"}},
        "c": {"type": "string"},
    }));
    let loader = SchemaLoader {
        local_types: Some(&types),
        ..Default::default()
    };
    let schema = json!({"properties": {
        "a": {"$ref": "local://a"},
        "b": {"$ref": "local://b"},
    }});
    let nodes = SchemaResolver::new(loader, 0).resolve(&schema).unwrap();
    assert_eq!(
        refs(&nodes),
        vec!["root", "local://a", "local://c", "local://b", "local://c"]
    );
}

#[rstest]
fn test_cycle_terminates() {
    let types = local_types(json!({
        "a": {"properties": {"b": {"$ref": "local://b"}}},
        "b": {"properties": {"a": {"$ref": "local://a"}}},
    }));
    let loader = SchemaLoader {
        local_types: Some(&types),
        ..Default::default()
    };
    let nodes = SchemaResolver::new(loader, 0)
        .resolve(&json!({"$ref": "local://a"}))
        .unwrap();
    assert_eq!(refs(&nodes), vec!["root", "local://a", "local://b"]);
}

#[rstest]
fn test_depth_exceeded() {
    let types = local_types(json!({
        "a": {"$ref": "local://b"},
        "b": {"type": "string"},
    }));
    let loader = SchemaLoader {
        local_types: Some(&types),
        ..Default::default()
    };
    let schema = json!({"$ref": "local://a"});

    let err = SchemaResolver::new(loader, 1).resolve(&schema).unwrap_err();
    match err {
        Error::SchemaDepthExceeded { max_depth, history } => {
            assert_eq!(max_depth, 1);
            assert_eq!(history, vec!["root", "local://a", "local://b"]);
        }
        other => panic!("unexpected error {other:?}"),
    }

    let nodes = SchemaResolver::new(loader, 2).resolve(&schema).unwrap();
    assert_eq!(nodes.len(), 3);
}

#[rstest]
fn test_unknown_local_type() {
    let err = SchemaResolver::new(SchemaLoader::default(), 0)
        .resolve(&json!({"$ref": "local://missing"}))
        .unwrap_err();
    assert!(matches!(err, Error::SchemaLoadFailed { reference, .. } if reference == "local://missing"));
}

#[rstest]
fn test_unsupported_scheme() {
    let err = SchemaResolver::new(SchemaLoader::default(), 0)
        .resolve(&json!({"$ref": "https://example.com/schema.json"}))
        .unwrap_err();
    assert!(matches!(err, Error::SchemaLoadFailed { .. }));
}

#[rstest]
fn test_blueprint_file() {
    let mut fs = OverlayFs::new("/nonexistent");
    fs.write("schemas/port.json", r#"{"type": "integer"}"#).unwrap();
    fs.write("schemas/host.yaml", "type: string\n").unwrap();
    let loader = SchemaLoader {
        blueprint_fs: Some(&fs),
        ..Default::default()
    };
    let schema = json!({"properties": {
        "port": {"$ref": "blueprint://schemas/port.json"},
        "host": {"$ref": "blueprint://schemas/host.yaml#/"}
    }});
    let nodes = SchemaResolver::new(loader, 0).resolve(&schema).unwrap();
    assert_eq!(
        refs(&nodes),
        vec!["root", "blueprint://schemas/port.json", "blueprint://schemas/host.yaml"]
    );
    assert_eq!(nodes[2].schema, json!({"type": "string"}));
}

fn gzip(data: &[u8]) -> Vec<u8> {
    let mut enc = GzEncoder::new(Vec::new(), Compression::default());
    enc.write_all(data).unwrap();
    enc.finish().unwrap()
}

#[rstest]
fn test_component_resources() {
    let mut fs = OverlayFs::new("/nonexistent");
    fs.write("schemas/own.json", r#"{"$ref": "cd://componentReferences/lib/resources/port"}"#)
        .unwrap();
    fs.write("schemas/port.json.gz", gzip(br#"{"type": "integer"}"#))
        .unwrap();

    let mut own = ComponentDescriptor::new("example.com/app", "v1.0.0");
    own.component.repository_contexts = vec![RepositoryContext::oci("example.com/components")];
    own.component.component_references.push(ComponentReference {
        name: "lib".into(),
        component_name: "example.com/lib".into(),
        version: "v2.0.0".into(),
        ..Default::default()
    });
    own.component.resources.push(schema_resource(
        "own",
        json!({"type": "localFilesystemResource", "input": {"type": "file", "path": "schemas/own.json"}}),
    ));

    let mut lib = ComponentDescriptor::new("example.com/lib", "v2.0.0");
    lib.component.resources.push(schema_resource(
        "port",
        json!({"type": "localFilesystemResource", "input": {
            "type": "file",
            "path": "schemas/port.json.gz",
            "mediaType": "application/schema+json+gzip"
        }}),
    ));

    let mut table = DescriptorTable::new();
    table.insert(own.clone());
    table.insert(lib);
    let resolver = LayeredResolver::new(table, None, fs);

    let loader = SchemaLoader {
        component: Some(&own),
        resolver: Some(&resolver),
        ..Default::default()
    };
    let nodes = SchemaResolver::new(loader, 0)
        .resolve(&json!({"$ref": "cd://resources/own"}))
        .unwrap();
    assert_eq!(
        refs(&nodes),
        vec![
            "root",
            "cd://resources/own",
            "cd://componentReferences/lib/resources/port"
        ]
    );
    assert_eq!(nodes[2].schema, json!({"type": "integer"}));
}

#[rstest]
fn test_inline_schema_resource() {
    let mut cd = ComponentDescriptor::new("example.com/app", "v1.0.0");
    cd.component.resources.push(schema_resource(
        "config",
        json!({"type": "inlineJsonSchema", "schema": {"type": "object"}}),
    ));
    let mut table = DescriptorTable::new();
    table.insert(cd.clone());
    let resolver = LayeredResolver::new(table, None, OverlayFs::new("/nonexistent"));

    let loader = SchemaLoader {
        component: Some(&cd),
        resolver: Some(&resolver),
        ..Default::default()
    };
    let nodes = SchemaResolver::new(loader, 0)
        .resolve(&json!({"$ref": "cd://resources/config"}))
        .unwrap();
    assert_eq!(nodes[1].schema, json!({"type": "object"}));
}

#[rstest]
#[case("cd://resources/missing")]
#[case("cd://componentReferences/missing/resources/x")]
#[case("cd://something/else")]
fn test_invalid_component_refs(#[case] reference: &str) {
    let cd = ComponentDescriptor::new("example.com/app", "v1.0.0");
    let mut table = DescriptorTable::new();
    table.insert(cd.clone());
    let resolver = LayeredResolver::new(table, None, OverlayFs::new("/nonexistent"));
    let loader = SchemaLoader {
        component: Some(&cd),
        resolver: Some(&resolver),
        ..Default::default()
    };
    let err = SchemaResolver::new(loader, 0)
        .resolve(&json!({"$ref": reference}))
        .unwrap_err();
    assert!(matches!(err, Error::SchemaLoadFailed { .. }), "{err:?}");
}

#[rstest]
fn test_cancelled_before_component_lookup() {
    let mut cd = ComponentDescriptor::new("example.com/app", "v1.0.0");
    cd.component.component_references.push(ComponentReference {
        name: "lib".into(),
        component_name: "example.com/lib".into(),
        version: "v1".into(),
        ..Default::default()
    });
    let resolver = LayeredResolver::new(DescriptorTable::new(), None, OverlayFs::new("/nonexistent"));
    let loader = SchemaLoader {
        component: Some(&cd),
        resolver: Some(&resolver),
        ..Default::default()
    };
    let cancel = CancelToken::new();
    cancel.cancel();
    let err = SchemaResolver::new(loader, 0)
        .with_cancel(cancel)
        .resolve(&json!({"$ref": "cd://componentReferences/lib/resources/x"}))
        .unwrap_err();
    assert!(err.is_cancelled());
}

#[rstest]
fn test_import_schemas() {
    let blueprint: Blueprint = serde_yaml::from_str(
        r#"
apiVersion: landscaper.gardener.cloud/v1alpha1
kind: Blueprint
imports:
  - name: replicas
    schema:
      type: integer
  - name: cluster
    targetType: landscaper.gardener.cloud/kubernetes-cluster
"#,
    )
    .unwrap();
    let resolver = SchemaResolver::new(SchemaLoader::default(), 0);
    let schemas = resolve_import_schemas(&blueprint, &resolver).unwrap();
    assert_eq!(schemas.len(), 1);
    assert_eq!(schemas[0].0, "replicas");
}

#[rstest]
fn test_render_schema_list() {
    let nodes = vec![
        JsonSchemaNode {
            reference: "root".into(),
            schema: json!({"$ref": "local://a"}),
        },
        JsonSchemaNode {
            reference: "local://a".into(),
            schema: json!({"type": "string"}),
        },
    ];
    let out = render_schema_list(&nodes).unwrap();
    assert!(out.starts_with("JSON schema\n{\n  \"$ref\": \"local://a\"\n}"));
    assert!(out.contains("\n \nReferenced JSON schemas\n"));
    assert!(out.contains("\"ref\": \"local://a\""));

    let single = render_schema_list(&nodes[..1]).unwrap();
    assert!(!single.contains("Referenced"));
}
