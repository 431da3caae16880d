// Copyright (c) Contributors to the SPK project.
// SPDX-License-Identifier: Apache-2.0

use rstest::rstest;
use serde_json::json;

use super::*;

const DESCRIPTOR: &str = r#"
meta:
  schemaVersion: v2
component:
  name: example.com/root
  version: v0.1.0
  repositoryContexts:
    - type: ociRegistry
      baseUrl: example.com/components
  provider: internal
  sources: []
  componentReferences: []
  resources:
    - name: blueprint
      version: v0.1.0
      type: blueprint
      relation: local
      access:
        type: localOciBlob
        digest: sha256:abc
  labels:
    - name: team
      value: a
signatures: []
"#;

#[rstest]
fn test_decode_blueprint_checks_identity() {
    let ok = decode_blueprint(
        b"apiVersion: landscaper.gardener.cloud/v1alpha1\nkind: Blueprint\n",
    );
    assert!(ok.is_ok());

    let wrong_kind = decode_blueprint(
        b"apiVersion: landscaper.gardener.cloud/v1alpha1\nkind: Installation\n",
    );
    assert!(matches!(wrong_kind, Err(Error::MalformedBlueprint { .. })));

    let no_version = decode_blueprint(b"kind: Blueprint\n");
    assert!(matches!(no_version, Err(Error::MalformedBlueprint { .. })));

    let not_yaml = decode_blueprint(b"imports: [");
    assert!(matches!(not_yaml, Err(Error::MalformedBlueprint { .. })));
}

#[rstest]
fn test_decode_descriptor() {
    let cd = decode_descriptor(DESCRIPTOR.as_bytes()).unwrap();
    assert_eq!(cd.name(), "example.com/root");
    assert_eq!(
        cd.effective_repository_context().unwrap().base_url,
        "example.com/components"
    );
    assert_eq!(cd.component.extra["labels"][0]["name"], "team");
    assert_eq!(cd.extra["signatures"], json!([]));
}

#[rstest]
#[case("meta: {}\ncomponent: {name: a, version: v1, repositoryContexts: [{type: ociRegistry, baseUrl: x}]}\n")]
#[case("meta: {schemaVersion: v3}\ncomponent: {name: a, version: v1, repositoryContexts: [{type: ociRegistry, baseUrl: x}]}\n")]
#[case("meta: {schemaVersion: v2}\ncomponent: {name: a, version: v1, repositoryContexts: []}\n")]
#[case("meta: {schemaVersion: v2}\ncomponent: {name: a, version: v1}\n")]
fn test_decode_descriptor_rejects(#[case] yaml: &str) {
    assert!(matches!(
        decode_descriptor(yaml.as_bytes()),
        Err(Error::MalformedDescriptor { .. })
    ));
}

#[rstest]
fn test_unknown_fields_round_trip_in_order() {
    let cd = decode_descriptor(DESCRIPTOR.as_bytes()).unwrap();
    let encoded = encode_json_indented(&cd).unwrap();
    let value: serde_json::Value = serde_json::from_slice(&encoded).unwrap();

    let keys: Vec<_> = value["component"].as_object().unwrap().keys().cloned().collect();
    assert_eq!(
        keys,
        vec![
            "name",
            "version",
            "repositoryContexts",
            "provider",
            "sources",
            "componentReferences",
            "resources",
            "labels",
        ]
    );
    assert_eq!(decode_descriptor(&encode_yaml(&cd).unwrap()).unwrap(), cd);
}

#[rstest]
fn test_decode_documents() {
    let docs: Vec<serde_json::Value> =
        decode_documents(b"a: 1\n---\nb: 2\n---\n- 3\n").unwrap();
    assert_eq!(docs, vec![json!({"a": 1}), json!({"b": 2}), json!([3])]);
}

#[rstest]
fn test_join_documents() {
    let joined = join_documents(&["a: 1\n", "b: 2"]);
    assert_eq!(String::from_utf8(joined).unwrap(), "a: 1\n---\nb: 2\n");
}

#[rstest]
#[case("yaml", Some(OutputFormat::Yaml))]
#[case("json", Some(OutputFormat::Json))]
#[case("xml", None)]
#[case("YAML", None)]
fn test_output_format(#[case] given: &str, #[case] expected: Option<OutputFormat>) {
    match expected {
        Some(format) => assert_eq!(given.parse::<OutputFormat>().unwrap(), format),
        None => assert!(matches!(
            given.parse::<OutputFormat>(),
            Err(Error::UnsupportedOutputFormat { given: g }) if g == given
        )),
    }
}

#[rstest]
fn test_json_is_indented() {
    let out = OutputFormat::Json.encode(&json!({"a": {"b": 1}})).unwrap();
    assert_eq!(
        String::from_utf8(out).unwrap(),
        "{\n  \"a\": {\n    \"b\": 1\n  }\n}"
    );
}
