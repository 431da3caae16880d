// Copyright (c) Contributors to the SPK project.
// SPDX-License-Identifier: Apache-2.0

use rstest::rstest;

use super::*;

fn parse(yaml: &str) -> Blueprint {
    serde_yaml::from_str(yaml).expect("Should parse blueprint")
}

#[rstest]
fn test_required_defaults_to_true() {
    let bp = parse(
        r#"
apiVersion: landscaper.gardener.cloud/v1alpha1
kind: Blueprint
imports:
  - name: imp1
    schema: {type: string}
  - name: imp2
    required: false
    schema: {type: string}
"#,
    );
    assert!(bp.imports[0].required);
    assert!(!bp.imports[1].required);
}

#[rstest]
fn test_subinstallations_inline_and_file() {
    let bp = parse(
        r#"
apiVersion: landscaper.gardener.cloud/v1alpha1
kind: Blueprint
subinstallations:
  - file: /subinst/one.yaml
  - apiVersion: landscaper.gardener.cloud/v1alpha1
    kind: InstallationTemplate
    name: two
    blueprint:
      ref: cd://resources/two
"#,
    );
    assert!(matches!(
        &bp.subinstallations[0],
        SubinstallationTemplate::File(SubinstallationFile { file }) if file == "/subinst/one.yaml"
    ));
    assert!(matches!(
        &bp.subinstallations[1],
        SubinstallationTemplate::Inline(t) if t.name == "two"
    ));
}

#[rstest]
fn test_unknown_fields_are_kept() {
    let bp = parse(
        r#"
apiVersion: landscaper.gardener.cloud/v1alpha1
kind: Blueprint
annotations:
  owner: team-a
deployExecutions:
  - name: default
    type: GoTemplate
    template: ""
    customField: 1
"#,
    );
    assert_eq!(bp.extra["annotations"]["owner"], "team-a");
    assert_eq!(bp.deploy_executions[0].extra["customField"], 1);
}

#[rstest]
fn test_conditional_imports_are_flattened() {
    let bp = parse(
        r#"
apiVersion: landscaper.gardener.cloud/v1alpha1
kind: Blueprint
imports:
  - name: parent
    required: false
    schema: {type: boolean}
    importDefinitions:
      - name: child
        schema: {type: string}
"#,
    );
    let names: Vec<_> = bp.all_imports().iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, vec!["parent", "child"]);
}

#[rstest]
fn test_validate_reports_all_problems() {
    let bp = parse(
        r#"
apiVersion: landscaper.gardener.cloud/v1alpha1
kind: Blueprint
imports:
  - name: a
    schema: {type: string}
  - name: a
    schema: {type: string}
deployExecutions:
  - name: default
    type: GoTemplate
  - name: default
    type: GoTemplate
    template: ""
"#,
    );
    let reasons = bp.validate();
    assert_eq!(reasons.len(), 3, "{reasons:?}");
    assert!(reasons[0].contains("import 'a'"));
    assert!(reasons.iter().any(|r| r.contains("neither a template nor a file")));
}

#[rstest]
#[case(Some("target"), None, true)]
#[case(None, Some("landscaper.gardener.cloud/kubernetes-cluster"), true)]
#[case(Some("data"), None, false)]
#[case(None, None, false)]
fn test_import_is_target(
    #[case] import_type: Option<&str>,
    #[case] target_type: Option<&str>,
    #[case] expected: bool,
) {
    let def = ImportDefinition {
        name: "x".into(),
        import_type: import_type.map(String::from),
        target_type: target_type.map(String::from),
        required: true,
        ..Default::default()
    };
    assert_eq!(def.is_target(), expected);
}
