// Copyright (c) Contributors to the SPK project.
// SPDX-License-Identifier: Apache-2.0

use rstest::rstest;

use super::*;
use crate::descriptor::{AccessKind, LOCAL_FILESYSTEM_TYPE};

const RESOURCES: &str = r#"
name: config-schema
type: json-schema
input:
  type: file
  path: ./schemas/config.json
  mediaType: application/schema+json
---
name: image
type: ociImage
version: v1.2.3
access:
  type: ociRegistry
  imageReference: example.com/image:v1.2.3
"#;

#[rstest]
fn test_read_resource_list() {
    let list = read_resource_list(RESOURCES.as_bytes()).unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(list[0].resource.name, "config-schema");
    assert!(list[0].input.is_some());
    assert!(list[1].input.is_none());
    assert!(list[1].resource.access.is_some());
}

#[rstest]
fn test_input_and_access_conflict() {
    let yaml = r#"
name: both
type: json-schema
input: {type: file, path: a.json}
access: {type: localOciBlob, digest: "sha256:abc"}
"#;
    let err = read_resource_list(yaml.as_bytes()).unwrap_err();
    assert!(err.to_string().contains("either an input or an access"));
}

#[rstest]
fn test_add_local_resources_replaces_and_appends() {
    let mut cd = ComponentDescriptor::new("example.com/a", "v0.1.0");
    cd.component.resources.push(Resource {
        name: "image".into(),
        version: "v0.0.1".into(),
        resource_type: "ociImage".into(),
        ..Default::default()
    });
    cd.component.resources.push(Resource {
        name: "other".into(),
        resource_type: "blob".into(),
        ..Default::default()
    });

    let list = read_resource_list(RESOURCES.as_bytes()).unwrap();
    let updated = add_local_resources(&cd, &list).unwrap();

    let names: Vec<_> = updated
        .component
        .resources
        .iter()
        .map(|r| r.name.as_str())
        .collect();
    assert_eq!(names, vec!["image", "other", "config-schema"]);
    assert_eq!(updated.resource("image").unwrap().version, "v1.2.3");

    let local = updated.resource("config-schema").unwrap();
    assert_eq!(local.version, "v0.1.0");
    let access = local.access.as_ref().unwrap();
    assert_eq!(access.access_type, LOCAL_FILESYSTEM_TYPE);
    match access.kind().unwrap() {
        AccessKind::LocalFilesystem(input) => {
            assert_eq!(input.path, "./schemas/config.json");
            assert_eq!(input.media_type.as_deref(), Some("application/schema+json"));
        }
        other => panic!("unexpected access {other:?}"),
    }

    // the original descriptor is left untouched
    assert_eq!(cd.component.resources.len(), 2);
}
