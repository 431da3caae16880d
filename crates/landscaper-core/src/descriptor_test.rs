// Copyright (c) Contributors to the SPK project.
// SPDX-License-Identifier: Apache-2.0

use rstest::rstest;
use serde_json::json;

use super::*;
use crate::resources::BlobInputType;

fn access(value: serde_json::Value) -> Access {
    serde_json::from_value(value).unwrap()
}

#[rstest]
fn test_access_kinds() {
    let oci = access(json!({"type": "ociRegistry", "imageReference": "example.com/img:1.0"}));
    assert_eq!(
        oci.kind().unwrap(),
        AccessKind::OciRegistry {
            image_reference: "example.com/img:1.0".into()
        }
    );

    let blob = access(json!({"type": "localOciBlob", "digest": "sha256:abc"}));
    assert_eq!(
        blob.kind().unwrap(),
        AccessKind::LocalOciBlob {
            digest: "sha256:abc".into(),
            media_type: None
        }
    );

    let fs = access(json!({
        "type": "localFilesystemResource",
        "input": {"type": "dir", "path": "./charts", "compressWithGzip": true}
    }));
    match fs.kind().unwrap() {
        AccessKind::LocalFilesystem(input) => {
            assert_eq!(input.input_type, BlobInputType::Dir);
            assert!(input.compress_with_gzip);
        }
        other => panic!("unexpected access {other:?}"),
    }

    let custom = access(json!({"type": "s3", "bucket": "b"}));
    assert_eq!(custom.kind().unwrap(), AccessKind::Unknown("s3".into()));
    assert_eq!(custom.fields["bucket"], "b");
}

#[rstest]
fn test_access_with_missing_fields_is_malformed() {
    let broken = access(json!({"type": "localOciBlob"}));
    assert!(matches!(broken.kind(), Err(Error::MalformedDescriptor { .. })));
}

#[rstest]
fn test_default_descriptor() {
    let cd = ComponentDescriptor::new(DEFAULT_COMPONENT_NAME, DEFAULT_COMPONENT_VERSION);
    assert_eq!(cd.meta.schema_version, "v2");
    assert_eq!(cd.name(), "my-example-component");
    assert!(cd.effective_repository_context().is_none());

    let value = cd.to_value().unwrap();
    assert_eq!(value["component"]["resources"], json!([]));
    assert_eq!(value["component"]["provider"], "internal");
}

#[rstest]
fn test_effective_context_is_last() {
    let mut cd = ComponentDescriptor::new("a", "v1");
    cd.component.repository_contexts = vec![
        RepositoryContext::oci("old.example.com"),
        RepositoryContext::oci("new.example.com"),
    ];
    assert_eq!(
        cd.effective_repository_context().unwrap().base_url,
        "new.example.com"
    );
}
