// Copyright (c) Contributors to the SPK project.
// SPDX-License-Identifier: Apache-2.0

use std::cell::RefCell;
use std::collections::HashMap;

use rstest::rstest;
use serde_json::json;
use sha2::{Digest, Sha256};

use super::*;

/// Registry content kept in memory.
#[derive(Default)]
struct FakeClient {
    manifests: HashMap<String, Vec<u8>>,
    blobs: HashMap<String, Vec<u8>>,
    requests: RefCell<Vec<String>>,
}

impl FakeClient {
    fn add_blob(&mut self, data: &[u8]) -> String {
        let digest = format!("sha256:{:x}", Sha256::digest(data));
        self.blobs.insert(digest.clone(), data.to_vec());
        digest
    }

    fn add_component(&mut self, base_url: &str, cd_yaml: &str) {
        let cd = crate::codec::decode_descriptor(cd_yaml.as_bytes()).unwrap();
        let digest = self.add_blob(cd_yaml.as_bytes());
        let manifest = json!({
            "schemaVersion": 2,
            "mediaType": OCI_MANIFEST_MEDIA_TYPE,
            "config": {"mediaType": "application/vnd.gardener.cloud.cnudie.component.config.v1+json", "digest": "sha256:00", "size": 0},
            "layers": [{"mediaType": COMPONENT_DESCRIPTOR_YAML_MEDIA_TYPE, "digest": digest, "size": cd_yaml.len()}],
        });
        let reference = OciReference::for_component(base_url, cd.name(), cd.version()).unwrap();
        self.manifests
            .insert(reference.to_string(), serde_json::to_vec(&manifest).unwrap());
    }
}

impl OciClient for FakeClient {
    fn get_manifest(&self, reference: &OciReference) -> Result<Option<Vec<u8>>> {
        self.requests.borrow_mut().push(format!("manifest {reference}"));
        Ok(self.manifests.get(&reference.to_string()).cloned())
    }

    fn fetch_blob(
        &self,
        reference: &OciReference,
        digest: &str,
        sink: &mut dyn Write,
    ) -> Result<u64> {
        self.requests.borrow_mut().push(format!("blob {digest}"));
        let data = self.blobs.get(digest).ok_or_else(|| Error::Registry {
            reference: reference.to_string(),
            reason: "blob not found".into(),
        })?;
        sink.write_all(data)?;
        Ok(data.len() as u64)
    }
}

const CD: &str = r#"
meta:
  schemaVersion: v2
component:
  name: example.com/frontend
  version: v1.0.0
  repositoryContexts:
    - type: ociRegistry
      baseUrl: registry.example.com/components
  provider: internal
  sources: []
  componentReferences: []
  resources: []
"#;

fn ctx() -> RepositoryContext {
    RepositoryContext::oci("registry.example.com/components")
}

#[rstest]
#[case("nginx", "docker.io", "nginx", Some("latest"), None)]
#[case("ghcr.io/org/image:v1", "ghcr.io", "org/image", Some("v1"), None)]
#[case("localhost:5000/repo", "localhost:5000", "repo", Some("latest"), None)]
#[case("example.com/repo@sha256:abc", "example.com", "repo", None, Some("sha256:abc"))]
#[case("example.com/repo:v2@sha256:abc", "example.com", "repo", Some("v2"), Some("sha256:abc"))]
#[case("https://example.com/a/b:1", "example.com", "a/b", Some("1"), None)]
fn test_parse_reference(
    #[case] given: &str,
    #[case] registry: &str,
    #[case] repository: &str,
    #[case] tag: Option<&str>,
    #[case] digest: Option<&str>,
) {
    let r = OciReference::parse(given).unwrap();
    assert_eq!(r.registry, registry);
    assert_eq!(r.repository, repository);
    assert_eq!(r.tag.as_deref(), tag);
    assert_eq!(r.digest.as_deref(), digest);
}

#[rstest]
#[case("")]
#[case("example.com/repo@abc")]
#[case("example.com/repo:")]
fn test_parse_invalid_reference(#[case] given: &str) {
    assert!(matches!(OciReference::parse(given), Err(Error::Registry { .. })));
}

#[rstest]
fn test_component_reference() {
    let r = OciReference::for_component(
        "registry.example.com/components/",
        "github.com/gardener/ingress",
        "v0.1.0",
    )
    .unwrap();
    assert_eq!(r.registry, "registry.example.com");
    assert_eq!(
        r.repository,
        "components/component-descriptors/github.com/gardener/ingress"
    );
    assert_eq!(r.reference(), "v0.1.0");
}

#[rstest]
fn test_resolve_component() {
    let mut client = FakeClient::default();
    client.add_component("registry.example.com/components", CD);

    let resolver = OciComponentResolver::new(&client);
    let cd = resolver
        .resolve(&CancelToken::new(), Some(&ctx()), "example.com/frontend", "v1.0.0")
        .unwrap();
    assert_eq!(cd.name(), "example.com/frontend");
}

#[rstest]
fn test_resolve_component_from_tar_layer() {
    let mut client = FakeClient::default();
    let mut builder = tar::Builder::new(Vec::new());
    let mut header = tar::Header::new_gnu();
    header.set_size(CD.len() as u64);
    header.set_mode(0o644);
    builder
        .append_data(&mut header, COMPONENT_DESCRIPTOR_FILENAME, CD.as_bytes())
        .unwrap();
    let layer = builder.into_inner().unwrap();
    let digest = client.add_blob(&layer);

    let manifest = json!({
        "schemaVersion": 2,
        "layers": [{"mediaType": COMPONENT_DESCRIPTOR_TAR_MEDIA_TYPE, "digest": digest, "size": layer.len()}],
    });
    let reference = OciReference::for_component(
        "registry.example.com/components",
        "example.com/frontend",
        "v1.0.0",
    )
    .unwrap();
    client
        .manifests
        .insert(reference.to_string(), serde_json::to_vec(&manifest).unwrap());

    let resolver = OciComponentResolver::new(&client);
    let cd = resolver
        .resolve(&CancelToken::new(), Some(&ctx()), "example.com/frontend", "v1.0.0")
        .unwrap();
    assert_eq!(cd.version(), "v1.0.0");
}

#[rstest]
fn test_missing_component() {
    let client = FakeClient::default();
    let resolver = OciComponentResolver::new(&client);

    let err = resolver
        .resolve(&CancelToken::new(), Some(&ctx()), "example.com/missing", "v1")
        .unwrap_err();
    assert!(matches!(err, Error::ComponentNotFound { .. }));

    let no_ctx = resolver
        .resolve(&CancelToken::new(), None, "example.com/missing", "v1")
        .unwrap_err();
    assert!(matches!(no_ctx, Error::ComponentNotFound { .. }));
}

#[rstest]
fn test_cancelled_before_request() {
    let mut client = FakeClient::default();
    client.add_component("registry.example.com/components", CD);
    let resolver = OciComponentResolver::new(&client);

    let cancel = CancelToken::new();
    cancel.cancel();
    let err = resolver
        .resolve(&cancel, Some(&ctx()), "example.com/frontend", "v1.0.0")
        .unwrap_err();
    assert!(matches!(err, Error::Cancelled));
    assert!(client.requests.borrow().is_empty());
}

#[rstest]
fn test_local_oci_blob() {
    let mut client = FakeClient::default();
    client.add_component("registry.example.com/components", CD);
    let digest = client.add_blob(b"chart-bytes");

    let resolver = OciComponentResolver::new(&client);
    let cancel = CancelToken::new();
    let (_, blobs) = resolver
        .resolve_with_blobs(&cancel, Some(&ctx()), "example.com/frontend", "v1.0.0")
        .unwrap();

    let res = Resource {
        name: "chart".into(),
        resource_type: "helm".into(),
        access: Some(
            serde_json::from_value(json!({
                "type": "localOciBlob",
                "digest": digest,
                "mediaType": "application/tar+gzip",
            }))
            .unwrap(),
        ),
        ..Default::default()
    };
    let mut out = Vec::new();
    let info = blobs.resolve(&cancel, &res, &mut out).unwrap();
    assert_eq!(out, b"chart-bytes");
    assert_eq!(info.digest, digest);
    assert_eq!(info.media_type, "application/tar+gzip");

    cancel.cancel();
    assert!(matches!(blobs.info(&cancel, &res), Err(Error::Cancelled)));
}

#[rstest]
fn test_oci_registry_access_returns_manifest() {
    let mut client = FakeClient::default();
    client.add_component("registry.example.com/components", CD);
    let image_manifest = serde_json::to_vec(&json!({
        "schemaVersion": 2,
        "mediaType": DOCKER_MANIFEST_MEDIA_TYPE,
        "layers": [],
    }))
    .unwrap();
    client
        .manifests
        .insert("example.com/image:v1".into(), image_manifest.clone());

    let resolver = OciComponentResolver::new(&client);
    let cancel = CancelToken::new();
    let (_, blobs) = resolver
        .resolve_with_blobs(&cancel, Some(&ctx()), "example.com/frontend", "v1.0.0")
        .unwrap();
    let res = Resource {
        name: "image".into(),
        resource_type: "ociImage".into(),
        access: Some(
            serde_json::from_value(json!({"type": "ociRegistry", "imageReference": "example.com/image:v1"}))
                .unwrap(),
        ),
        ..Default::default()
    };
    let mut out = Vec::new();
    let info = blobs.resolve(&cancel, &res, &mut out).unwrap();
    assert_eq!(out, image_manifest);
    assert_eq!(info.media_type, DOCKER_MANIFEST_MEDIA_TYPE);
}
