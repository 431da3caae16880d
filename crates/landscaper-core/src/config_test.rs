// Copyright (c) Contributors to the SPK project.
// SPDX-License-Identifier: Apache-2.0

use rstest::rstest;

use super::*;

#[rstest]
fn test_load_full_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(CONFIG_FILE_NAME);
    std::fs::write(
        &path,
        "oci:\n  allow_plain_http: true\n  cache_dir: /tmp/cache\nrender:\n  output_format: json\n  max_ref_depth: 8\n",
    )
    .unwrap();

    let config = Config::load_from(&path).unwrap();
    assert!(config.oci.allow_plain_http);
    assert_eq!(config.oci.cache_dir, Some(PathBuf::from("/tmp/cache")));
    assert_eq!(config.oci.registry_config, None);
    assert_eq!(config.render.output_format.as_deref(), Some("json"));
    assert_eq!(config.render.max_ref_depth, Some(8));
}

#[rstest]
#[case("")]
#[case("\n  \n")]
#[case("render: {}\n")]
fn test_partial_config_uses_defaults(#[case] content: &str) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(CONFIG_FILE_NAME);
    std::fs::write(&path, content).unwrap();
    assert_eq!(Config::load_from(&path).unwrap(), Config::default());
}

#[rstest]
fn test_invalid_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(CONFIG_FILE_NAME);
    std::fs::write(&path, "render:\n  max_ref_depth: many\n").unwrap();
    let err = Config::load_from(&path).unwrap_err();
    assert!(matches!(err, Error::InvalidConfig { path: p, .. } if p == path));

    let err = Config::load_from(&dir.path().join("missing.yaml")).unwrap_err();
    assert!(matches!(err, Error::InvalidConfig { .. }));
}

#[rstest]
fn test_home_is_expanded() {
    let Some(home) = dirs::home_dir() else {
        return;
    };
    assert_eq!(expand_home(PathBuf::from("~/.docker/config.json")), home.join(".docker/config.json"));
    assert_eq!(expand_home(PathBuf::from("/abs/path")), PathBuf::from("/abs/path"));
}
