// Copyright (c) Contributors to the SPK project.
// SPDX-License-Identifier: Apache-2.0

use rstest::rstest;
use tempfile::TempDir;

use super::*;

#[rstest]
#[case("a/b", "a/b")]
#[case("/a/./b", "a/b")]
#[case("../../a", "a")]
#[case("a/../../b", "b")]
#[case("/", "")]
fn test_normalize_clamps_at_root(#[case] given: &str, #[case] expected: &str) {
    assert_eq!(normalize(Path::new(given)), PathBuf::from(expected));
}

#[rstest]
fn test_memory_shadows_host() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("blueprint.yaml"), "host").unwrap();

    let mut fs = OverlayFs::new(dir.path());
    assert_eq!(fs.read_to_string("/blueprint.yaml").unwrap(), "host");

    fs.write("blueprint.yaml", "memory").unwrap();
    assert_eq!(fs.read_to_string("blueprint.yaml").unwrap(), "memory");
    // host untouched until persist
    assert_eq!(
        std::fs::read_to_string(dir.path().join("blueprint.yaml")).unwrap(),
        "host"
    );
}

#[rstest]
fn test_read_dir_merges_layers() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir(dir.path().join("data")).unwrap();
    std::fs::write(dir.path().join("data/host.txt"), "x").unwrap();

    let mut fs = OverlayFs::new(dir.path());
    fs.write("data/mem.txt", "y").unwrap();
    fs.mkdir_all("data/sub").unwrap();

    let names: Vec<_> = fs
        .read_dir("data")
        .unwrap()
        .into_iter()
        .map(|e| (e.name, e.is_dir))
        .collect();
    assert_eq!(
        names,
        vec![
            ("host.txt".to_string(), false),
            ("mem.txt".to_string(), false),
            ("sub".to_string(), true),
        ]
    );
    assert!(fs.is_dir("data/sub"));
    assert!(fs.exists("data/host.txt"));
    assert!(!fs.exists("data/missing.txt"));
}

#[rstest]
fn test_walk_files_is_sorted_and_recursive() {
    let dir = TempDir::new().unwrap();
    let mut fs = OverlayFs::new(dir.path());
    fs.write("b/2.txt", "").unwrap();
    fs.write("a/1.txt", "").unwrap();
    fs.write("a/deep/0.txt", "").unwrap();

    let files = fs.walk_files("/").unwrap();
    assert_eq!(
        files,
        vec![
            PathBuf::from("a/1.txt"),
            PathBuf::from("a/deep/0.txt"),
            PathBuf::from("b/2.txt"),
        ]
    );
}

#[rstest]
fn test_parent_dir_cannot_escape_root() {
    let dir = TempDir::new().unwrap();
    let inner = dir.path().join("inner");
    std::fs::create_dir(&inner).unwrap();
    std::fs::write(dir.path().join("secret"), "outside").unwrap();

    let fs = OverlayFs::new(&inner);
    assert!(fs.read("../secret").is_err());
    assert_eq!(fs.host_path("../secret"), inner.join("secret"));
}

#[rstest]
fn test_persist_writes_all_files() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("out");

    let mut fs = OverlayFs::new(&out);
    fs.write("deployitems/state", "state: {}\n").unwrap();
    fs.write("deployitems/my-item", "kind: DeployItem\n").unwrap();

    let written = fs.persist().unwrap();
    assert_eq!(written.len(), 2);
    assert_eq!(
        std::fs::read_to_string(out.join("deployitems/my-item")).unwrap(),
        "kind: DeployItem\n"
    );
}

#[rstest]
fn test_persist_removes_partial_output_on_failure() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("out");
    std::fs::create_dir_all(out.join("b")).unwrap();
    // a directory where a file should go makes the second write fail
    std::fs::create_dir_all(out.join("b/blocked")).unwrap();

    let mut fs = OverlayFs::new(&out);
    fs.write("a/first", "1").unwrap();
    fs.write("b/blocked", "2").unwrap();

    assert!(fs.persist().is_err());
    assert!(!out.join("a/first").exists());
    assert!(!out.join("a").exists());
    assert!(out.join("b/blocked").is_dir());
}
