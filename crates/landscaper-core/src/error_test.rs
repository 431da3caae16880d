// Copyright (c) Contributors to the SPK project.
// SPDX-License-Identifier: Apache-2.0

use rstest::rstest;

use super::*;

#[rstest]
fn test_root_unwraps_steps() {
    let err = Error::ComponentNotFound {
        name: "example.com/a".into(),
        version: "v1.0.0".into(),
    }
    .in_step("bind")
    .in_step("render");

    assert!(matches!(err.root(), Error::ComponentNotFound { .. }));
    assert!(err.to_string().starts_with("render: bind: Component"));
}

#[rstest]
fn test_step_context_on_result() {
    let res: Result<()> = Err(Error::Cancelled);
    let err = res.step("materialize").unwrap_err();
    assert!(err.is_cancelled());
    assert!(matches!(err, Error::InStep { step: "materialize", .. }));
}

#[rstest]
fn test_depth_message_lists_history() {
    let err = Error::SchemaDepthExceeded {
        max_depth: 1,
        history: vec!["root".into(), "local://a".into()],
    };
    assert_eq!(
        err.to_string(),
        "maxCallDepth (1) reached: root -> local://a"
    );
}
