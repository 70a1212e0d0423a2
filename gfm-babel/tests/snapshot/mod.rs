//! Example corpus tests
//!
//! Runs `fixtures/examples.yml` through the snapshot harness.

use gfm_babel::snapshot::{
    load_examples, load_examples_from_file, run_examples, ComrakRenderer, ExampleStatus,
    SnapshotError,
};
use std::path::PathBuf;

fn examples_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("examples.yml")
}

#[test]
fn test_fixture_examples_pass() {
    let examples = load_examples_from_file(examples_path()).unwrap();
    assert_eq!(examples.len(), 5);
    assert_eq!(examples[0].name, "01_01__paragraph");

    let outcomes = run_examples(&examples, &ComrakRenderer);
    let failures: Vec<_> = outcomes.iter().filter(|outcome| !outcome.passed()).collect();
    assert!(failures.is_empty(), "{failures:#?}");
}

#[test]
fn test_stale_html_snapshot_is_reported() {
    let examples = load_examples("stale:\n  markdown: \"*em*\"\n  html: \"<p>em</p>\"\n").unwrap();
    let outcomes = run_examples(&examples, &ComrakRenderer);
    match &outcomes[0].status {
        ExampleStatus::Failed(mismatches) => {
            let kinds: Vec<_> = mismatches.iter().map(|m| m.kind()).collect();
            assert_eq!(kinds, vec!["html"]);
        }
        other => panic!("expected a failure, got {other:?}"),
    }
}

#[test]
fn test_missing_file() {
    let err = load_examples_from_file("does/not/exist.yml").unwrap_err();
    assert!(matches!(err, SnapshotError::Io { .. }));
}
