//! Test matrix snapshots are all-or-nothing

use crate::common::*;
use proctor_store::ReadError;

#[test]
fn matrix_carries_commit_metadata() {
    let t = TestStore::new();
    t.add("alpha", &definition("a"), 1);
    let b = t.add("beta", &definition("b"), 2);

    let matrix = t.store.current_test_matrix().unwrap();
    assert_eq!(matrix.version, b);
    assert_eq!(matrix.author, "alice");
    assert_eq!(matrix.description, "add beta");
    assert_eq!(matrix.published, at_minute(2));
    assert_eq!(matrix.tests.keys().cloned().collect::<Vec<_>>(), vec!["alpha", "beta"]);
    assert_eq!(matrix.test("beta"), Some(&definition("b")));
}

#[test]
fn empty_repository_has_empty_matrix() {
    let t = TestStore::new();
    let matrix = t.store.current_test_matrix().unwrap();
    assert!(matrix.is_empty());
    assert_eq!(matrix.description, "Initial commit");
}

#[test]
fn one_unreadable_definition_voids_the_snapshot() {
    let t = TestStore::new();
    t.add("alpha", &definition("a"), 1);

    let scratch = t.remote.scratch_clone();
    let broken = scratch
        .write(&definition_path("broken"), "{ this is not json")
        .commit("broken definition", at_minute(2).timestamp());
    scratch.push();
    t.store.refresh().unwrap();

    match t.store.current_test_matrix() {
        Err(StoreError::IncompleteMatrix {
            revision,
            test_name,
            source: Some(ReadError::Json { .. }),
        }) => {
            assert_eq!(revision, broken.to_string());
            assert_eq!(test_name, "broken");
        }
        other => panic!("expected an incomplete matrix, got {:?}", other),
    }

    // the healthy test is still readable on its own
    assert_eq!(t.store.current_test_definition("alpha").unwrap(), Some(definition("a")));
    assert!(matches!(
        t.store.current_test_definition("broken"),
        Err(StoreError::Read(ReadError::Json { .. }))
    ));
}

#[test]
fn files_outside_the_layout_are_ignored() {
    let t = TestStore::new();
    t.add("alpha", &definition("a"), 1);

    let scratch = t.remote.scratch_clone();
    scratch
        .write("docs/definition.json", "{}")
        .write("test-definitions/definition.json", "{}")
        .write("test-definitions/nested/deeper/definition.json", "{}")
        .write("test-definitions/alpha/notes.txt", "free text")
        .commit("unrelated files", at_minute(2).timestamp());
    scratch.push();
    t.store.refresh().unwrap();

    let matrix = t.store.current_test_matrix().unwrap();
    assert_eq!(matrix.tests.keys().cloned().collect::<Vec<_>>(), vec!["alpha"]);
}

#[test]
fn custom_definitions_directory() {
    let t = TestStore::with_config(|config| config.definitions_directory = "matrix/tests".to_string());
    t.add("alpha", &definition("a"), 1);

    assert!(t.checkout().join("matrix/tests/alpha/definition.json").is_file());
    assert_eq!(t.store.current_test_matrix().unwrap().len(), 1);
    assert_eq!(t.store.history("alpha", 0, 10).unwrap().len(), 1);
}

#[test]
fn stored_names_outside_the_write_rules_are_readable() {
    let t = TestStore::new();
    t.add("alpha", &definition("a"), 1);

    let scratch = t.remote.scratch_clone();
    let pushed = scratch
        .write(&definition_path("my-test"), "{\"salt\":\"m\",\"testType\":\"USER\"}")
        .commit("hyphenated test", at_minute(2).timestamp());
    scratch.push();
    t.store.refresh().unwrap();

    let matrix = t.store.current_test_matrix().unwrap();
    assert_eq!(matrix.tests.keys().cloned().collect::<Vec<_>>(), vec!["alpha", "my-test"]);
    assert_eq!(matrix.test("my-test").map(|d| d.salt.as_str()), Some("m"));

    let current = t.store.current_test_definition("my-test").unwrap().unwrap();
    assert_eq!(current.salt, "m");
    let history = t.store.history("my-test", 0, 10).unwrap();
    assert_eq!(revision_ids(&history), vec![pushed.to_string()]);
    assert_eq!(t.store.all_histories().unwrap()["my-test"].len(), 1);

    // new tests still follow the stricter naming rule
    let err = t
        .store
        .add_test_definition(&change("x", "dash", 3), "your-test", &definition("y"), &metadata("m"))
        .unwrap_err();
    assert_eq!(err.kind(), UpdateErrorKind::Precondition);
}

#[test]
fn definitions_without_salt_or_type_still_load() {
    let t = TestStore::new();
    t.add("alpha", &definition("a"), 1);

    let scratch = t.remote.scratch_clone();
    scratch
        .write(
            &definition_path("sparse"),
            "{\"buckets\":[{\"name\":\"control\",\"value\":0}]}",
        )
        .commit("sparse definition", at_minute(2).timestamp());
    scratch.push();
    t.store.refresh().unwrap();

    let matrix = t.store.current_test_matrix().unwrap();
    assert_eq!(matrix.len(), 2);
    let sparse = matrix.test("sparse").unwrap();
    assert_eq!(sparse.salt, "");
    assert!(sparse.test_type.is_unspecified());
    assert_eq!(sparse.buckets.len(), 1);
    assert_eq!(matrix.test("alpha"), Some(&definition("a")));

    // writing one back requires a type
    let err = t
        .store
        .update_test_definition(&change("x", "resave", 3), "", "sparse", sparse, &metadata("m"))
        .unwrap_err();
    assert_eq!(err.kind(), UpdateErrorKind::Precondition);
    assert!(err.message().contains("Test type must be specified"), "{}", err);
}
