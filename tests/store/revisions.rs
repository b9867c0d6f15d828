//! Revision details and revision-qualified reads

use std::collections::BTreeSet;

use crate::common::*;
use proctor_store::ReadError;

#[test]
fn revision_details_lists_exactly_the_modified_tests() {
    let t = TestStore::new();
    let a = t.add("alpha", &definition("a"), 1);
    t.add("beta", &definition("b"), 2);

    let details = t.store.revision_details(&a).unwrap().unwrap();
    assert_eq!(details.revision.revision(), a);
    assert_eq!(details.revision.author(), "alice");
    assert_eq!(details.modified_tests, BTreeSet::from(["alpha".to_string()]));
}

#[test]
fn metadata_only_update_modifies_no_test() {
    let t = TestStore::new();
    let a = t.add("alpha", &definition("a"), 1);
    let c = t
        .store
        .update_test_definition(
            &change("bob", "metadata only", 2),
            &a,
            "alpha",
            &definition("a"),
            &metadata("changed note"),
        )
        .unwrap();

    let details = t.store.revision_details(&c).unwrap().unwrap();
    assert!(details.modified_tests.is_empty());
    assert_eq!(revision_ids(&t.store.history("alpha", 0, 10).unwrap()), vec![a]);
}

#[test]
fn revision_details_of_unusable_ids_is_none() {
    let t = TestStore::new();
    t.add("alpha", &definition("a"), 1);

    assert!(t.store.revision_details("").unwrap().is_none());
    assert!(t.store.revision_details("not-a-revision").unwrap().is_none());
    assert!(t
        .store
        .revision_details("0123456789abcdef0123456789abcdef01234567")
        .unwrap()
        .is_none());

    // a blob id is a valid object but not a commit
    let matrix = t.store.current_test_matrix().unwrap();
    let versions = t.store.persister().determine_versions(&matrix.version).unwrap();
    let blob_id = &versions.test("alpha").unwrap().revision;
    assert!(t.store.revision_details(blob_id).unwrap().is_none());
}

#[test]
fn seed_commit_details_are_empty() {
    let t = TestStore::new();
    let seed = t.remote.head().to_string();

    let details = t.store.revision_details(&seed).unwrap().unwrap();
    assert_eq!(details.revision.message(), "Initial commit");
    assert!(details.modified_tests.is_empty());
}

#[test]
fn test_definition_by_blob_id() {
    let t = TestStore::new();
    let a = t.add("alpha", &definition("a"), 1);

    let versions = t.store.persister().determine_versions(&a).unwrap();
    assert_eq!(versions.version, a);
    assert_eq!(versions.author, "alice");
    assert_eq!(versions.published, at_minute(1));
    assert_eq!(versions.tests.len(), 1);

    let blob_id = versions.test("alpha").unwrap().revision.clone();
    assert_ne!(blob_id, a);
    assert_eq!(t.store.test_definition("alpha", &blob_id).unwrap(), Some(definition("a")));
}

#[test]
fn malformed_and_unknown_revisions() {
    let t = TestStore::new();
    t.add("alpha", &definition("a"), 1);

    for bad in ["", "HEAD", "main", "abc123", "g123456789012345678901234567890123456789"] {
        match t.store.test_definition("alpha", bad) {
            Err(StoreError::Read(ReadError::MalformedId(id))) => assert_eq!(id, bad),
            other => panic!("expected malformed id for {:?}, got {:?}", bad, other),
        }
    }

    // the revision is checked before the test name
    for name in ["bad-name", "../x", ""] {
        match t.store.test_definition(name, "zzz") {
            Err(StoreError::Read(ReadError::MalformedId(id))) => assert_eq!(id, "zzz"),
            other => panic!("expected malformed id for test {:?}, got {:?}", name, other),
        }
    }

    let unknown = "0123456789abcdef0123456789abcdef01234567";
    assert!(matches!(
        t.store.test_definition("alpha", unknown),
        Err(StoreError::Read(ReadError::UnknownObject(_)))
    ));
    assert!(matches!(
        t.store.test_matrix(unknown),
        Err(StoreError::Read(ReadError::UnknownObject(_)))
    ));
}

#[test]
fn missing_test_at_revision_is_none() {
    let t = TestStore::new();
    let a = t.add("alpha", &definition("a"), 1);

    assert_eq!(t.store.test_definition("beta", &a).unwrap(), None);
    let seed_commit = t
        .store
        .matrix_history(1, 1)
        .unwrap()
        .pop()
        .unwrap();
    assert_eq!(t.store.test_definition("alpha", seed_commit.revision()).unwrap(), None);
}
