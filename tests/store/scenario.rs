//! End-to-end: add a, add b, update a

use std::collections::BTreeSet;

use crate::common::*;

#[test]
fn add_add_update_scenario() {
    let t = TestStore::new();

    let a = t.add("alpha", &definition("a1"), 1);
    let b = t.add("beta", &definition("b1"), 2);
    let c = t.update("alpha", &a, &definition("a2"), 3);

    assert_eq!(t.store.latest_version().unwrap(), c);
    assert_eq!(t.remote.head().to_string(), c);

    assert_eq!(revision_ids(&t.store.history("alpha", 0, 10).unwrap()), vec![c.clone(), a.clone()]);
    assert_eq!(revision_ids(&t.store.history("beta", 0, 10).unwrap()), vec![b.clone()]);
    assert_eq!(
        revision_ids(&t.store.matrix_history(0, 3).unwrap()),
        vec![c.clone(), b.clone(), a.clone()]
    );

    let all = t.store.all_histories().unwrap();
    assert_eq!(all.keys().cloned().collect::<BTreeSet<_>>(), BTreeSet::from(["alpha".to_string(), "beta".to_string()]));
    assert_eq!(revision_ids(&all["alpha"]), vec![c.clone(), a.clone()]);
    assert_eq!(revision_ids(&all["beta"]), vec![b]);
}

#[test]
fn definitions_round_trip_at_every_revision() {
    let t = TestStore::new();
    let first = definition("first");
    let second = definition("second");

    let a = t.add("alpha", &first, 1);
    let c = t.update("alpha", &a, &second, 2);

    assert_eq!(t.store.test_definition("alpha", &a).unwrap(), Some(first.clone()));
    assert_eq!(t.store.test_definition("alpha", &c).unwrap(), Some(second.clone()));
    assert_eq!(t.store.current_test_definition("alpha").unwrap(), Some(second));
}

#[test]
fn commits_carry_change_metadata() {
    let t = TestStore::new();
    let change = change("Alice Author", "Add alpha\n\nfor the spring launch", 7)
        .with_credentials("alice_user", "secret");
    let revision = t
        .store
        .add_test_definition(&change, "alpha", &definition("a"), &metadata("m"))
        .unwrap();

    let history = t.store.history("alpha", 0, 1).unwrap();
    assert_eq!(history[0].revision(), revision);
    assert_eq!(history[0].author(), "Alice Author");
    assert_eq!(history[0].date(), at_minute(7));
    assert_eq!(history[0].message(), "Add alpha\n\nfor the spring launch");

    let remote = t.remote.repository();
    let commit = remote.find_commit(git2::Oid::from_str(&revision).unwrap()).unwrap();
    assert_eq!(commit.committer().name(), Some("alice_user"));
    assert_eq!(commit.author().name(), Some("Alice Author"));
}

#[test]
fn files_are_pretty_json_in_the_layout() {
    let t = TestStore::new();
    t.add("alpha", &definition("a"), 1);

    let dir = t.checkout().join("test-definitions").join("alpha");
    let definition_text = std::fs::read_to_string(dir.join("definition.json")).unwrap();
    let metadata_text = std::fs::read_to_string(dir.join("metadata.json")).unwrap();

    assert!(definition_text.contains("\n  \"testType\": \"USER\""));
    assert!(definition_text.contains("\"bucketValue\""));
    let parsed: TestMetadata = serde_json::from_str(&metadata_text).unwrap();
    assert_eq!(parsed, metadata("created"));
}

#[test]
fn delete_removes_test_from_latest_matrix_only() {
    let t = TestStore::new();
    let a = t.add("alpha", &definition("a"), 1);
    t.add("beta", &definition("b"), 2);
    let d = t.delete("alpha", &a, 3);

    let current = t.store.current_test_matrix().unwrap();
    assert_eq!(current.version, d);
    assert!(current.test("alpha").is_none());
    assert!(current.test("beta").is_some());

    let before = t.store.test_matrix(&a).unwrap();
    assert_eq!(before.test("alpha"), Some(&definition("a")));

    assert_eq!(revision_ids(&t.store.history("alpha", 0, 10).unwrap()), vec![d, a]);
    assert!(t.store.current_test_definition("alpha").unwrap().is_none());
}

#[test]
fn second_client_sees_first_clients_writes_after_refresh() {
    let t = TestStore::new();
    let (_workspace, other) = t.second_client();

    let a = t.add("alpha", &definition("a"), 1);
    other.refresh().unwrap();

    assert_eq!(other.latest_version().unwrap(), a);
    assert_eq!(other.current_test_definition("alpha").unwrap(), Some(definition("a")));
}
