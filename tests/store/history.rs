//! Per-test history: ordering, completeness, merges, renames, paging

use std::collections::BTreeSet;

use crate::common::*;

fn seconds(minute: i64) -> i64 {
    at_minute(minute).timestamp()
}

#[test]
fn history_is_newest_first_and_complete() {
    let t = TestStore::new();
    let mut alpha = vec![t.add("alpha", &definition("a0"), 0)];
    t.add("beta", &definition("b0"), 1);
    for i in 1..5 {
        let previous = alpha.last().unwrap().clone();
        alpha.push(t.update("alpha", &previous, &definition(&format!("a{}", i)), i * 10));
        t.store
            .update_test_definition(
                &change("bob", "beta tweak", i * 10 + 1),
                "",
                "beta",
                &definition(&format!("b{}", i)),
                &metadata("m"),
            )
            .unwrap();
    }
    alpha.reverse();

    let history = t.store.history("alpha", 0, usize::MAX).unwrap();
    assert_eq!(revision_ids(&history), alpha);
    assert!(history.windows(2).all(|w| w[0].date() >= w[1].date()));
    assert_eq!(t.store.history("beta", 0, usize::MAX).unwrap().len(), 5);
}

#[test]
fn history_paging() {
    let t = TestStore::new();
    let mut ids = vec![t.add("alpha", &definition("v0"), 0)];
    for i in 1..6 {
        let previous = ids.last().unwrap().clone();
        ids.push(t.update("alpha", &previous, &definition(&format!("v{}", i)), i));
    }
    ids.reverse();

    assert_eq!(revision_ids(&t.store.history("alpha", 0, 2).unwrap()), ids[0..2].to_vec());
    assert_eq!(revision_ids(&t.store.history("alpha", 2, 3).unwrap()), ids[2..5].to_vec());
    assert_eq!(revision_ids(&t.store.history("alpha", 5, 10).unwrap()), ids[5..].to_vec());
    assert!(t.store.history("alpha", 6, 10).unwrap().is_empty());
    assert!(t.store.history("alpha", 0, 0).unwrap().is_empty());
}

#[test]
fn history_from_an_older_revision() {
    let t = TestStore::new();
    let a = t.add("alpha", &definition("v0"), 1);
    let b = t.update("alpha", &a, &definition("v1"), 2);
    t.update("alpha", &b, &definition("v2"), 3);

    let from_b = t.store.history_from("alpha", &b, 0, 10).unwrap();
    assert_eq!(revision_ids(&from_b), vec![b.clone(), a.clone()]);

    assert!(matches!(
        t.store.history_from("alpha", "HEAD", 0, 10),
        Err(StoreError::Read(_))
    ));
}

#[test]
fn unknown_test_has_empty_history() {
    let t = TestStore::new();
    t.add("alpha", &definition("a"), 1);

    assert!(t.store.history("nope", 0, 10).unwrap().is_empty());
    assert!(t.store.history("../alpha", 0, 10).unwrap().is_empty());
    assert!(t.store.current_test_definition("nope").unwrap().is_none());
}

#[test]
fn merge_commits_are_excluded() {
    let t = TestStore::new();
    let a = t.add("alpha", &definition("a0"), 1);
    let base = git2::Oid::from_str(&a).unwrap();

    let scratch = t.remote.scratch_clone();
    let side = scratch
        .write(&definition_path("beta"), "{\"salt\":\"b\",\"testType\":\"USER\"}")
        .commit("side: add beta", seconds(2));
    scratch.reset_to(base);
    let main = scratch
        .write(&definition_path("alpha"), "{\"salt\":\"a1\",\"testType\":\"USER\"}")
        .commit("main: change alpha", seconds(3));
    let merge = scratch
        .write(&definition_path("beta"), "{\"salt\":\"b\",\"testType\":\"USER\"}")
        .commit_with_parents("Merge side", seconds(4), &[main, side]);
    scratch.push();

    t.store.refresh().unwrap();
    assert_eq!(t.store.latest_version().unwrap(), merge.to_string());

    let alpha = revision_ids(&t.store.history("alpha", 0, 10).unwrap());
    assert_eq!(alpha, vec![main.to_string(), a.clone()]);
    let beta = revision_ids(&t.store.history("beta", 0, 10).unwrap());
    assert_eq!(beta, vec![side.to_string()]);

    let all = t.store.all_histories().unwrap();
    assert_eq!(revision_ids(&all["alpha"]), alpha);
    assert_eq!(revision_ids(&all["beta"]), beta);

    let details = t.store.revision_details(&merge.to_string()).unwrap().unwrap();
    assert!(details.modified_tests.is_empty());

    // the merge still shows up in the matrix history
    let matrix = revision_ids(&t.store.matrix_history(0, 1).unwrap());
    assert_eq!(matrix, vec![merge.to_string()]);
}

#[test]
fn renames_are_a_delete_and_an_add() {
    let t = TestStore::new();
    let a = t.add("alpha", &definition("a"), 1);

    let scratch = t.remote.scratch_clone();
    let content = std::fs::read_to_string(scratch.dir.path().join(definition_path("alpha"))).unwrap();
    let rename = scratch
        .remove("test-definitions/alpha")
        .write(&definition_path("gamma"), &content)
        .commit("rename alpha to gamma", seconds(2));
    scratch.push();
    t.store.refresh().unwrap();

    assert_eq!(
        revision_ids(&t.store.history("alpha", 0, 10).unwrap()),
        vec![rename.to_string(), a]
    );
    assert_eq!(
        revision_ids(&t.store.history("gamma", 0, 10).unwrap()),
        vec![rename.to_string()]
    );
    let details = t.store.revision_details(&rename.to_string()).unwrap().unwrap();
    assert_eq!(
        details.modified_tests,
        BTreeSet::from(["alpha".to_string(), "gamma".to_string()])
    );
    assert_eq!(t.store.current_test_definition("gamma").unwrap(), Some(definition("a")));
}

#[test]
fn matrix_history_between_is_half_open() {
    let t = TestStore::new();
    let ids: Vec<String> = (0..5)
        .map(|i| t.add(&format!("t{}", i), &definition("s"), i))
        .collect();

    let between = t.store.matrix_history_between(at_minute(1), at_minute(4)).unwrap();
    assert_eq!(revision_ids(&between), vec![ids[3].clone(), ids[2].clone(), ids[1].clone()]);

    assert!(t
        .store
        .matrix_history_between(at_minute(100), at_minute(200))
        .unwrap()
        .is_empty());
}

#[test]
fn matrix_history_includes_seed_commit() {
    let t = TestStore::new();
    let a = t.add("alpha", &definition("a"), 1);

    let all = t.store.matrix_history(0, 100).unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].revision(), a);
    assert_eq!(all[1].message(), "Initial commit");
    assert_eq!(revision_ids(&t.store.matrix_history(1, 100).unwrap()), vec![all[1].revision().to_string()]);
}

#[test]
fn skewed_commit_clocks_still_list_newest_first() {
    let t = TestStore::new();
    let first = t.add("alpha", &definition("a0"), 10);

    // a child committed with a clock behind its parent
    let scratch = t.remote.scratch_clone();
    let behind = scratch
        .write(&definition_path("alpha"), "{\"salt\":\"a1\",\"testType\":\"USER\"}")
        .commit("clock behind", seconds(5));
    let last = scratch
        .write(&definition_path("alpha"), "{\"salt\":\"a2\",\"testType\":\"USER\"}")
        .commit("clock fixed", seconds(15));
    scratch.push();
    t.store.refresh().unwrap();

    let expected = vec![last.to_string(), first.clone(), behind.to_string()];
    let history = t.store.history("alpha", 0, 10).unwrap();
    assert_eq!(revision_ids(&history), expected);
    assert_eq!(revision_ids(&t.store.history("alpha", 1, 1).unwrap()), vec![first.clone()]);

    let matrix_history = t.store.matrix_history(0, 10).unwrap();
    assert!(matrix_history.windows(2).all(|w| w[0].date() >= w[1].date()));
    assert_eq!(revision_ids(&matrix_history)[..3], expected[..]);
    assert_eq!(revision_ids(&t.store.matrix_history(2, 1).unwrap()), vec![behind.to_string()]);

    assert_eq!(revision_ids(&t.store.all_histories().unwrap()["alpha"]), expected);

    // the topological tip is what an update has to build on
    let updated = t.update("alpha", &last.to_string(), &definition("a3"), 20);

    // a tip dated before its ancestors is still the current content
    let scratch = t.remote.scratch_clone();
    let stale_clock = scratch
        .write(&definition_path("alpha"), "{\"salt\":\"late\",\"testType\":\"USER\"}")
        .commit("clock far behind", seconds(1));
    scratch.push();
    t.store.refresh().unwrap();

    assert_eq!(t.store.current_test_definition("alpha").unwrap().unwrap().salt, "late");
    let history = t.store.history("alpha", 0, 10).unwrap();
    assert_eq!(history[0].revision(), updated);
    assert_eq!(history.last().unwrap().revision(), stale_clock.to_string());
    t.update("alpha", &stale_clock.to_string(), &definition("a4"), 30);
}
