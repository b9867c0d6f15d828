//! Write serialization and concurrent reads

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::common::*;

#[test]
fn concurrent_writers_are_serialized() {
    let t = Arc::new(TestStore::new());
    let writers = 4;
    let per_writer = 3;

    let handles: Vec<_> = (0..writers)
        .map(|w| {
            let t = Arc::clone(&t);
            thread::spawn(move || {
                (0..per_writer)
                    .map(|i| t.add(&format!("w{}_t{}", w, i), &definition("s"), (w * 10 + i) as i64))
                    .collect::<Vec<_>>()
            })
        })
        .collect();
    let revisions: BTreeSet<String> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();

    assert_eq!(revisions.len(), writers * per_writer);
    let matrix = t.store.current_test_matrix().unwrap();
    assert_eq!(matrix.len(), writers * per_writer);

    // every write is its own commit on one linear branch
    let history = t.store.matrix_history(0, 100).unwrap();
    assert_eq!(history.len(), writers * per_writer + 1);
    let remote = t.remote.repository();
    for revision in &history[..writers * per_writer] {
        let commit = remote.find_commit(git2::Oid::from_str(revision.revision()).unwrap()).unwrap();
        assert_eq!(commit.parent_count(), 1);
    }
}

#[test]
fn mutator_bodies_never_overlap() {
    let t = Arc::new(TestStore::new());
    let in_flight = Arc::new(AtomicUsize::new(0));
    let max_seen = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..4)
        .map(|w| {
            let t = Arc::clone(&t);
            let in_flight = Arc::clone(&in_flight);
            let max_seen = Arc::clone(&max_seen);
            thread::spawn(move || {
                for i in 0..3 {
                    let change = change("w", "concurrent write", w * 10 + i);
                    t.store
                        .persister()
                        .do_in_working_directory(&change, "", |_client| {
                            let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                            max_seen.fetch_max(now, Ordering::SeqCst);
                            thread::sleep(Duration::from_millis(5));
                            in_flight.fetch_sub(1, Ordering::SeqCst);
                            Ok(false)
                        })
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(max_seen.load(Ordering::SeqCst), 1);
}

#[test]
fn unchanged_transaction_returns_head_without_committing() {
    let t = TestStore::new();
    let a = t.add("alpha", &definition("a"), 1);

    let revision = t
        .store
        .persister()
        .do_in_working_directory(&change("x", "noop", 2), "", |_| Ok(false))
        .unwrap();
    assert_eq!(revision, a);
    assert_eq!(t.remote.head().to_string(), a);
}

#[test]
fn reads_proceed_while_a_write_holds_the_lock() {
    let t = Arc::new(TestStore::new());
    let a = t.add("alpha", &definition("a"), 1);

    let writer = {
        let t = Arc::clone(&t);
        thread::spawn(move || {
            t.store
                .persister()
                .do_in_working_directory(&change("x", "slow", 2), "", |_| {
                    thread::sleep(Duration::from_millis(300));
                    Ok(false)
                })
                .unwrap()
        })
    };
    thread::sleep(Duration::from_millis(50));

    let started = std::time::Instant::now();
    assert_eq!(t.store.test_definition("alpha", &a).unwrap(), Some(definition("a")));
    assert_eq!(t.store.history("alpha", 0, 10).unwrap().len(), 1);
    assert!(started.elapsed() < Duration::from_millis(250));

    writer.join().unwrap();
}

#[test]
fn concurrent_readers_agree() {
    let t = Arc::new(TestStore::new());
    let a = t.add("alpha", &definition("a"), 1);
    t.add("beta", &definition("b"), 2);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let t = Arc::clone(&t);
            let a = a.clone();
            thread::spawn(move || {
                for _ in 0..10 {
                    assert_eq!(t.store.test_definition("alpha", &a).unwrap(), Some(definition("a")));
                    assert_eq!(t.store.current_test_matrix().unwrap().len(), 2);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
}
