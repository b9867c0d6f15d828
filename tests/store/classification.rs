//! Failed writes: classification and checkout recovery

use crate::common::*;
use proctor_store::{classify, CauseKind};

#[test]
fn unreachable_remote_fails_and_leaves_a_clean_checkout() {
    let t = TestStore::new();
    let a = t.add("alpha", &definition("a"), 1);

    std::fs::remove_dir_all(&t.remote.path).unwrap();

    let err = t
        .store
        .add_test_definition(&change("x", "add beta", 2), "beta", &definition("b"), &metadata("m"))
        .unwrap_err();
    assert_eq!(err.kind(), UpdateErrorKind::Failed, "{}", err);
    assert!(err.message().starts_with("Unable to commit/push changes"), "{}", err);
    assert!(err.cause().is_some());

    // the local commit was rolled back and the new files are gone
    assert!(!t.checkout().join("test-definitions/beta").exists());
    assert_eq!(t.store.latest_version().unwrap(), a);
    assert_eq!(t.store.current_test_definition("beta").unwrap(), None);
    assert_eq!(t.store.current_test_definition("alpha").unwrap(), Some(definition("a")));
}

#[test]
fn preconditions_are_never_reclassified() {
    let t = TestStore::new();
    std::fs::remove_dir_all(&t.remote.path).unwrap();

    let err = t
        .store
        .delete_test_definition(&change("x", "rm", 1), "", "ghost", &definition("a"))
        .unwrap_err();
    assert_eq!(err.kind(), UpdateErrorKind::Precondition);
}

#[test]
fn only_hosted_remotes_are_classified() {
    let hosted = "https://git.example.com/team/definitions.git";
    let c = classify(hosted, CauseKind::Transport, "authentication: not authorized").unwrap();
    assert_eq!(c.kind, UpdateErrorKind::NoAuthorization);

    assert!(classify("/srv/git/definitions", CauseKind::Transport, "not authorized").is_none());
    assert!(classify(hosted, CauseKind::Other, "not authorized").is_none());
}
