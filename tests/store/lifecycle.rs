//! Store lifecycle: initialization failures, refresh, close, workspace cleanup

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::common::*;
use proctor_store::CONFIG_FILE_NAME;
use tempfile::TempDir;

#[test]
fn store_name_follows_branch() {
    let t = TestStore::new();
    assert_eq!(t.store.name(), "GitProctor-HEAD");
    assert_eq!(t.store.state(), StoreState::Ready);

    let named = TestStore::with_config(|config| config.branch = Some(BRANCH.to_string()));
    assert_eq!(named.store.name(), "GitProctor-main");
    named.store.verify_setup().unwrap();
}

#[test]
fn closed_store_refuses_everything() {
    let t = TestStore::new();
    let a = t.add("alpha", &definition("a"), 1);
    t.store.close();

    assert_eq!(t.store.state(), StoreState::Closed);
    assert!(matches!(t.store.latest_version(), Err(StoreError::Closed)));
    assert!(matches!(t.store.test_definition("alpha", &a), Err(StoreError::Closed)));
    assert!(matches!(t.store.refresh(), Err(StoreError::Closed)));
    assert!(matches!(t.store.clean_user_workspace("alice"), Err(StoreError::Closed)));
    assert!(t
        .store
        .add_test_definition(&change("x", "late", 2), "beta", &definition("b"), &metadata("m"))
        .is_err());
}

#[test]
fn failed_initialization_recovers_on_refresh() {
    let remote = TestRemote::new();
    let hidden = remote.path.with_extension("hidden");
    std::fs::rename(&remote.path, &hidden).unwrap();

    let workspace = TempDir::new().unwrap();
    let store = GitProctorStore::new(remote.config(workspace.path())).unwrap();
    assert_eq!(store.state(), StoreState::Failed);
    assert!(matches!(store.latest_version(), Err(StoreError::Setup { .. })));
    assert!(store.verify_setup().is_err());
    assert!(store.refresh().is_err());
    assert_eq!(store.state(), StoreState::Failed);

    std::fs::rename(&hidden, &remote.path).unwrap();
    store.refresh().unwrap();
    assert_eq!(store.state(), StoreState::Ready);
    assert_eq!(store.latest_version().unwrap(), remote.head().to_string());
}

#[test]
fn open_reports_initialization_failure() {
    let remote = TestRemote::new();
    std::fs::remove_dir_all(&remote.path).unwrap();

    let workspace = TempDir::new().unwrap();
    let err = GitProctorStore::open(remote.config(workspace.path())).err().unwrap();
    assert!(matches!(err, StoreError::Setup { .. }), "{}", err);
}

#[test]
fn invalid_config_is_rejected_up_front() {
    let workspace = TempDir::new().unwrap();
    let config = GitStoreConfig::new("", workspace.path().join("checkout"));
    assert!(matches!(GitProctorStore::new(config), Err(StoreError::Config(_))));
}

#[test]
fn existing_checkout_is_reused() {
    let t = TestStore::new();
    let a = t.add("alpha", &definition("a"), 1);
    let config = t.store.config().clone();
    t.store.close();

    let marker = t.checkout().join(".git").join("proctor-marker");
    std::fs::write(&marker, "kept").unwrap();
    let reopened = GitProctorStore::open(config.clone()).unwrap();
    assert!(marker.exists());
    assert_eq!(reopened.latest_version().unwrap(), a);
    reopened.close();

    let mut clean = config;
    clean.clean_initialization = true;
    let recloned = GitProctorStore::open(clean).unwrap();
    assert!(!marker.exists());
    assert_eq!(recloned.latest_version().unwrap(), a);
}

#[test]
fn clean_user_workspace_discards_local_state() {
    let t = TestStore::with_config(|config| config.branch = Some(BRANCH.to_string()));
    let a = t.add("alpha", &definition("a"), 1);

    std::fs::write(t.checkout().join(definition_path("alpha")), "garbage").unwrap();
    std::fs::write(t.checkout().join("stray.txt"), "left behind").unwrap();

    t.store.clean_user_workspace("alice").unwrap();
    assert_eq!(t.store.state(), StoreState::Ready);
    assert!(!t.checkout().join("stray.txt").exists());
    let on_disk = std::fs::read_to_string(t.checkout().join(definition_path("alpha"))).unwrap();
    assert_ne!(on_disk, "garbage");
    assert_eq!(t.store.latest_version().unwrap(), a);
}

#[test]
fn refresh_picks_up_remote_commits() {
    let t = TestStore::new();
    let (_workspace, other) = t.second_client();
    let a = t.add("alpha", &definition("a"), 1);

    assert_ne!(other.latest_version().unwrap(), a);
    other.refresh().unwrap();
    assert_eq!(other.latest_version().unwrap(), a);
}

#[test]
fn background_refresher_pulls_periodically() {
    let remote = TestRemote::new();
    let workspace = TempDir::new().unwrap();
    let mut config = remote.config(workspace.path());
    config.refresh_interval_secs = 1;
    let store = Arc::new(GitProctorStore::open(config).unwrap());
    let (refresher, handle) = store.spawn_refresher().unwrap();

    let scratch = remote.scratch_clone();
    let pushed = scratch
        .write(&definition_path("alpha"), "{\"salt\":\"a\",\"testType\":\"USER\"}")
        .commit("outside", at_minute(1).timestamp());
    scratch.push();

    let deadline = Instant::now() + Duration::from_secs(10);
    while store.latest_version().unwrap() != pushed.to_string() {
        assert!(Instant::now() < deadline, "refresher never pulled {}", pushed);
        thread::sleep(Duration::from_millis(100));
    }
    assert!(refresher.runs() >= 1);
    refresher.stop(handle);
    assert!(refresher.is_shutdown());
}

#[test]
fn no_refresher_without_interval() {
    let t = TestStore::new();
    let store = Arc::new(GitProctorStore::open(t.store.config().clone()).unwrap());
    assert!(store.spawn_refresher().is_none());
}

#[test]
fn store_from_config_file() {
    let remote = TestRemote::new();
    let workspace = TempDir::new().unwrap();
    let path = workspace.path().join(CONFIG_FILE_NAME);
    std::fs::write(
        &path,
        format!(
            "git_url = '{}'\nworkspace_root = '{}'\nbranch = 'main'\nlock_timeout_secs = 5\n",
            remote.url(),
            workspace.path().join("checkout").display()
        ),
    )
    .unwrap();

    let config = GitStoreConfig::from_file(&path).unwrap();
    assert_eq!(config.lock_timeout_secs, 5);
    let store = GitProctorStore::open(config).unwrap();
    assert_eq!(store.latest_version().unwrap(), remote.head().to_string());
    assert!(store.current_test_matrix().unwrap().is_empty());
}
