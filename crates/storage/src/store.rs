//! Git-backed test-definition store
//!
//! [`GitProctorStore`] implements [`ProctorReader`] and [`ProctorWriter`]
//! on top of a [`GitPersister`]. Content reads go through a
//! [`CachingDecorator`]; history queries go through a [`HistoryParser`].
//!
//! # Lifecycle
//!
//! ```text
//! Constructed -> Initializing -> Ready -> Closed
//!                     |
//!                     +-> Failed -> (refresh / clean_user_workspace) -> Initializing
//! ```
//!
//! A store whose initialization failed is still returned by
//! [`GitProctorStore::new`]; its operations report the failure until a
//! refresh succeeds. Use [`GitProctorStore::open`] to get the error up front.

pub mod legacy;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use chrono::{DateTime, Utc};
use git2::{Oid, Repository, Sort};
use parking_lot::RwLock;
use proctor_core::{
    ChangeMetadata, ProctorReader, ProctorWriter, ReadError, ReadResult, Revision,
    RevisionDetails, StoreError, StoreResult, TestDefinition, TestMatrixVersion, TestMetadata,
    TestUpdateError, UpdateResult,
};
use tracing::{debug, error, info, warn};

use crate::cache::{CacheStats, CachingDecorator, ContentSource};
use crate::client::WorkspaceClient;
use crate::config::GitStoreConfig;
use crate::history::{page, sort_newest_first, to_revision, HistoryParser};
use crate::layout::{self, ZERO_OBJECT_ID};
use crate::persister::{resolve_commit, GitPersister};
use crate::refresher::GitDirectoryRefresher;

/// Lifecycle state of a store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreState {
    /// Built, not yet initialized
    Constructed,
    /// Clone or pull in progress
    Initializing,
    /// Serving reads and writes
    Ready,
    /// Initialization failed; refresh retries it
    Failed,
    /// Closed; every operation fails
    Closed,
}

/// Store backed by a git repository
pub struct GitProctorStore {
    config: GitStoreConfig,
    content: CachingDecorator<GitPersister>,
    history: HistoryParser,
    state: RwLock<StoreState>,
}

impl GitProctorStore {
    /// Build a store and initialize its checkout
    ///
    /// Initialization failures are logged and leave the store in
    /// [`StoreState::Failed`].
    ///
    /// # Errors
    ///
    /// Returns an error only if the configuration is invalid or the
    /// workspace root cannot be created.
    pub fn new(config: GitStoreConfig) -> StoreResult<Self> {
        let store = Self::construct(config)?;
        if let Err(e) = store.initialize() {
            error!(target: "proctor::store", name = %store.name(), error = %e, "Store initialization failed; reads will fail until a refresh succeeds");
        }
        Ok(store)
    }

    /// Build a store, failing if the checkout cannot be initialized
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the clone/pull fails.
    pub fn open(config: GitStoreConfig) -> StoreResult<Self> {
        let store = Self::construct(config)?;
        store.initialize()?;
        Ok(store)
    }

    fn construct(config: GitStoreConfig) -> StoreResult<Self> {
        config.validate()?;
        let persister = GitPersister::new(&config)?;
        let history = HistoryParser::new(persister.layout().clone(), config.history_cache_capacity);
        let content = CachingDecorator::new(
            persister,
            config.cache_max_entries,
            config.cache_expire_after_access(),
        );
        Ok(Self {
            config,
            content,
            history,
            state: RwLock::new(StoreState::Constructed),
        })
    }

    fn initialize(&self) -> StoreResult<()> {
        {
            let mut state = self.state.write();
            if *state == StoreState::Closed {
                return Err(StoreError::Closed);
            }
            *state = StoreState::Initializing;
        }
        let started = Instant::now();
        let result = self.persister().initialize_repository();
        let next = if result.is_ok() {
            StoreState::Ready
        } else {
            StoreState::Failed
        };
        {
            let mut state = self.state.write();
            if *state != StoreState::Closed {
                *state = next;
            }
        }
        if result.is_ok() {
            info!(target: "proctor::store", name = %self.name(), elapsed_ms = started.elapsed().as_millis() as u64, "Store ready");
        }
        result
    }

    /// `GitProctor-<branch>`
    pub fn name(&self) -> String {
        format!("GitProctor-{}", self.config.branch.as_deref().unwrap_or("HEAD"))
    }

    /// Current lifecycle state
    pub fn state(&self) -> StoreState {
        *self.state.read()
    }

    /// Configuration the store was built with
    pub fn config(&self) -> &GitStoreConfig {
        &self.config
    }

    /// The underlying persister
    pub fn persister(&self) -> &GitPersister {
        self.content.inner()
    }

    /// Content cache counters
    pub fn cache_stats(&self) -> CacheStats {
        self.content.stats()
    }

    /// Release repository handles; every later operation fails with
    /// [`StoreError::Closed`]
    pub fn close(&self) {
        *self.state.write() = StoreState::Closed;
        self.persister().close();
        info!(target: "proctor::store", name = %self.name(), "Store closed");
    }

    /// Start a background refresher if `refresh_interval_secs` is set
    pub fn spawn_refresher(self: &Arc<Self>) -> Option<(GitDirectoryRefresher, JoinHandle<()>)> {
        let interval = self.config.refresh_interval()?;
        let reader: Arc<dyn ProctorReader> = Arc::clone(self) as Arc<dyn ProctorReader>;
        let refresher = GitDirectoryRefresher::new(reader, interval);
        let handle = refresher.start();
        info!(target: "proctor::store", interval_secs = interval.as_secs(), "Background refresher started");
        Some((refresher, handle))
    }

    fn ensure_ready(&self) -> StoreResult<()> {
        match *self.state.read() {
            StoreState::Ready => Ok(()),
            StoreState::Closed => Err(StoreError::Closed),
            StoreState::Failed => Err(StoreError::Setup {
                message: format!("{} failed to initialize; refresh to retry", self.name()),
                source: None,
            }),
            StoreState::Constructed | StoreState::Initializing => Err(StoreError::Setup {
                message: format!("{} is not initialized yet", self.name()),
                source: None,
            }),
        }
    }

    fn ensure_writable(&self) -> UpdateResult<()> {
        self.ensure_ready().map_err(StoreError::into_update_error)
    }

    fn with_repo<T, F>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Repository) -> ReadResult<T>,
    {
        Ok(self.persister().with_repo(f)??)
    }

    fn head_oid(repo: &Repository) -> ReadResult<Oid> {
        repo.head()
            .and_then(|head| head.peel_to_commit())
            .map(|commit| commit.id())
            .map_err(|e| ReadError::repository("resolving HEAD", e))
    }

    /// Every commit reachable from HEAD that `keep` accepts, newest first by date
    fn revisions_from_head<F>(&self, mut keep: F) -> StoreResult<Vec<Revision>>
    where
        F: FnMut(&Revision) -> bool,
    {
        self.with_repo(|repo| {
            let walk_error = |e: git2::Error| ReadError::repository("walking commit graph", e);
            let mut walk = repo.revwalk().map_err(walk_error)?;
            walk.set_sorting(Sort::TOPOLOGICAL | Sort::TIME)
                .map_err(walk_error)?;
            walk.push(Self::head_oid(repo)?).map_err(walk_error)?;

            let mut revisions = Vec::new();
            for oid in walk {
                let commit = repo.find_commit(oid.map_err(walk_error)?).map_err(walk_error)?;
                let revision = to_revision(&commit);
                if keep(&revision) {
                    revisions.push(revision);
                }
            }
            sort_newest_first(&mut revisions);
            Ok(revisions)
        })
    }

    // ========================================================================
    // Write helpers
    // ========================================================================

    fn check_test_name(test_name: &str) -> UpdateResult<()> {
        if layout::is_valid_test_name(test_name) {
            Ok(())
        } else {
            Err(TestUpdateError::precondition(format!(
                "Test name '{}' must contain only letters, digits and underscores",
                test_name
            )))
        }
    }

    /// Author and committer become git signatures, which must be non-blank
    /// and free of angle brackets
    fn check_change(change: &ChangeMetadata) -> UpdateResult<()> {
        for (role, identity) in [("author", change.author()), ("committer", change.committer())] {
            if identity.trim().is_empty() {
                return Err(TestUpdateError::precondition(format!(
                    "Change {} must not be empty",
                    role
                )));
            }
            if identity.contains(|c: char| c == '<' || c == '>') {
                return Err(TestUpdateError::precondition(format!(
                    "Change {} '{}' must not contain '<' or '>'",
                    role, identity
                )));
            }
        }
        Ok(())
    }

    fn check_definition(test_name: &str, definition: &TestDefinition) -> UpdateResult<()> {
        definition.validate().map_err(|e| {
            TestUpdateError::precondition(format!("Invalid definition for test {}: {}", test_name, e))
                .with_source(e)
        })
    }

    /// Refuse to overwrite changes the caller has not seen
    ///
    /// The test's latest modification reachable from the checkout head must
    /// be `previous_version` or one of its ancestors. An empty, all-zero or
    /// non-commit previous version skips the check.
    fn check_previous_version(
        &self,
        client: &WorkspaceClient<'_>,
        test_name: &str,
        previous_version: &str,
    ) -> UpdateResult<()> {
        if previous_version.is_empty() || previous_version == ZERO_OBJECT_ID {
            return Ok(());
        }
        let repo = client.repository();
        let previous = match resolve_commit(repo, previous_version) {
            Ok(commit) => commit.id(),
            Err(ReadError::UnknownObject(_)) => {
                return Err(TestUpdateError::precondition(format!(
                    "Previous version {} of test {} is unknown",
                    previous_version, test_name
                )))
            }
            Err(e) => {
                warn!(target: "proctor::store", test = test_name, previous = previous_version, error = %e, "Ignoring unusable previous version");
                return Ok(());
            }
        };
        let lookup_error = |e: ReadError| TestUpdateError::failed("Unable to determine test history", e);
        let head = Self::head_oid(repo).map_err(lookup_error)?;
        let latest = self
            .history
            .latest_modification(repo, head, test_name)
            .map_err(lookup_error)?;
        let up_to_date = match latest {
            None => true,
            Some(latest) if latest == previous => true,
            Some(latest) => repo.graph_descendant_of(previous, latest).unwrap_or(false),
        };
        if up_to_date {
            Ok(())
        } else {
            Err(TestUpdateError::precondition(format!(
                "Test {} was modified after version {}; confirm the latest state and try again",
                test_name, previous_version
            )))
        }
    }
}

impl ProctorReader for GitProctorStore {
    fn current_test_matrix(&self) -> StoreResult<TestMatrixVersion> {
        let latest = self.latest_version()?;
        self.test_matrix(&latest)
    }

    fn test_matrix(&self, revision: &str) -> StoreResult<TestMatrixVersion> {
        self.ensure_ready()?;
        let started = Instant::now();
        let versions = self.persister().determine_versions(revision)?;
        debug!(target: "proctor::store", revision, tests = versions.tests.len(), elapsed_ms = started.elapsed().as_millis() as u64, "Identified tests");

        let layout = self.persister().layout();
        let mut tests = BTreeMap::new();
        for version in &versions.tests {
            let segments = layout.definition_segments(&version.test_name);
            let incomplete = |source: Option<ReadError>| StoreError::IncompleteMatrix {
                revision: revision.to_string(),
                test_name: version.test_name.clone(),
                source,
            };
            match self
                .content
                .file_contents::<TestDefinition>(&segments, &version.revision)
            {
                Ok(Some(definition)) => {
                    tests.insert(version.test_name.clone(), definition);
                }
                Ok(None) => {
                    info!(target: "proctor::store", revision, test = %version.test_name, "Test definition missing, test matrix is void");
                    return Err(incomplete(None));
                }
                Err(e) => {
                    warn!(target: "proctor::store", revision, test = %version.test_name, error = %e, "Test definition unreadable, test matrix is void");
                    return Err(incomplete(Some(e)));
                }
            }
        }
        debug!(target: "proctor::store", revision, tests = tests.len(), elapsed_ms = started.elapsed().as_millis() as u64, "Loaded test matrix");

        Ok(TestMatrixVersion {
            tests,
            published: versions.published,
            author: versions.author,
            version: versions.version,
            description: versions.description,
        })
    }

    fn current_test_definition(&self, test_name: &str) -> StoreResult<Option<TestDefinition>> {
        self.ensure_ready()?;
        if !layout::is_stored_test_name(test_name) {
            return Ok(None);
        }
        let latest = self.with_repo(|repo| {
            let head = Self::head_oid(repo)?;
            self.history.latest_modification(repo, head, test_name)
        })?;
        match latest {
            Some(commit) => self.test_definition(test_name, &commit.to_string()),
            None => {
                debug!(target: "proctor::store", test = test_name, "No history for test");
                Ok(None)
            }
        }
    }

    fn test_definition(&self, test_name: &str, revision: &str) -> StoreResult<Option<TestDefinition>> {
        self.ensure_ready()?;
        layout::validate_object_id(revision)?;
        if !layout::is_stored_test_name(test_name) {
            return Ok(None);
        }
        let segments = self.persister().layout().definition_segments(test_name);
        Ok(self.content.file_contents(&segments, revision)?)
    }

    fn latest_version(&self) -> StoreResult<String> {
        self.ensure_ready()?;
        Ok(self.persister().latest_version()?)
    }

    fn history(&self, test_name: &str, start: usize, limit: usize) -> StoreResult<Vec<Revision>> {
        self.ensure_ready()?;
        if !layout::is_stored_test_name(test_name) {
            return Ok(Vec::new());
        }
        self.with_repo(|repo| {
            let head = Self::head_oid(repo)?;
            self.history.test_history(repo, head, test_name, start, limit)
        })
    }

    fn history_from(
        &self,
        test_name: &str,
        from_revision: &str,
        start: usize,
        limit: usize,
    ) -> StoreResult<Vec<Revision>> {
        self.ensure_ready()?;
        layout::validate_object_id(from_revision)?;
        if !layout::is_stored_test_name(test_name) {
            return Ok(Vec::new());
        }
        self.with_repo(|repo| {
            let from = resolve_commit(repo, from_revision)?.id();
            self.history.test_history(repo, from, test_name, start, limit)
        })
    }

    fn matrix_history(&self, start: usize, limit: usize) -> StoreResult<Vec<Revision>> {
        self.ensure_ready()?;
        let revisions = self.revisions_from_head(|_| true)?;
        Ok(page(revisions, start, limit))
    }

    fn matrix_history_between(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> StoreResult<Vec<Revision>> {
        self.ensure_ready()?;
        self.revisions_from_head(|revision| revision.date() >= since && revision.date() < until)
    }

    fn revision_details(&self, revision: &str) -> StoreResult<Option<RevisionDetails>> {
        self.ensure_ready()?;
        self.with_repo(|repo| self.history.revision_details(repo, revision))
    }

    fn all_histories(&self) -> StoreResult<BTreeMap<String, Vec<Revision>>> {
        self.ensure_ready()?;
        let started = Instant::now();
        let histories = self.with_repo(|repo| {
            let head = Self::head_oid(repo)?;
            self.history.all_histories(repo, head)
        })?;
        debug!(target: "proctor::store", tests = histories.len(), memoized = self.history.memoized(), elapsed_ms = started.elapsed().as_millis() as u64, "Parsed all histories");
        Ok(histories)
    }

    fn refresh(&self) -> StoreResult<()> {
        match self.state() {
            StoreState::Closed => Err(StoreError::Closed),
            StoreState::Ready => self.persister().refresh(),
            StoreState::Failed | StoreState::Constructed | StoreState::Initializing => {
                info!(target: "proctor::store", name = %self.name(), "Retrying initialization");
                self.initialize()
            }
        }
    }

    fn verify_setup(&self) -> StoreResult<()> {
        self.ensure_ready()?;
        self.persister().verify_setup()
    }
}

impl ProctorWriter for GitProctorStore {
    fn add_test_definition(
        &self,
        change: &ChangeMetadata,
        test_name: &str,
        definition: &TestDefinition,
        metadata: &TestMetadata,
    ) -> UpdateResult<String> {
        self.ensure_writable()?;
        Self::check_change(change)?;
        Self::check_test_name(test_name)?;
        Self::check_definition(test_name, definition)?;
        info!(target: "proctor::store", author = change.author(), committer = change.committer(), test = test_name, "Add test definition");

        let persister = self.persister();
        persister.do_in_working_directory(change, persister.add_test_revision(), |client| {
            let definition_path = client.layout().definition_path(test_name);
            let metadata_path = client.layout().metadata_path(test_name);
            if client.file_exists(&definition_path) || client.file_exists(&metadata_path) {
                return Err(TestUpdateError::precondition(format!(
                    "Supposedly new test '{}' already exists",
                    test_name
                )));
            }
            client.write_json(&definition_path, definition)?;
            client.write_json(&metadata_path, metadata)?;
            Ok(true)
        })
    }

    fn update_test_definition(
        &self,
        change: &ChangeMetadata,
        previous_version: &str,
        test_name: &str,
        definition: &TestDefinition,
        metadata: &TestMetadata,
    ) -> UpdateResult<String> {
        self.ensure_writable()?;
        Self::check_change(change)?;
        Self::check_test_name(test_name)?;
        Self::check_definition(test_name, definition)?;
        info!(target: "proctor::store", author = change.author(), committer = change.committer(), test = test_name, previous = previous_version, "Update test definition");

        self.persister()
            .do_in_working_directory(change, previous_version, |client| {
                let definition_path = client.layout().definition_path(test_name);
                if !client.file_exists(&definition_path) {
                    return Err(TestUpdateError::precondition(format!(
                        "Attempting to update non-existent test {}",
                        test_name
                    )));
                }
                self.check_previous_version(client, test_name, previous_version)?;

                let metadata_path = client.layout().metadata_path(test_name);
                let definition_changed = client.write_json_if_changed(&definition_path, definition)?;
                let metadata_changed = client.write_json_if_changed(&metadata_path, metadata)?;
                if !definition_changed && !metadata_changed {
                    return Err(TestUpdateError::precondition(format!(
                        "Attempting to save test definition without changes for test {}",
                        test_name
                    )));
                }
                Ok(true)
            })
    }

    fn delete_test_definition(
        &self,
        change: &ChangeMetadata,
        previous_version: &str,
        test_name: &str,
        _definition: &TestDefinition,
    ) -> UpdateResult<String> {
        self.ensure_writable()?;
        Self::check_change(change)?;
        Self::check_test_name(test_name)?;
        info!(target: "proctor::store", author = change.author(), committer = change.committer(), test = test_name, previous = previous_version, "Delete test definition");

        self.persister()
            .do_in_working_directory(change, previous_version, |client| {
                if !client.test_exists(test_name) {
                    return Err(TestUpdateError::precondition(format!(
                        "Unable to delete non-existent test {}",
                        test_name
                    )));
                }
                self.check_previous_version(client, test_name, previous_version)?;
                client.delete_test(test_name)
            })
    }

    fn clean_user_workspace(&self, username: &str) -> StoreResult<()> {
        if self.state() == StoreState::Closed {
            return Err(StoreError::Closed);
        }
        info!(target: "proctor::store", username, root = %self.persister().workspace().root_directory().display(), "Cleaning user workspace");
        if let Err(e) = self.persister().undo_local_changes() {
            warn!(target: "proctor::store", username, error = %e, "Unable to undo local changes, re-initializing anyway");
        }
        self.initialize()?;
        if let Some(branch) = self.config.branch.as_deref() {
            self.persister().checkout_branch(branch)?;
        }
        Ok(())
    }
}
