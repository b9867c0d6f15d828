//! Read and write contracts for test-definition stores
//!
//! Callers (management UI, CLI, loaders) only see these traits, so a store
//! backed by a different version-control system can be swapped in without
//! touching them.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::error::{StoreResult, UpdateResult};
use crate::model::{
    ChangeMetadata, Revision, RevisionDetails, TestDefinition, TestMatrixVersion, TestMetadata,
};

/// Read side of a test-definition store
///
/// Thread safety: all methods may be called concurrently; reads never wait
/// on the write lock.
pub trait ProctorReader: Send + Sync {
    /// Snapshot of every test at the latest revision
    ///
    /// # Errors
    ///
    /// Returns an error if any single test fails to resolve; no partial
    /// snapshot is ever returned.
    fn current_test_matrix(&self) -> StoreResult<TestMatrixVersion>;

    /// Snapshot of every test at `revision`
    ///
    /// # Errors
    ///
    /// Returns an error for a malformed or unknown revision, or if any
    /// single test fails to resolve.
    fn test_matrix(&self, revision: &str) -> StoreResult<TestMatrixVersion>;

    /// Latest definition of one test
    ///
    /// Returns `None` if the test has no history.
    ///
    /// # Errors
    ///
    /// Returns an error if the history walk or the content read fails.
    fn current_test_definition(&self, test_name: &str) -> StoreResult<Option<TestDefinition>>;

    /// Definition of one test at a commit or blob id
    ///
    /// Returns `None` if the test does not exist at that revision.
    ///
    /// # Errors
    ///
    /// Returns an error for a malformed or unknown id, or unparsable content.
    fn test_definition(&self, test_name: &str, revision: &str) -> StoreResult<Option<TestDefinition>>;

    /// Commit id of the branch head
    ///
    /// # Errors
    ///
    /// Returns an error if the head cannot be resolved.
    fn latest_version(&self) -> StoreResult<String>;

    /// Commits touching `test_name` reachable from the head, newest first
    ///
    /// # Errors
    ///
    /// Returns an error if the commit walk fails.
    fn history(&self, test_name: &str, start: usize, limit: usize) -> StoreResult<Vec<Revision>>;

    /// Commits touching `test_name` reachable from `from_revision`, newest first
    ///
    /// # Errors
    ///
    /// Returns an error for a malformed or unknown revision, or if the walk fails.
    fn history_from(
        &self,
        test_name: &str,
        from_revision: &str,
        start: usize,
        limit: usize,
    ) -> StoreResult<Vec<Revision>>;

    /// All commits reachable from the head, newest first
    ///
    /// # Errors
    ///
    /// Returns an error if the commit walk fails.
    fn matrix_history(&self, start: usize, limit: usize) -> StoreResult<Vec<Revision>>;

    /// Commits dated in `[since, until)`, newest first
    ///
    /// # Errors
    ///
    /// Returns an error if the commit walk fails.
    fn matrix_history_between(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> StoreResult<Vec<Revision>>;

    /// One commit plus the tests it modified
    ///
    /// Returns `None` for a malformed or unknown id.
    ///
    /// # Errors
    ///
    /// Returns an error if a known commit cannot be diffed.
    fn revision_details(&self, revision: &str) -> StoreResult<Option<RevisionDetails>>;

    /// History of every test, walking the whole commit graph
    ///
    /// Cost grows with the size of the graph; prefer [`ProctorReader::history`].
    ///
    /// # Errors
    ///
    /// Returns an error if the walk fails.
    fn all_histories(&self) -> StoreResult<BTreeMap<String, Vec<Revision>>>;

    /// Bring the local checkout up to date with the remote
    ///
    /// # Errors
    ///
    /// Returns an error if the fetch or reset fails.
    fn refresh(&self) -> StoreResult<()>;

    /// Confirm the store is usable
    ///
    /// # Errors
    ///
    /// Returns an error describing why the store is not usable.
    fn verify_setup(&self) -> StoreResult<()>;
}

/// Write side of a test-definition store
///
/// Writes are serialized; each returns the commit id it produced.
pub trait ProctorWriter: Send + Sync {
    /// Create a test
    ///
    /// # Errors
    ///
    /// Returns a precondition error if the test exists or the definition is
    /// invalid; otherwise a classified commit/push failure.
    fn add_test_definition(
        &self,
        change: &ChangeMetadata,
        test_name: &str,
        definition: &TestDefinition,
        metadata: &TestMetadata,
    ) -> UpdateResult<String>;

    /// Overwrite a test
    ///
    /// # Errors
    ///
    /// Returns a precondition error if the test does not exist, nothing
    /// changed, or the definition is invalid; otherwise a classified
    /// commit/push failure.
    fn update_test_definition(
        &self,
        change: &ChangeMetadata,
        previous_version: &str,
        test_name: &str,
        definition: &TestDefinition,
        metadata: &TestMetadata,
    ) -> UpdateResult<String>;

    /// Remove a test
    ///
    /// # Errors
    ///
    /// Returns a precondition error if the test does not exist; otherwise a
    /// classified commit/push failure.
    fn delete_test_definition(
        &self,
        change: &ChangeMetadata,
        previous_version: &str,
        test_name: &str,
        definition: &TestDefinition,
    ) -> UpdateResult<String>;

    /// Discard local changes and re-initialize the checkout
    ///
    /// # Errors
    ///
    /// Returns an error if re-initialization fails.
    fn clean_user_workspace(&self, username: &str) -> StoreResult<()>;
}
