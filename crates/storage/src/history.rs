//! Commit history walks
//!
//! A commit "modifies" a test when diffing it against its single parent
//! shows an add, change or delete of `<dir>/<name>/definition.json`. Merge
//! commits are never attributed to a test. A root commit has no parent to
//! diff against; per-test history still lists it when its tree holds the
//! test's definition, while the full-graph walk skips it.
//!
//! Per-commit results are memoized by object id; commits are immutable so
//! the memo never needs invalidation.

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use git2::{Commit, Delta, DiffOptions, Oid, Repository, Sort};
use proctor_core::{ReadError, ReadResult, Revision, RevisionDetails};
use tracing::{debug, trace};

use crate::layout::{self, DefinitionLayout};
use crate::persister::{commit_time, resolve_commit};

/// Convert a commit into a [`Revision`]
pub fn to_revision(commit: &Commit<'_>) -> Revision {
    let author = commit.author();
    Revision::new(
        commit.id().to_string(),
        author.name().unwrap_or_default(),
        commit_time(commit),
        commit.message().unwrap_or_default(),
    )
}

/// Stable sort by commit date, newest first
///
/// Walk order is topological, so commits with skewed clocks keep their
/// relative order only when their dates tie.
pub fn sort_newest_first(revisions: &mut [Revision]) {
    revisions.sort_by(|a, b| b.date().cmp(&a.date()));
}

/// Skip `start` revisions and keep at most `limit`
pub fn page(revisions: Vec<Revision>, start: usize, limit: usize) -> Vec<Revision> {
    revisions.into_iter().skip(start).take(limit).collect()
}

struct MemoEntry {
    names: Arc<BTreeSet<String>>,
    last_access: AtomicU64,
}

/// Memoizing history parser
///
/// When the memo is full, the least recently accessed commit is dropped.
pub struct HistoryParser {
    layout: DefinitionLayout,
    memo: DashMap<Oid, MemoEntry>,
    capacity: usize,
    ticks: AtomicU64,
}

impl HistoryParser {
    /// Parser for `layout`, remembering at most `capacity` commits
    pub fn new(layout: DefinitionLayout, capacity: usize) -> Self {
        Self {
            layout,
            memo: DashMap::new(),
            capacity: capacity.max(1),
            ticks: AtomicU64::new(0),
        }
    }

    fn tick(&self) -> u64 {
        self.ticks.fetch_add(1, Ordering::Relaxed)
    }

    /// Number of memoized commits
    pub fn memoized(&self) -> usize {
        self.memo.len()
    }

    /// Tests whose definition a single-parent commit added, changed or deleted
    ///
    /// Root and merge commits yield an empty set.
    ///
    /// # Errors
    ///
    /// Returns an error if the trees cannot be diffed.
    pub fn modified_tests(
        &self,
        repo: &Repository,
        commit: &Commit<'_>,
    ) -> ReadResult<Arc<BTreeSet<String>>> {
        if let Some(hit) = self.memo.get(&commit.id()) {
            hit.last_access.store(self.tick(), Ordering::Relaxed);
            return Ok(Arc::clone(&hit.names));
        }
        let names = Arc::new(self.diff_against_parent(repo, commit)?);
        if self.memo.len() >= self.capacity {
            let victim = self
                .memo
                .iter()
                .min_by_key(|e| e.value().last_access.load(Ordering::Relaxed))
                .map(|e| *e.key());
            if let Some(victim) = victim {
                self.memo.remove(&victim);
            }
        }
        self.memo.insert(
            commit.id(),
            MemoEntry {
                names: Arc::clone(&names),
                last_access: AtomicU64::new(self.tick()),
            },
        );
        Ok(names)
    }

    fn diff_against_parent(
        &self,
        repo: &Repository,
        commit: &Commit<'_>,
    ) -> ReadResult<BTreeSet<String>> {
        if commit.parent_count() != 1 {
            return Ok(BTreeSet::new());
        }
        let diff_error = |e: git2::Error| ReadError::repository(format!("diffing {}", commit.id()), e);
        let parent_tree = commit.parent(0).and_then(|p| p.tree()).map_err(diff_error)?;
        let tree = commit.tree().map_err(diff_error)?;

        let mut options = DiffOptions::new();
        options.pathspec(self.layout.definitions_dir());
        let diff = repo
            .diff_tree_to_tree(Some(&parent_tree), Some(&tree), Some(&mut options))
            .map_err(diff_error)?;

        Ok(diff
            .deltas()
            .filter_map(|delta| {
                let file = if delta.status() == Delta::Deleted {
                    delta.old_file()
                } else {
                    delta.new_file()
                };
                file.path()
            })
            .filter_map(|path| self.layout.test_name_from_definition_path(path))
            .collect())
    }

    fn root_has_test(&self, commit: &Commit<'_>, test_name: &str) -> bool {
        commit
            .tree()
            .and_then(|tree| tree.get_path(&self.layout.definition_path(test_name)))
            .is_ok()
    }

    /// Visit commits modifying `test_name` in walk order until `visit` returns false
    fn walk_modifications<F>(
        &self,
        repo: &Repository,
        from: Oid,
        test_name: &str,
        mut visit: F,
    ) -> ReadResult<()>
    where
        F: FnMut(&Commit<'_>) -> bool,
    {
        let walk_error = |e: git2::Error| ReadError::repository(format!("walking history of {}", test_name), e);
        let mut walk = repo.revwalk().map_err(walk_error)?;
        walk.set_sorting(Sort::TOPOLOGICAL | Sort::TIME).map_err(walk_error)?;
        walk.push(from).map_err(walk_error)?;

        for oid in walk {
            let commit = repo.find_commit(oid.map_err(walk_error)?).map_err(walk_error)?;
            let touches = match commit.parent_count() {
                0 => self.root_has_test(&commit, test_name),
                1 => self.modified_tests(repo, &commit)?.contains(test_name),
                _ => false,
            };
            if touches && !visit(&commit) {
                break;
            }
        }
        Ok(())
    }

    /// Commits modifying `test_name` reachable from `from`, newest first by date
    ///
    /// Merge commits are skipped; `start` and `limit` apply to the sorted list.
    ///
    /// # Errors
    ///
    /// Returns an error if the walk or a diff fails.
    pub fn test_history(
        &self,
        repo: &Repository,
        from: Oid,
        test_name: &str,
        start: usize,
        limit: usize,
    ) -> ReadResult<Vec<Revision>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut revisions = Vec::new();
        self.walk_modifications(repo, from, test_name, |commit| {
            revisions.push(to_revision(commit));
            true
        })?;
        sort_newest_first(&mut revisions);
        let revisions = page(revisions, start, limit);
        trace!(target: "proctor::history", test = test_name, count = revisions.len(), "Test history walked");
        Ok(revisions)
    }

    /// The topologically newest commit modifying `test_name` reachable from `from`
    ///
    /// Commit dates are ignored; a child always wins over its ancestors.
    ///
    /// # Errors
    ///
    /// Returns an error if the walk fails.
    pub fn latest_modification(
        &self,
        repo: &Repository,
        from: Oid,
        test_name: &str,
    ) -> ReadResult<Option<Oid>> {
        let mut newest = None;
        self.walk_modifications(repo, from, test_name, |commit| {
            newest = Some(commit.id());
            false
        })?;
        Ok(newest)
    }

    /// One commit plus the tests it modified
    ///
    /// Returns `None` for a malformed id, an unknown id, or an id that is
    /// not a commit.
    ///
    /// # Errors
    ///
    /// Returns an error if a known commit cannot be diffed.
    pub fn revision_details(
        &self,
        repo: &Repository,
        revision: &str,
    ) -> ReadResult<Option<RevisionDetails>> {
        if layout::validate_object_id(revision).is_err() {
            return Ok(None);
        }
        let commit = match resolve_commit(repo, revision) {
            Ok(commit) => commit,
            Err(ReadError::UnknownObject(_)) | Err(ReadError::InvalidObjectType { .. }) => {
                return Ok(None)
            }
            Err(e) => return Err(e),
        };
        let modified_tests = self.modified_tests(repo, &commit)?.as_ref().clone();
        Ok(Some(RevisionDetails {
            revision: to_revision(&commit),
            modified_tests,
        }))
    }

    /// History of every test, walking the full commit graph from `head`
    ///
    /// Each test's list is sorted by date, newest first; ties keep walk order.
    ///
    /// # Errors
    ///
    /// Returns an error if a commit cannot be read or diffed.
    pub fn all_histories(
        &self,
        repo: &Repository,
        head: Oid,
    ) -> ReadResult<BTreeMap<String, Vec<Revision>>> {
        let read_error = |e: git2::Error| ReadError::repository("walking commit graph", e);
        let mut histories: BTreeMap<String, Vec<Revision>> = BTreeMap::new();
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([head]);

        while let Some(oid) = queue.pop_front() {
            if !visited.insert(oid) {
                continue;
            }
            let commit = repo.find_commit(oid).map_err(read_error)?;
            queue.extend(commit.parent_ids());

            if commit.parent_count() != 1 {
                continue;
            }
            let names = self.modified_tests(repo, &commit)?;
            if names.is_empty() {
                continue;
            }
            let revision = to_revision(&commit);
            for name in names.iter() {
                histories
                    .entry(name.clone())
                    .or_default()
                    .push(revision.clone());
            }
        }

        for revisions in histories.values_mut() {
            sort_newest_first(revisions);
        }
        debug!(target: "proctor::history", commits = visited.len(), tests = histories.len(), "Parsed full history");
        Ok(histories)
    }
}
