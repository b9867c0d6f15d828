//! Git persister: every direct interaction with the repository
//!
//! Reads resolve revision-qualified content through pooled handles and never
//! take the workspace lock. Everything that touches the checkout (clone,
//! pull, commit, push, reset) runs inside the workspace lock.
//!
//! # Write transaction
//!
//! 1. Acquire the workspace lock
//! 2. Pull: fetch the tracked branch and hard-reset onto it
//! 3. Run the mutator, which stages its own changes
//! 4. Refuse to commit if files of two or more tests are staged
//! 5. Commit (author from the change, committer from the user name)
//! 6. Push and check every ref update the remote reports
//! 7. On any failure: reset to the remote branch, drop untracked files,
//!    wrap the error and refine it with the classifier

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::Path;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{
    Commit, Cred, ErrorCode, FetchOptions, Object, ObjectType, Oid, PushOptions, RemoteCallbacks,
    Repository, ResetType, Signature, Status, StatusOptions, TreeWalkMode, TreeWalkResult,
};
use proctor_core::{
    BoxError, ChangeMetadata, ReadError, ReadResult, StoreError, StoreResult, TestUpdateError,
    TestVersion, TestVersionResult, UpdateResult,
};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::cache::ContentSource;
use crate::classifier::{self, PushRejected, TransportError};
use crate::client::WorkspaceClient;
use crate::config::GitStoreConfig;
use crate::layout::{self, DefinitionLayout, DEFINITION_FILENAME, ZERO_OBJECT_ID};
use crate::repo_pool::RepoPool;
use crate::workspace::{clean_directory, WorkspaceProvider};

const REMOTE_NAME: &str = "origin";
const MAX_CREDENTIAL_ATTEMPTS: u32 = 3;

/// Reported when the remote branch moved between our pull and our push
pub const NON_FAST_FORWARD_MESSAGE: &str = "Non-fast-forward push - there have likely been other commits made since starting. Confirm the latest state and try again.";

/// Failure of a git operation on the checkout
#[derive(Debug, Error)]
pub(crate) enum GitOpError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Rejected(#[from] PushRejected),
    #[error(transparent)]
    Git(#[from] git2::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("{0}")]
    State(String),
}

impl GitOpError {
    /// Unwrap into the typed cause so the classifier can find it
    fn into_cause(self) -> BoxError {
        match self {
            GitOpError::Transport(e) => Box::new(e),
            GitOpError::Rejected(e) => Box::new(e),
            GitOpError::Git(e) => Box::new(e),
            GitOpError::Io(e) => Box::new(e),
            GitOpError::State(msg) => msg.into(),
        }
    }

    fn into_update_error(self) -> TestUpdateError {
        let context = match &self {
            GitOpError::Transport(_) | GitOpError::Git(_) => "Unable to commit/push changes",
            GitOpError::Rejected(_) | GitOpError::State(_) => "Unable to push changes",
            GitOpError::Io(_) => "Unable to perform operation",
        };
        TestUpdateError::failed(format!("{}: {}", context, self), self.into_cause())
    }

    fn into_store_error(self, context: &str) -> StoreError {
        StoreError::repository(context.to_string(), self.into_cause())
    }
}

/// Transport credentials
#[derive(Clone, Default)]
struct Credentials {
    username: Option<String>,
    password: Option<String>,
}

impl Credentials {
    fn from_change(change: &ChangeMetadata, fallback: &Credentials) -> Self {
        match change.username() {
            Some(username) => Credentials {
                username: Some(username.to_string()),
                password: change.password().map(str::to_string),
            },
            None => fallback.clone(),
        }
    }
}

/// Remote callbacks carrying credentials and a transfer deadline
///
/// Progress callbacks return false once the deadline passes, which makes
/// libgit2 cancel the transfer.
fn remote_callbacks<'a>(credentials: Credentials, deadline: Instant) -> RemoteCallbacks<'a> {
    let mut callbacks = RemoteCallbacks::new();
    let mut attempts = 0;
    callbacks.credentials(move |_url, username_from_url, allowed| {
        attempts += 1;
        if attempts > MAX_CREDENTIAL_ATTEMPTS {
            return Err(git2::Error::from_str(
                "not authorized: the remote rejected the supplied credentials",
            ));
        }
        if allowed.is_user_pass_plaintext() {
            if let (Some(user), Some(pass)) = (&credentials.username, &credentials.password) {
                return Cred::userpass_plaintext(user, pass);
            }
        }
        if allowed.is_username() {
            if let Some(user) = credentials.username.as_deref().or(username_from_url) {
                return Cred::username(user);
            }
        }
        Cred::default()
    });
    callbacks.transfer_progress(move |_| Instant::now() < deadline);
    callbacks.sideband_progress(move |_| Instant::now() < deadline);
    callbacks
}

fn transport_error(
    operation: &'static str,
    error: git2::Error,
    deadline: Instant,
    timeout: Duration,
) -> TransportError {
    if Instant::now() >= deadline {
        let timed_out = git2::Error::from_str(&format!(
            "{} timed out after {}s ({})",
            operation,
            timeout.as_secs(),
            error.message()
        ));
        return TransportError::new(operation, timed_out);
    }
    TransportError::new(operation, error)
}

fn current_branch(repo: &Repository) -> Result<String, GitOpError> {
    let head = repo.head()?;
    if !head.is_branch() {
        return Err(GitOpError::State("HEAD is not on a branch".to_string()));
    }
    head.shorthand()
        .map(str::to_string)
        .ok_or_else(|| GitOpError::State("branch name is not valid UTF-8".to_string()))
}

fn tracking_ref(branch: &str) -> String {
    format!("refs/remotes/{}/{}", REMOTE_NAME, branch)
}

fn is_non_fast_forward(message: &str) -> bool {
    message.contains("non-fast-forward") || message.contains("fetch first")
}

/// Commit time of a commit as UTC
pub(crate) fn commit_time(commit: &Commit<'_>) -> DateTime<Utc> {
    DateTime::from_timestamp(commit.time().seconds(), 0).unwrap_or_default()
}

/// Resolve a full hex id to an object
pub(crate) fn resolve_object<'r>(repo: &'r Repository, revision: &str) -> ReadResult<Object<'r>> {
    layout::validate_object_id(revision)?;
    let oid = Oid::from_str(revision).map_err(|_| ReadError::MalformedId(revision.to_string()))?;
    repo.find_object(oid, None).map_err(|e| {
        if e.code() == ErrorCode::NotFound {
            ReadError::UnknownObject(revision.to_string())
        } else {
            ReadError::repository(format!("resolving {}", revision), e)
        }
    })
}

/// Resolve a full hex id to a commit
pub(crate) fn resolve_commit<'r>(repo: &'r Repository, revision: &str) -> ReadResult<Commit<'r>> {
    let object = resolve_object(repo, revision)?;
    let kind = object.kind();
    object.into_commit().map_err(|_| ReadError::InvalidObjectType {
        id: revision.to_string(),
        kind: kind.map_or("unknown", |k| k.str()).to_string(),
    })
}

/// The git-backed persister
pub struct GitPersister {
    git_url: String,
    branch: Option<String>,
    credentials: Credentials,
    clean_initialization: bool,
    clone_timeout: Duration,
    pull_push_timeout: Duration,
    layout: DefinitionLayout,
    workspace: WorkspaceProvider,
    pool: RepoPool,
}

impl GitPersister {
    /// Persister for `config`; nothing is cloned until
    /// [`GitPersister::initialize_repository`]
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the workspace
    /// root cannot be created.
    pub fn new(config: &GitStoreConfig) -> StoreResult<Self> {
        config.validate()?;
        let workspace = WorkspaceProvider::new(&config.workspace_root, config.lock_timeout())?;
        let pool = RepoPool::new(workspace.root_directory(), config.read_handles);
        Ok(Self {
            git_url: config.git_url.clone(),
            branch: config.branch.clone(),
            credentials: Credentials {
                username: config.username.clone(),
                password: config.password.clone(),
            },
            clean_initialization: config.clean_initialization,
            clone_timeout: config.clone_timeout(),
            pull_push_timeout: config.pull_push_timeout(),
            layout: DefinitionLayout::new(config.definitions_directory.clone()),
            workspace,
            pool,
        })
    }

    /// Remote URL
    pub fn git_url(&self) -> &str {
        &self.git_url
    }

    /// Configured branch, if any
    pub fn branch(&self) -> Option<&str> {
        self.branch.as_deref()
    }

    /// Repository layout
    pub fn layout(&self) -> &DefinitionLayout {
        &self.layout
    }

    /// The workspace provider
    pub fn workspace(&self) -> &WorkspaceProvider {
        &self.workspace
    }

    /// Run `f` with a pooled read-only handle
    ///
    /// # Errors
    ///
    /// Returns `ReadError::NotInitialized` if no checkout exists.
    pub fn with_repo<T, F>(&self, f: F) -> ReadResult<T>
    where
        F: FnOnce(&Repository) -> T,
    {
        self.pool.with_repo(f)
    }

    /// Revision used as "no previous version" for adds
    pub fn add_test_revision(&self) -> &'static str {
        ZERO_OBJECT_ID
    }

    // ========================================================================
    // Setup
    // ========================================================================

    /// Open and pull an existing checkout, or clone a fresh one
    ///
    /// A checkout that cannot be updated is wiped and re-cloned.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Setup` if the clone fails.
    pub fn initialize_repository(&self) -> StoreResult<()> {
        info!(target: "proctor::git", url = %self.git_url, root = %self.workspace.root_directory().display(), "Initializing repository");
        self.pool.reopen();
        let result = self.workspace.synchronized_operation(|root| {
            let has_checkout = root.join(".git").exists();
            if has_checkout && !self.clean_initialization {
                info!(target: "proctor::git", "Existing local repository found, pulling latest changes");
                match self.open_and_pull(root) {
                    Ok(()) => return Ok(()),
                    Err(e) => {
                        error!(target: "proctor::git", error = %e, "Could not update existing local repository, creating a new clone");
                    }
                }
            } else if has_checkout {
                info!(target: "proctor::git", "Existing local repository found, but creating a new clone to clean up working directory");
            } else {
                info!(target: "proctor::git", "Local repository not found, creating a new clone");
            }
            self.reclone(root)
        });
        if let Err(e) = &result {
            error!(target: "proctor::git", url = %self.git_url, error = %e, "Unable to initialize repository");
        }
        result
    }

    fn open_and_pull(&self, root: &Path) -> Result<(), GitOpError> {
        let repo = Repository::open(root)?;
        self.pull(&repo, &self.credentials)
    }

    fn reclone(&self, root: &Path) -> StoreResult<()> {
        self.pool.invalidate();
        clean_directory(root)?;

        let deadline = Instant::now() + self.clone_timeout;
        let mut fetch_options = FetchOptions::new();
        fetch_options.remote_callbacks(remote_callbacks(self.credentials.clone(), deadline));
        let mut builder = RepoBuilder::new();
        builder.fetch_options(fetch_options);
        if let Some(branch) = &self.branch {
            builder.branch(branch);
        }

        let started = Instant::now();
        builder.clone(&self.git_url, root).map_err(|e| {
            StoreError::setup(
                format!("Unable to clone git repository at {}", self.git_url),
                transport_error("clone", e, deadline, self.clone_timeout),
            )
        })?;
        self.pool.invalidate();
        info!(target: "proctor::git", url = %self.git_url, elapsed_ms = started.elapsed().as_millis() as u64, "Clone complete");
        Ok(())
    }

    /// Pull the latest changes into the checkout
    ///
    /// On failure local changes are undone and the error is returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock times out or the pull fails.
    pub fn refresh(&self) -> StoreResult<()> {
        self.workspace.synchronized_operation(|root| {
            let repo = Repository::open(root)
                .map_err(|e| StoreError::repository("opening checkout for refresh", e))?;
            if let Err(e) = self.pull(&repo, &self.credentials) {
                info!(target: "proctor::git", error = %e, "Refresh failed. Running undo local changes");
                self.undo_quietly(&repo);
                return Err(e.into_store_error("refreshing checkout"));
            }
            debug!(target: "proctor::git", root = %root.display(), "Refreshed checkout");
            Ok(())
        })
    }

    /// Reset the checkout to the remote branch, dropping untracked files
    ///
    /// # Errors
    ///
    /// Returns an error if the lock times out or the reset fails.
    pub fn undo_local_changes(&self) -> StoreResult<()> {
        self.workspace.synchronized_operation(|root| {
            let repo = Repository::open(root)
                .map_err(|e| StoreError::repository("opening checkout", e))?;
            self.undo(&repo)
                .map_err(|e| e.into_store_error("undoing local changes"))
        })
    }

    /// Create or force a local branch tracking `origin/<name>` and check it out
    ///
    /// # Errors
    ///
    /// Returns an error if a different branch was configured, the remote
    /// branch does not exist, or the checkout fails.
    pub fn checkout_branch(&self, name: &str) -> StoreResult<()> {
        if let Some(configured) = &self.branch {
            if configured != name {
                return Err(StoreError::Config(format!(
                    "Unable to checkout branch {} because this repository cloned only the branch {}",
                    name, configured
                )));
            }
        }
        self.workspace.synchronized_operation(|root| {
            let repo = Repository::open(root)
                .map_err(|e| StoreError::repository("opening checkout", e))?;
            self.checkout_branch_locked(&repo, name).map_err(|e| {
                error!(target: "proctor::git", branch = name, error = %e, "Unable to create/checkout branch");
                StoreError::repository(format!("checking out branch {}", name), e)
            })
        })
    }

    fn checkout_branch_locked(&self, repo: &Repository, name: &str) -> Result<(), git2::Error> {
        let target = repo.find_reference(&tracking_ref(name))?.peel_to_commit()?;
        let on_branch = current_branch(repo).ok().as_deref() == Some(name);
        if on_branch {
            repo.reset(target.as_object(), ResetType::Hard, None)?;
        } else {
            let mut branch = repo.branch(name, &target, true)?;
            branch.set_upstream(Some(&format!("{}/{}", REMOTE_NAME, name)))?;
            repo.set_head(&format!("refs/heads/{}", name))?;
            repo.checkout_head(Some(CheckoutBuilder::new().force()))?;
        }
        info!(target: "proctor::git", branch = name, head = %target.id(), "Checked out branch");
        Ok(())
    }

    /// Release repository handles; reads fail until re-initialized
    pub fn close(&self) {
        self.pool.close();
    }

    // ========================================================================
    // Pull / undo / push
    // ========================================================================

    fn fetch(&self, repo: &Repository, branch: &str, credentials: &Credentials) -> Result<(), GitOpError> {
        let deadline = Instant::now() + self.pull_push_timeout;
        let mut remote = repo.find_remote(REMOTE_NAME)?;
        let mut options = FetchOptions::new();
        options.remote_callbacks(remote_callbacks(credentials.clone(), deadline));
        let refspec = format!("+refs/heads/{}:{}", branch, tracking_ref(branch));
        remote
            .fetch(&[refspec.as_str()], Some(&mut options), None)
            .map_err(|e| transport_error("fetch", e, deadline, self.pull_push_timeout))?;
        Ok(())
    }

    fn pull(&self, repo: &Repository, credentials: &Credentials) -> Result<(), GitOpError> {
        let branch = current_branch(repo)?;
        self.fetch(repo, &branch, credentials)?;

        let remote_oid = repo.refname_to_id(&tracking_ref(&branch))?;
        let head_oid = repo
            .head()?
            .target()
            .ok_or_else(|| GitOpError::State("HEAD has no target".to_string()))?;
        if remote_oid == head_oid {
            return Ok(());
        }
        if repo.graph_descendant_of(remote_oid, head_oid)? {
            debug!(target: "proctor::git", from = %head_oid, to = %remote_oid, "Fast-forwarding");
        } else {
            warn!(target: "proctor::git", local = %head_oid, remote = %remote_oid, "Local branch diverged from remote, discarding local commits");
        }
        let target = repo.find_object(remote_oid, Some(ObjectType::Commit))?;
        repo.reset(&target, ResetType::Hard, None)?;
        Ok(())
    }

    fn undo(&self, repo: &Repository) -> Result<(), GitOpError> {
        info!(target: "proctor::git", "Undo local changes due to failure of git operations");
        repo.cleanup_state()?;
        let branch = current_branch(repo)?;
        let remote_oid = repo.refname_to_id(&tracking_ref(&branch))?;
        let target = repo.find_object(remote_oid, Some(ObjectType::Commit))?;
        repo.reset(&target, ResetType::Hard, None)?;
        remove_untracked(repo)?;
        info!(target: "proctor::git", head = %remote_oid, "Undo local changes completed");
        Ok(())
    }

    fn undo_quietly(&self, repo: &Repository) {
        if let Err(e) = self.undo(repo) {
            error!(target: "proctor::git", error = %e, "Unable to undo changes");
        }
    }

    fn push(&self, repo: &Repository, branch: &str, credentials: &Credentials) -> Result<(), GitOpError> {
        let deadline = Instant::now() + self.pull_push_timeout;
        let mut remote = repo.find_remote(REMOTE_NAME)?;
        let rejection: RefCell<Option<PushRejected>> = RefCell::new(None);
        {
            let mut callbacks = remote_callbacks(credentials.clone(), deadline);
            callbacks.push_update_reference(|reference, status| {
                if let Some(message) = status {
                    rejection.borrow_mut().get_or_insert_with(|| PushRejected {
                        reference: reference.to_string(),
                        message: message.to_string(),
                    });
                }
                Ok(())
            });
            let mut options = PushOptions::new();
            options.remote_callbacks(callbacks);

            let refspec = format!("refs/heads/{0}:refs/heads/{0}", branch);
            if let Err(e) = remote.push(&[refspec.as_str()], Some(&mut options)) {
                if e.code() == ErrorCode::NotFastForward || is_non_fast_forward(e.message()) {
                    return Err(GitOpError::State(NON_FAST_FORWARD_MESSAGE.to_string()));
                }
                return Err(transport_error("push", e, deadline, self.pull_push_timeout).into());
            }
        }
        if let Some(rejected) = rejection.into_inner() {
            if is_non_fast_forward(&rejected.message) {
                return Err(GitOpError::State(NON_FAST_FORWARD_MESSAGE.to_string()));
            }
            return Err(rejected.into());
        }

        let head = repo.refname_to_id(&format!("refs/heads/{}", branch))?;
        repo.reference(&tracking_ref(branch), head, true, "push: update tracking ref")?;
        Ok(())
    }

    // ========================================================================
    // Write transaction
    // ========================================================================

    /// Run `mutator` against the checkout, then commit and push its changes
    ///
    /// The mutator returns whether anything changed; when nothing did, no
    /// commit is made and the current head is returned. Otherwise the new
    /// commit id is returned.
    ///
    /// # Errors
    ///
    /// Mutator errors are returned as they are. Git failures are wrapped,
    /// refined by the classifier, and leave the checkout reset to the remote.
    pub fn do_in_working_directory<F>(
        &self,
        change: &ChangeMetadata,
        previous_version: &str,
        mutator: F,
    ) -> UpdateResult<String>
    where
        F: FnOnce(&WorkspaceClient<'_>) -> UpdateResult<bool>,
    {
        let credentials = Credentials::from_change(change, &self.credentials);
        let started = Instant::now();
        let outcome = self.workspace.synchronized_update_operation(|root| {
            let repo = Repository::open(root)
                .map_err(|e| TestUpdateError::failed("Unable to open local repository", e))?;

            if let Err(e) = self.pull(&repo, &credentials) {
                info!(target: "proctor::git", error = %e, "Failed to pull from the remote repository. Running undo local changes");
                self.undo_quietly(&repo);
            }

            let client = WorkspaceClient::new(&repo, root, &self.layout);
            let changed = match mutator(&client) {
                Ok(changed) => changed,
                Err(e) => {
                    self.undo_quietly(&repo);
                    return Err(e);
                }
            };
            if !changed {
                let head = repo
                    .refname_to_id("HEAD")
                    .map_err(|e| TestUpdateError::failed("Unable to resolve HEAD", e))?;
                return Ok(head.to_string());
            }

            match self.commit_and_push(&repo, change, &credentials) {
                Ok(oid) => Ok(oid.to_string()),
                Err(e) => {
                    self.undo_quietly(&repo);
                    Err(e.into_update_error())
                }
            }
        });

        match outcome {
            Ok(revision) => {
                info!(target: "proctor::git", revision = %revision, previous = previous_version, author = change.author(), elapsed_ms = started.elapsed().as_millis() as u64, "Write transaction committed");
                Ok(revision)
            }
            Err(e) => {
                let refined = classifier::refine(&self.git_url, e);
                warn!(target: "proctor::git", kind = %refined.kind(), error = %refined, previous = previous_version, "Write transaction failed");
                Err(refined)
            }
        }
    }

    fn commit_and_push(
        &self,
        repo: &Repository,
        change: &ChangeMetadata,
        credentials: &Credentials,
    ) -> Result<Oid, GitOpError> {
        let branch = current_branch(repo)?;
        let parent = repo.head()?.peel_to_commit()?;
        let mut index = repo.index()?;

        let staged = self.staged_test_names(repo, &parent, &index)?;
        debug!(target: "proctor::git", staged = ?staged, "Staged tests");
        if staged.len() >= 2 {
            error!(target: "proctor::git", staged = ?staged, "Multiple tests are going to be modified at the one commit");
            return Err(GitOpError::State(
                "Another test is staged unintentionally due to invalid local git state".to_string(),
            ));
        }
        if staged.is_empty() {
            warn!(target: "proctor::git", "No test files are staged");
        }

        let tree = repo.find_tree(index.write_tree()?)?;
        let when = git2::Time::new(change.timestamp().timestamp(), 0);
        let author = Signature::new(change.author(), change.author(), &when)?;
        let committer = Signature::new(change.committer(), change.committer(), &when)?;
        let oid = repo.commit(
            Some("HEAD"),
            &author,
            &committer,
            change.comment(),
            &tree,
            &[&parent],
        )?;
        debug!(target: "proctor::git", commit = %oid, "Committed");

        self.push(repo, &branch, credentials)?;
        Ok(oid)
    }

    fn staged_test_names(
        &self,
        repo: &Repository,
        head: &Commit<'_>,
        index: &git2::Index,
    ) -> Result<BTreeSet<String>, GitOpError> {
        let diff = repo.diff_tree_to_index(Some(&head.tree()?), Some(index), None)?;
        Ok(diff
            .deltas()
            .filter_map(|delta| delta.new_file().path().or_else(|| delta.old_file().path()))
            .filter_map(|path| self.layout.parse_test_name(path))
            .collect())
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Commit id of the checkout's head
    ///
    /// # Errors
    ///
    /// Returns an error if no checkout exists or the head cannot be resolved.
    pub fn latest_version(&self) -> ReadResult<String> {
        self.pool.with_repo(|repo| {
            repo.head()
                .and_then(|head| head.peel_to_commit())
                .map(|commit| commit.id().to_string())
                .map_err(|e| ReadError::repository("resolving HEAD", e))
        })?
    }

    /// Every test present at `revision`, with its definition blob id
    ///
    /// A recursive walk of the commit's tree; cost depends on tree size only.
    ///
    /// # Errors
    ///
    /// Returns an error for a malformed or unknown revision.
    pub fn determine_versions(&self, revision: &str) -> ReadResult<TestVersionResult> {
        layout::validate_object_id(revision)?;
        self.pool.with_repo(|repo| {
            let commit = resolve_commit(repo, revision)?;
            let tree = commit
                .tree()
                .map_err(|e| ReadError::repository("reading commit tree", e))?;

            let prefix = format!("{}/", self.layout.definitions_dir());
            let mut tests = Vec::new();
            tree.walk(TreeWalkMode::PreOrder, |dir, entry| {
                let name = entry.name().unwrap_or_default();
                if entry.kind() == Some(ObjectType::Tree) {
                    let path = format!("{}{}/", dir, name);
                    if path.starts_with(&prefix) || prefix.starts_with(&path) {
                        return TreeWalkResult::Ok;
                    }
                    return TreeWalkResult::Skip;
                }
                if name == DEFINITION_FILENAME {
                    let test_name = dir
                        .strip_prefix(prefix.as_str())
                        .and_then(|rest| rest.strip_suffix('/'))
                        .filter(|rest| layout::is_stored_test_name(rest));
                    if let Some(test_name) = test_name {
                        tests.push(TestVersion {
                            test_name: test_name.to_string(),
                            revision: entry.id().to_string(),
                        });
                    }
                }
                TreeWalkResult::Ok
            })
            .map_err(|e| ReadError::repository("walking commit tree", e))?;

            let author = commit.author();
            Ok(TestVersionResult {
                tests,
                published: commit_time(&commit),
                author: author.name().unwrap_or_default().to_string(),
                version: commit.id().to_string(),
                description: commit.message().unwrap_or_default().to_string(),
            })
        })?
    }

    /// Confirm the checkout's head resolves
    ///
    /// # Errors
    ///
    /// Returns an error describing why the repository is unusable.
    pub fn verify_setup(&self) -> StoreResult<()> {
        let head = self.latest_version()?;
        debug!(target: "proctor::git", head = %head, "Setup verified");
        Ok(())
    }
}

impl ContentSource for GitPersister {
    fn file_contents<T>(&self, path: &[&str], revision: &str) -> ReadResult<Option<T>>
    where
        T: DeserializeOwned + Clone + Send + Sync + 'static,
    {
        layout::validate_object_id(revision)?;
        let joined = path.join("/");
        self.pool.with_repo(|repo| {
            let object = resolve_object(repo, revision)?;
            let blob = match object.kind() {
                Some(ObjectType::Commit) => {
                    let tree = object
                        .peel_to_tree()
                        .map_err(|e| ReadError::repository("reading commit tree", e))?;
                    let entry = match tree.get_path(Path::new(&joined)) {
                        Ok(entry) => entry,
                        Err(e) if e.code() == ErrorCode::NotFound => return Ok(None),
                        Err(e) => return Err(ReadError::repository(format!("looking up {}", joined), e)),
                    };
                    repo.find_blob(entry.id())
                        .map_err(|e| ReadError::repository(format!("reading {}", joined), e))?
                }
                Some(ObjectType::Blob) => object
                    .peel_to_blob()
                    .map_err(|e| ReadError::repository(format!("reading blob {}", revision), e))?,
                other => {
                    return Err(ReadError::InvalidObjectType {
                        id: revision.to_string(),
                        kind: other.map_or("unknown", |k| k.str()).to_string(),
                    })
                }
            };
            serde_json::from_slice(blob.content())
                .map(Some)
                .map_err(|e| ReadError::Json {
                    path: joined.clone(),
                    revision: revision.to_string(),
                    source: e,
                })
        })?
    }
}

fn remove_untracked(repo: &Repository) -> Result<(), GitOpError> {
    let workdir = repo
        .workdir()
        .ok_or_else(|| GitOpError::State("repository has no working directory".to_string()))?
        .to_path_buf();
    let mut options = StatusOptions::new();
    options
        .include_untracked(true)
        .recurse_untracked_dirs(true)
        .include_ignored(false);
    let statuses = repo.statuses(Some(&mut options))?;
    for entry in statuses.iter() {
        if !entry.status().contains(Status::WT_NEW) {
            continue;
        }
        if let Some(path) = entry.path() {
            let full = workdir.join(path);
            if full.is_dir() {
                fs::remove_dir_all(&full)?;
            } else if full.exists() {
                fs::remove_file(&full)?;
            }
        }
    }
    Ok(())
}
