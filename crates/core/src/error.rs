//! Error types for the test-definition store
//!
//! Three layers, each built with `thiserror`:
//! - [`ReadError`]: resolving content at a revision failed
//! - [`TestUpdateError`]: a write transaction failed, tagged with an
//!   [`UpdateErrorKind`] that the transport classifier may refine
//! - [`StoreError`]: everything a reader can surface, wrapping the two above

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Boxed error used to carry low-level causes (git, io) across crate boundaries
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type alias for content reads
pub type ReadResult<T> = std::result::Result<T, ReadError>;

/// Result type alias for write transactions
pub type UpdateResult<T> = std::result::Result<T, TestUpdateError>;

/// Result type alias for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

// ============================================================================
// ReadError
// ============================================================================

/// Failure to resolve revision-qualified content
#[derive(Debug, Error)]
pub enum ReadError {
    /// The revision string is not a full hex object id
    #[error("Malformed revision id '{0}'")]
    MalformedId(String),

    /// The id is well formed but names no object in the repository
    #[error("Unknown object {0}")]
    UnknownObject(String),

    /// The id resolved to something other than a commit or a blob
    #[error("Object {id} is a {kind}, expected a commit or blob")]
    InvalidObjectType {
        /// Object id
        id: String,
        /// Kind reported by the object database
        kind: String,
    },

    /// Content was found but is not valid JSON for the requested type
    #[error("Unable to parse {path} at {revision}: {source}")]
    Json {
        /// Path inside the repository
        path: String,
        /// Revision the content was read at
        revision: String,
        /// Underlying parse failure
        #[source]
        source: serde_json::Error,
    },

    /// The object database could not be read
    #[error("Repository error while {context}: {source}")]
    Repository {
        /// What was being attempted
        context: String,
        /// Underlying cause
        #[source]
        source: BoxError,
    },

    /// No repository handle is available yet
    #[error("Repository is not initialized")]
    NotInitialized,
}

impl ReadError {
    /// Wrap a low-level cause with the operation that hit it
    pub fn repository(context: impl Into<String>, source: impl Into<BoxError>) -> Self {
        ReadError::Repository {
            context: context.into(),
            source: source.into(),
        }
    }
}

// ============================================================================
// TestUpdateError
// ============================================================================

/// Classification of a failed write transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateErrorKind {
    /// A domain precondition did not hold (exists / does not exist / unchanged)
    Precondition,
    /// Commit, push or workspace failure with no more specific classification
    Failed,
    /// The remote rejected the credentials
    NoAuthorization,
    /// The user may read but not push to the project
    NoDeveloperAccess,
    /// A server-side hook refused the push to the protected branch
    NoMasterAccess,
    /// The remote answered with a 5xx status
    ServerError,
}

impl UpdateErrorKind {
    /// Short label used in log fields
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateErrorKind::Precondition => "precondition",
            UpdateErrorKind::Failed => "failed",
            UpdateErrorKind::NoAuthorization => "no_authorization",
            UpdateErrorKind::NoDeveloperAccess => "no_developer_access",
            UpdateErrorKind::NoMasterAccess => "no_master_access",
            UpdateErrorKind::ServerError => "server_error",
        }
    }
}

impl std::fmt::Display for UpdateErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A write transaction failed
///
/// Carries the kind, a human-actionable message and the original cause.
/// Reclassification replaces kind and message but keeps the cause.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct TestUpdateError {
    kind: UpdateErrorKind,
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl TestUpdateError {
    /// Create an error without an underlying cause
    pub fn new(kind: UpdateErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// A precondition violation ("already exists", "does not exist", ...)
    pub fn precondition(message: impl Into<String>) -> Self {
        Self::new(UpdateErrorKind::Precondition, message)
    }

    /// A generic failure wrapping its cause
    pub fn failed(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::new(UpdateErrorKind::Failed, message).with_source(source)
    }

    /// Attach the underlying cause
    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Replace kind and message, keeping the original cause
    pub fn reclassify(self, kind: UpdateErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: self.source,
        }
    }

    /// Classification of this failure
    pub fn kind(&self) -> UpdateErrorKind {
        self.kind
    }

    /// Human-readable message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Underlying cause, if any
    pub fn cause(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        self.source.as_deref()
    }
}

// ============================================================================
// StoreError
// ============================================================================

/// Errors surfaced by store operations
#[derive(Debug, Error)]
pub enum StoreError {
    /// Content could not be resolved
    #[error(transparent)]
    Read(#[from] ReadError),

    /// A write transaction failed
    #[error(transparent)]
    Update(#[from] TestUpdateError),

    /// One test of a snapshot failed to resolve, so the snapshot is void
    #[error("Test matrix at {revision} is incomplete: test '{test_name}' could not be resolved")]
    IncompleteMatrix {
        /// Revision the snapshot was requested at
        revision: String,
        /// First test that failed
        test_name: String,
        /// Read failure, absent when the definition was simply missing
        #[source]
        source: Option<ReadError>,
    },

    /// The workspace lock could not be acquired in time
    #[error("Timed out after {waited:?} waiting for workspace lock on {}", .path.display())]
    LockTimeout {
        /// Workspace root
        path: PathBuf,
        /// How long the caller waited
        waited: Duration,
    },

    /// Repository setup (clone, open, pull) failed
    #[error("Repository setup failed: {message}")]
    Setup {
        /// What went wrong
        message: String,
        /// Underlying cause
        #[source]
        source: Option<BoxError>,
    },

    /// A git operation outside content resolution failed
    #[error("Repository error while {context}: {source}")]
    Repository {
        /// What was being attempted
        context: String,
        /// Underlying cause
        #[source]
        source: BoxError,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The store was closed
    #[error("Store is closed")]
    Closed,

    /// I/O error on the workspace
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl StoreError {
    /// Wrap a low-level cause with the operation that hit it
    pub fn repository(context: impl Into<String>, source: impl Into<BoxError>) -> Self {
        StoreError::Repository {
            context: context.into(),
            source: source.into(),
        }
    }

    /// Setup failure with a cause
    pub fn setup(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        StoreError::Setup {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Convert into a write failure, keeping update errors as they are
    pub fn into_update_error(self) -> TestUpdateError {
        match self {
            StoreError::Update(e) => e,
            other => TestUpdateError::failed(other.to_string(), other),
        }
    }
}
