//! Transport failure classification
//!
//! Turns generic commit/push failures into actionable kinds. Classification
//! only looks at the remote URL, the kind of cause and its message; it never
//! changes control flow, and the original cause always stays attached.

use std::error::Error as StdError;
use std::fmt;

use proctor_core::{TestUpdateError, UpdateErrorKind};
use thiserror::Error;

/// Kind of cause a write failure carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CauseKind {
    /// The remote could not be reached or refused the connection/request
    Transport,
    /// The push completed but the remote refused a ref update
    PushRejected,
    /// Anything else (local git, io, preconditions)
    Other,
}

/// A network operation against the remote failed
#[derive(Debug, Error)]
#[error("{operation} failed: {}", .source.message())]
pub struct TransportError {
    /// Operation that was running (clone, fetch, push)
    pub operation: &'static str,
    /// Underlying git error
    #[source]
    pub source: git2::Error,
}

impl TransportError {
    /// Wrap a git error raised by a network operation
    pub fn new(operation: &'static str, source: git2::Error) -> Self {
        Self { operation, source }
    }

    /// Message reported by the transport
    pub fn message(&self) -> &str {
        self.source.message()
    }
}

/// The remote refused a ref update during a push
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct PushRejected {
    /// Reference that was refused
    pub reference: String,
    /// Status message reported by the remote
    pub message: String,
}

/// Refined kind plus the actionable message that replaces the generic one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// Refined kind
    pub kind: UpdateErrorKind,
    /// What the user should check
    pub message: String,
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Classify one cause
///
/// Returns `None` when the cause should pass through unchanged. Only
/// remotes whose URL ends in `.git` are classified, since the messages
/// matched here come from git hosting servers.
pub fn classify(git_url: &str, cause: CauseKind, message: &str) -> Option<Classification> {
    let project_url = git_url.strip_suffix(".git")?;

    let (kind, message) = match cause {
        CauseKind::Transport if message.contains("not authorized") => (
            UpdateErrorKind::NoAuthorization,
            "Please check your user name and password".to_string(),
        ),
        CauseKind::Transport if message.contains("git-receive-pack not permitted") => (
            UpdateErrorKind::NoDeveloperAccess,
            format!(
                "Check if your access level is developer in [{}/project_members]",
                project_url
            ),
        ),
        CauseKind::Transport if is_server_error(message) => (
            UpdateErrorKind::ServerError,
            format!("Check if {} is available", git_url),
        ),
        CauseKind::PushRejected if message == "pre-receive hook declined" => (
            UpdateErrorKind::NoMasterAccess,
            format!(
                "Check if your access level is master in [{}/project_members]",
                project_url
            ),
        ),
        _ => return None,
    };
    Some(Classification { kind, message })
}

/// `^50\d\s`: a 5xx status code followed by whitespace
fn is_server_error(message: &str) -> bool {
    let bytes = message.as_bytes();
    bytes.len() >= 4
        && bytes[0] == b'5'
        && bytes[1] == b'0'
        && bytes[2].is_ascii_digit()
        && bytes[3].is_ascii_whitespace()
}

/// Find the typed cause in an error chain
pub fn cause_of(error: &(dyn StdError + 'static)) -> (CauseKind, String) {
    let mut current: Option<&(dyn StdError + 'static)> = Some(error);
    while let Some(err) = current {
        if let Some(transport) = err.downcast_ref::<TransportError>() {
            return (CauseKind::Transport, transport.message().to_string());
        }
        if let Some(rejected) = err.downcast_ref::<PushRejected>() {
            return (CauseKind::PushRejected, rejected.message.clone());
        }
        current = err.source();
    }
    (CauseKind::Other, error.to_string())
}

/// Refine a failed write at the outermost transaction boundary
///
/// Precondition failures and errors without a classifiable cause come back
/// untouched.
pub fn refine(git_url: &str, error: TestUpdateError) -> TestUpdateError {
    if error.kind() != UpdateErrorKind::Failed {
        return error;
    }
    let Some(cause) = error.cause() else {
        return error;
    };
    let (kind, message) = cause_of(cause);
    match classify(git_url, kind, &message) {
        Some(classification) => error.reclassify(classification.kind, classification.message),
        None => error,
    }
}
