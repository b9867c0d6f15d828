//! Write-transaction metadata

use std::fmt;

use chrono::{DateTime, Utc};

/// Who, when and why for one write transaction
///
/// `author` is recorded as the commit author; `username` (falling back to
/// the author) as the committer and as the transport user name.
#[derive(Clone, PartialEq, Eq)]
pub struct ChangeMetadata {
    username: Option<String>,
    password: Option<String>,
    author: String,
    timestamp: DateTime<Utc>,
    comment: String,
}

impl ChangeMetadata {
    /// Metadata stamped with the current time and no credentials
    pub fn new(author: impl Into<String>, comment: impl Into<String>) -> Self {
        Self {
            username: None,
            password: None,
            author: author.into(),
            timestamp: Utc::now(),
            comment: comment.into(),
        }
    }

    /// Set transport credentials
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Override the commit timestamp
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Transport user name
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// Transport password
    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    /// Commit author
    pub fn author(&self) -> &str {
        &self.author
    }

    /// Committer name: the user name when present and non-empty, else the author
    pub fn committer(&self) -> &str {
        self.username
            .as_deref()
            .filter(|username| !username.is_empty())
            .unwrap_or(&self.author)
    }

    /// Commit timestamp
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Commit message
    pub fn comment(&self) -> &str {
        &self.comment
    }
}

impl fmt::Debug for ChangeMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeMetadata")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("author", &self.author)
            .field("timestamp", &self.timestamp)
            .field("comment", &self.comment)
            .finish()
    }
}

/// Short author id from a display name and email
///
/// The local part of the email when it has one, otherwise the name.
pub fn determine_author_id(name: &str, email: &str) -> String {
    match email.split_once('@') {
        Some((local, _)) => local.to_string(),
        None => name.to_string(),
    }
}
