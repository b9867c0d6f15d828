//! Commit-level metadata

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An immutable point in the store's history
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Revision {
    revision: String,
    author: String,
    date: DateTime<Utc>,
    message: String,
}

impl Revision {
    /// Create a revision record
    pub fn new(
        revision: impl Into<String>,
        author: impl Into<String>,
        date: DateTime<Utc>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            revision: revision.into(),
            author: author.into(),
            date,
            message: message.into(),
        }
    }

    /// Commit id
    pub fn revision(&self) -> &str {
        &self.revision
    }

    /// Author name
    pub fn author(&self) -> &str {
        &self.author
    }

    /// Author timestamp
    pub fn date(&self) -> DateTime<Utc> {
        self.date
    }

    /// Full commit message
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// A revision plus the tests it touched
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevisionDetails {
    /// The revision itself
    pub revision: Revision,
    /// Names of tests whose definition changed in this commit
    pub modified_tests: BTreeSet<String>,
}

/// Per-test content pointer at one commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestVersion {
    /// Test name (directory name)
    pub test_name: String,
    /// Blob id of the test's definition file
    pub revision: String,
}

/// Every test present at a commit, plus the commit's metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestVersionResult {
    /// Tests in tree order
    pub tests: Vec<TestVersion>,
    /// Commit time
    pub published: DateTime<Utc>,
    /// Commit author name
    pub author: String,
    /// Commit id
    pub version: String,
    /// Commit message
    pub description: String,
}

impl TestVersionResult {
    /// Look up one test's content pointer
    pub fn test(&self, test_name: &str) -> Option<&TestVersion> {
        self.tests.iter().find(|t| t.test_name == test_name)
    }
}
