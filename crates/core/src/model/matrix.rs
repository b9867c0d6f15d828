//! Whole-store snapshots

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::definition::TestDefinition;

/// Every test definition resolved at one commit
///
/// Only ever built when every test resolved, so `tests` is never a partial view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestMatrixVersion {
    /// Definitions keyed by test name
    pub tests: BTreeMap<String, TestDefinition>,
    /// Commit time
    pub published: DateTime<Utc>,
    /// Commit author name
    pub author: String,
    /// Commit id
    pub version: String,
    /// Commit message
    pub description: String,
}

impl TestMatrixVersion {
    /// Definition of one test
    pub fn test(&self, test_name: &str) -> Option<&TestDefinition> {
        self.tests.get(test_name)
    }

    /// Number of tests in the snapshot
    pub fn len(&self) -> usize {
        self.tests.len()
    }

    /// True when the snapshot holds no tests
    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }
}
