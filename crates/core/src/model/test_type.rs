//! Open-ended test type
//!
//! Behaves like an enum for the predefined types while letting callers
//! introduce their own. Serialized as a bare string.

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier kind a test is keyed on (advisory only)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TestType(Cow<'static, str>);

impl TestType {
    /// Keyed on a user identifier
    pub const USER: TestType = TestType(Cow::Borrowed("USER"));
    /// Keyed on an account identifier
    pub const ACCOUNT: TestType = TestType(Cow::Borrowed("ACCOUNT"));
    /// Keyed on an email address
    pub const EMAIL: TestType = TestType(Cow::Borrowed("EMAIL"));
    /// Not keyed; a fresh random choice per evaluation
    pub const RANDOM: TestType = TestType(Cow::Borrowed("RANDOM"));
    /// Keyed on a page identifier
    pub const PAGE: TestType = TestType(Cow::Borrowed("PAGE"));
    /// Keyed on a company identifier
    pub const COMPANY: TestType = TestType(Cow::Borrowed("COMPANY"));

    /// Create a custom test type
    pub fn new(name: impl Into<String>) -> Self {
        TestType(Cow::Owned(name.into()))
    }

    /// Name as written on disk
    pub fn name(&self) -> &str {
        &self.0
    }

    /// Placeholder for a stored definition that names no type
    pub const UNSPECIFIED: TestType = TestType(Cow::Borrowed(""));

    /// True for the empty placeholder type
    pub fn is_unspecified(&self) -> bool {
        self.0.is_empty()
    }

    /// Predefined types
    pub fn predefined() -> [TestType; 6] {
        [
            Self::USER,
            Self::ACCOUNT,
            Self::EMAIL,
            Self::RANDOM,
            Self::PAGE,
            Self::COMPANY,
        ]
    }
}

impl Default for TestType {
    fn default() -> Self {
        Self::UNSPECIFIED
    }
}

impl fmt::Display for TestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
