//! Test definitions, buckets and allocations
//!
//! A [`TestDefinition`] is what lives in `definition.json`. It owns its
//! buckets and allocations outright; nothing is shared between tests.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::payload::Payload;
use super::test_type::TestType;

/// Free-form string metadata stored in `metadata.json` beside a definition
pub type TestMetadata = BTreeMap<String, String>;

/// Allowed drift of an allocation's range sum from 1.0
pub const ALLOCATION_SUM_TOLERANCE: f64 = 1e-6;

// ============================================================================
// Range / Allocation / Bucket
// ============================================================================

/// Share of an allocation assigned to one bucket value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Range {
    /// Bucket value this share maps to
    pub bucket_value: i32,
    /// Fraction in [0, 1]
    pub length: f64,
}

impl Range {
    /// Create a range
    pub fn new(bucket_value: i32, length: f64) -> Self {
        Self {
            bucket_value,
            length,
        }
    }
}

/// Rule-gated partition of probability mass across bucket values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Allocation {
    /// Eligibility rule; `None` matches everyone
    #[serde(default)]
    pub rule: Option<String>,
    /// Ordered ranges; lengths sum to 1.0
    #[serde(default)]
    pub ranges: Vec<Range>,
    /// Stable identifier, empty when unassigned
    #[serde(default)]
    pub id: String,
    /// Display name, empty when unnamed
    #[serde(default)]
    pub name: String,
}

impl Allocation {
    /// Allocation with the given rule and ranges and no id
    pub fn new(rule: Option<String>, ranges: Vec<Range>) -> Self {
        Self {
            rule,
            ranges,
            id: String::new(),
            name: String::new(),
        }
    }

    /// Sum of all range lengths
    pub fn total_length(&self) -> f64 {
        self.ranges.iter().map(|r| r.length).sum()
    }
}

/// One named, integer-valued outcome of a test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestBucket {
    /// Name, unique within the test
    #[serde(default)]
    pub name: String,
    /// Value, unique within the test
    pub value: i32,
    /// Human description
    #[serde(default)]
    pub description: Option<String>,
    /// Optional typed payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Payload>,
}

impl TestBucket {
    /// Bucket without description or payload
    pub fn new(name: impl Into<String>, value: i32) -> Self {
        Self {
            name: name.into(),
            value,
            description: None,
            payload: None,
        }
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Attach a payload
    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = Some(payload);
        self
    }
}

// ============================================================================
// TestDefinition
// ============================================================================

/// Violated definition invariant
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DefinitionError {
    /// Two buckets share a value
    #[error("Duplicate bucket value {0}")]
    DuplicateBucketValue(i32),

    /// Two buckets share a name
    #[error("Duplicate bucket name '{0}'")]
    DuplicateBucketName(String),

    /// A range length is outside [0, 1]
    #[error("Allocation {allocation} has range length {length} outside [0, 1]")]
    RangeOutOfBounds {
        /// Index of the allocation
        allocation: usize,
        /// Offending length
        length: f64,
    },

    /// No test type was given
    #[error("Test type must be specified")]
    MissingTestType,

    /// An allocation's ranges do not sum to 1.0
    #[error("Allocation {allocation} ranges sum to {sum}, expected 1.0")]
    AllocationSum {
        /// Index of the allocation
        allocation: usize,
        /// Actual sum
        sum: f64,
    },
}

/// Versioned description of one test
///
/// `version` is assigned by the store on promotion and ignored for equality
/// checks that compare content (see [`TestDefinition::same_content`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestDefinition {
    /// Revision this definition was promoted from, if any
    #[serde(default)]
    pub version: Option<String>,
    /// Values exposed to rules
    #[serde(default)]
    pub constants: BTreeMap<String, Value>,
    /// Values expanded into rules by the loader
    #[serde(default)]
    pub special_constants: BTreeMap<String, Value>,
    /// Hash salt
    #[serde(default)]
    pub salt: String,
    /// Test-level eligibility rule
    #[serde(default)]
    pub rule: Option<String>,
    /// Ordered buckets
    #[serde(default)]
    pub buckets: Vec<TestBucket>,
    /// Ordered allocations; the first matching rule wins
    #[serde(default)]
    pub allocations: Vec<Allocation>,
    /// Suppress logging of this test's assignment
    #[serde(default)]
    pub silent: bool,
    /// Application-defined tags
    #[serde(default)]
    pub meta_tags: Vec<String>,
    /// Identifier kind the test is keyed on; unspecified when absent on disk
    #[serde(default)]
    pub test_type: TestType,
    /// Human description
    #[serde(default)]
    pub description: Option<String>,
}

impl TestDefinition {
    /// Empty definition of the given type and salt
    pub fn new(test_type: TestType, salt: impl Into<String>) -> Self {
        Self {
            version: None,
            constants: BTreeMap::new(),
            special_constants: BTreeMap::new(),
            salt: salt.into(),
            rule: None,
            buckets: Vec::new(),
            allocations: Vec::new(),
            silent: false,
            meta_tags: Vec::new(),
            test_type,
            description: None,
        }
    }

    /// Check the test type, bucket uniqueness and allocation ranges
    ///
    /// Returns the first violation found, in bucket then allocation order.
    /// Reads never call this; a stored definition missing its type still loads.
    pub fn validate(&self) -> Result<(), DefinitionError> {
        if self.test_type.is_unspecified() {
            return Err(DefinitionError::MissingTestType);
        }
        let mut values = HashSet::new();
        let mut names = HashSet::new();
        for bucket in &self.buckets {
            if !values.insert(bucket.value) {
                return Err(DefinitionError::DuplicateBucketValue(bucket.value));
            }
            if !names.insert(bucket.name.as_str()) {
                return Err(DefinitionError::DuplicateBucketName(bucket.name.clone()));
            }
        }

        for (index, allocation) in self.allocations.iter().enumerate() {
            if let Some(range) = allocation
                .ranges
                .iter()
                .find(|r| !(0.0..=1.0).contains(&r.length))
            {
                return Err(DefinitionError::RangeOutOfBounds {
                    allocation: index,
                    length: range.length,
                });
            }
            let sum = allocation.total_length();
            if (sum - 1.0).abs() > ALLOCATION_SUM_TOLERANCE {
                return Err(DefinitionError::AllocationSum {
                    allocation: index,
                    sum,
                });
            }
        }
        Ok(())
    }

    /// Bucket with the given value
    pub fn bucket(&self, value: i32) -> Option<&TestBucket> {
        self.buckets.iter().find(|b| b.value == value)
    }

    /// Equality ignoring the store-assigned `version`
    pub fn same_content(&self, other: &TestDefinition) -> bool {
        let mut left = self.clone();
        left.version.clone_from(&other.version);
        left == *other
    }
}
