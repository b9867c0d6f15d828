//! Core types and traits for the Proctor test-definition store
//!
//! This crate defines the vocabulary shared by every store implementation:
//! - TestDefinition, Allocation, Range, TestBucket, Payload, TestType: the model
//! - Revision, RevisionDetails, TestVersionResult: commit-level metadata
//! - TestMatrixVersion: a fully resolved snapshot of every test at one revision
//! - ChangeMetadata: who/when/why for a write transaction
//! - Error: ReadError, TestUpdateError, StoreError
//! - Traits: ProctorReader, ProctorWriter

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod model;
pub mod traits;

pub use error::{
    BoxError, ReadError, ReadResult, StoreError, StoreResult, TestUpdateError, UpdateErrorKind,
    UpdateResult,
};
pub use model::{
    determine_author_id, Allocation, ChangeMetadata, DefinitionError, Payload, PayloadError,
    PayloadType, Range, Revision, RevisionDetails, TestBucket, TestDefinition, TestMatrixVersion,
    TestMetadata, TestType, TestVersion, TestVersionResult,
};
pub use traits::{ProctorReader, ProctorWriter};
