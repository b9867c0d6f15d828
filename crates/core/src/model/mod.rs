//! Domain model for test definitions and their revisions
//!
//! Everything here serializes to the on-disk JSON layout
//! (`definition.json`, `metadata.json`), so field names are camelCase.

mod change;
mod definition;
mod matrix;
mod payload;
mod revision;
mod test_type;

pub use change::{determine_author_id, ChangeMetadata};
pub use definition::{
    Allocation, DefinitionError, Range, TestBucket, TestDefinition, TestMetadata,
    ALLOCATION_SUM_TOLERANCE,
};
pub use matrix::TestMatrixVersion;
pub use payload::{Payload, PayloadError, PayloadType};
pub use revision::{Revision, RevisionDetails, TestVersion, TestVersionResult};
pub use test_type::TestType;
