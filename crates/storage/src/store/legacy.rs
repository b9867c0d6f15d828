//! Flat-argument write calls
//!
//! Older callers pass credentials, author and comment as separate
//! arguments, with the author defaulting to the user name. These adapters
//! build the [`ChangeMetadata`] and forward to [`ProctorWriter`].

use proctor_core::{ChangeMetadata, ProctorWriter, TestDefinition, TestMetadata, UpdateResult};

fn change(username: &str, password: &str, author: Option<&str>, comment: &str) -> ChangeMetadata {
    ChangeMetadata::new(author.unwrap_or(username), comment).with_credentials(username, password)
}

/// Add a test, authored by `author` or by `username` when absent
#[allow(clippy::too_many_arguments)]
pub fn add_test_definition<W: ProctorWriter + ?Sized>(
    writer: &W,
    username: &str,
    password: &str,
    author: Option<&str>,
    test_name: &str,
    definition: &TestDefinition,
    metadata: &TestMetadata,
    comment: &str,
) -> UpdateResult<String> {
    writer.add_test_definition(
        &change(username, password, author, comment),
        test_name,
        definition,
        metadata,
    )
}

/// Update a test, authored by `author` or by `username` when absent
#[allow(clippy::too_many_arguments)]
pub fn update_test_definition<W: ProctorWriter + ?Sized>(
    writer: &W,
    username: &str,
    password: &str,
    author: Option<&str>,
    previous_version: &str,
    test_name: &str,
    definition: &TestDefinition,
    metadata: &TestMetadata,
    comment: &str,
) -> UpdateResult<String> {
    writer.update_test_definition(
        &change(username, password, author, comment),
        previous_version,
        test_name,
        definition,
        metadata,
    )
}

/// Delete a test, authored by `author` or by `username` when absent
#[allow(clippy::too_many_arguments)]
pub fn delete_test_definition<W: ProctorWriter + ?Sized>(
    writer: &W,
    username: &str,
    password: &str,
    author: Option<&str>,
    previous_version: &str,
    test_name: &str,
    definition: &TestDefinition,
    comment: &str,
) -> UpdateResult<String> {
    writer.delete_test_definition(
        &change(username, password, author, comment),
        previous_version,
        test_name,
        definition,
    )
}
