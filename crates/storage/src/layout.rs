//! Repository layout
//!
//! ```text
//! ${root}/${definitions_dir}/{testName}/definition.json
//! ${root}/${definitions_dir}/{testName}/metadata.json
//! ```
//!
//! Paths handed to git are always relative and `/`-separated.

use std::path::{Component, Path, PathBuf};

use proctor_core::{ReadError, ReadResult};

/// Default directory holding one sub-directory per test
pub const DEFAULT_DEFINITIONS_DIRECTORY: &str = "test-definitions";

/// File holding the serialized test definition
pub const DEFINITION_FILENAME: &str = "definition.json";

/// File holding the free-form metadata map
pub const METADATA_FILENAME: &str = "metadata.json";

/// Hex length of a full object id
pub const OBJECT_ID_HEX_LEN: usize = 40;

/// The all-zero object id, used as "no previous version" for adds
pub const ZERO_OBJECT_ID: &str = "0000000000000000000000000000000000000000";

/// Check that `revision` is a full hex object id
///
/// Pure string check; never touches the repository.
pub fn validate_object_id(revision: &str) -> ReadResult<()> {
    if revision.len() == OBJECT_ID_HEX_LEN && revision.bytes().all(|b| b.is_ascii_hexdigit()) {
        Ok(())
    } else {
        Err(ReadError::MalformedId(revision.to_string()))
    }
}

/// True for names made only of ASCII alphanumerics and `_`
///
/// Enforced when a test is created. Reads accept any
/// [`is_stored_test_name`], since other clients may have pushed
/// directories this store would never create.
pub fn is_valid_test_name(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

/// True if `name` can be a directory directly under the definitions directory
pub fn is_stored_test_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(|c: char| matches!(c, '/' | '\\' | '\0'))
}

/// Where test definitions live inside a repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefinitionLayout {
    definitions_dir: String,
}

impl DefinitionLayout {
    /// Layout rooted at `definitions_dir` (relative, `/`-separated)
    pub fn new(definitions_dir: impl Into<String>) -> Self {
        let dir: String = definitions_dir.into();
        Self {
            definitions_dir: dir.trim_matches('/').to_string(),
        }
    }

    /// The definitions directory
    pub fn definitions_dir(&self) -> &str {
        &self.definitions_dir
    }

    /// Relative directory of one test
    pub fn test_dir(&self, test_name: &str) -> PathBuf {
        Path::new(&self.definitions_dir).join(test_name)
    }

    /// Relative path of a test's definition file
    pub fn definition_path(&self, test_name: &str) -> PathBuf {
        self.test_dir(test_name).join(DEFINITION_FILENAME)
    }

    /// Relative path of a test's metadata file
    pub fn metadata_path(&self, test_name: &str) -> PathBuf {
        self.test_dir(test_name).join(METADATA_FILENAME)
    }

    /// Path segments of a test's definition file, as used for cache keys
    pub fn definition_segments<'a>(&'a self, test_name: &'a str) -> [&'a str; 3] {
        [&self.definitions_dir, test_name, DEFINITION_FILENAME]
    }

    /// Test name if `path` is exactly `<dir>/<name>/definition.json`
    pub fn test_name_from_definition_path(&self, path: &Path) -> Option<String> {
        let rest = path.strip_prefix(&self.definitions_dir).ok()?;
        let parts = normal_components(rest)?;
        match parts.as_slice() {
            [name, file] if *file == DEFINITION_FILENAME && is_stored_test_name(name) => {
                Some((*name).to_string())
            }
            _ => None,
        }
    }

    /// Test directory a staged path belongs to
    ///
    /// Any file below `<dir>/<name>/` counts, not only the definition.
    pub fn parse_test_name(&self, path: &Path) -> Option<String> {
        let rest = path.strip_prefix(&self.definitions_dir).ok()?;
        let parts = normal_components(rest)?;
        if parts.len() > 1 {
            Some(parts[0].to_string())
        } else {
            None
        }
    }
}

impl Default for DefinitionLayout {
    fn default() -> Self {
        Self::new(DEFAULT_DEFINITIONS_DIRECTORY)
    }
}

fn normal_components(path: &Path) -> Option<Vec<&str>> {
    path.components()
        .map(|c| match c {
            Component::Normal(part) => part.to_str(),
            _ => None,
        })
        .collect()
}
