//! Checkout mutation inside a write transaction
//!
//! A [`WorkspaceClient`] is handed to the mutator of
//! [`GitPersister::do_in_working_directory`](crate::GitPersister::do_in_working_directory)
//! while the workspace lock is held. Every file it writes or deletes is
//! staged in the index immediately, so the persister only has to commit.

use std::fs;
use std::path::{Path, PathBuf};

use git2::Repository;
use proctor_core::{TestUpdateError, UpdateResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::trace;

use crate::layout::DefinitionLayout;

/// Write access to the checkout for one transaction
pub struct WorkspaceClient<'r> {
    repo: &'r Repository,
    root: &'r Path,
    layout: &'r DefinitionLayout,
}

impl<'r> WorkspaceClient<'r> {
    pub(crate) fn new(repo: &'r Repository, root: &'r Path, layout: &'r DefinitionLayout) -> Self {
        Self { repo, root, layout }
    }

    /// Checkout root
    pub fn root(&self) -> &Path {
        self.root
    }

    /// Repository layout
    pub fn layout(&self) -> &DefinitionLayout {
        self.layout
    }

    /// The checkout's repository
    pub fn repository(&self) -> &Repository {
        self.repo
    }

    /// True if the test's directory exists in the checkout
    pub fn test_exists(&self, test_name: &str) -> bool {
        self.absolute(&self.layout.test_dir(test_name)).is_dir()
    }

    /// True if a file exists at `relative`
    pub fn file_exists(&self, relative: &Path) -> bool {
        self.absolute(relative).is_file()
    }

    /// Parse the JSON file at `relative`, `None` if it does not exist
    pub fn read_json<T: DeserializeOwned>(&self, relative: &Path) -> UpdateResult<Option<T>> {
        let path = self.absolute(relative);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path).map_err(|e| {
            TestUpdateError::failed(format!("Unable to read {}", relative.display()), e)
        })?;
        serde_json::from_slice(&bytes).map(Some).map_err(|e| {
            TestUpdateError::failed(format!("Unable to parse {}", relative.display()), e)
        })
    }

    /// Write `value` as pretty JSON and stage it
    pub fn write_json<T: Serialize>(&self, relative: &Path, value: &T) -> UpdateResult<()> {
        let path = self.absolute(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                TestUpdateError::failed(format!("Unable to create {}", parent.display()), e)
            })?;
        }
        let mut text = serde_json::to_vec_pretty(value).map_err(|e| {
            TestUpdateError::failed(format!("Unable to serialize {}", relative.display()), e)
        })?;
        text.push(b'\n');
        fs::write(&path, text).map_err(|e| {
            TestUpdateError::failed(format!("Unable to write {}", relative.display()), e)
        })?;
        self.stage_add(relative)
    }

    /// Write `value` unless the file already holds an equal value
    ///
    /// Returns true if the file changed.
    pub fn write_json_if_changed<T>(&self, relative: &Path, value: &T) -> UpdateResult<bool>
    where
        T: Serialize + DeserializeOwned + PartialEq,
    {
        if let Some(current) = self.read_json::<T>(relative)? {
            if current == *value {
                trace!(target: "proctor::git", path = %relative.display(), "Unchanged, not writing");
                return Ok(false);
            }
        }
        self.write_json(relative, value)?;
        Ok(true)
    }

    /// Remove a test's directory from the checkout and the index
    ///
    /// Returns false if the directory did not exist.
    pub fn delete_test(&self, test_name: &str) -> UpdateResult<bool> {
        let relative = self.layout.test_dir(test_name);
        let path = self.absolute(&relative);
        if !path.is_dir() {
            return Ok(false);
        }
        let mut index = self.index()?;
        index
            .remove_dir(&relative, 0)
            .and_then(|_| index.write())
            .map_err(|e| {
                TestUpdateError::failed(format!("Unable to unstage {}", relative.display()), e)
            })?;
        fs::remove_dir_all(&path).map_err(|e| {
            TestUpdateError::failed(format!("Unable to delete {}", relative.display()), e)
        })?;
        Ok(true)
    }

    fn stage_add(&self, relative: &Path) -> UpdateResult<()> {
        let mut index = self.index()?;
        index
            .add_path(relative)
            .and_then(|_| index.write())
            .map_err(|e| TestUpdateError::failed(format!("Unable to stage {}", relative.display()), e))
    }

    fn index(&self) -> UpdateResult<git2::Index> {
        self.repo
            .index()
            .map_err(|e| TestUpdateError::failed("Unable to open the index", e))
    }

    fn absolute(&self, relative: &Path) -> PathBuf {
        self.root.join(relative)
    }
}
