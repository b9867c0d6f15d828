//! Store configuration via `proctor-store.toml`
//!
//! Every tunable of the git-backed store lives here: remote, credentials,
//! layout, network deadlines, lock timeout, cache bounds. Missing keys fall
//! back to defaults, so a file naming only `git_url` and `workspace_root`
//! is a complete configuration.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use proctor_core::{StoreError, StoreResult};
use serde::{Deserialize, Serialize};

use crate::layout::DEFAULT_DEFINITIONS_DIRECTORY;

/// Config file name conventionally placed next to the workspace
pub const CONFIG_FILE_NAME: &str = "proctor-store.toml";

/// Configuration for a git-backed store
///
/// # Example
///
/// ```toml
/// git_url = "https://git.example.com/proctor/proctor-data.git"
/// workspace_root = "/var/lib/proctor/workspace"
/// branch = "main"
/// pull_push_timeout_secs = 45
/// ```
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct GitStoreConfig {
    /// Remote URL (https, ssh, file:// or a local path)
    pub git_url: String,
    /// Local checkout directory
    pub workspace_root: PathBuf,
    /// Transport user name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Transport password or token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Directory holding one sub-directory per test
    #[serde(default = "default_definitions_directory")]
    pub definitions_directory: String,
    /// Branch to clone and track; the remote's default branch when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    /// Always wipe and re-clone on initialization
    #[serde(default)]
    pub clean_initialization: bool,
    /// Deadline for each fetch and push
    #[serde(default = "default_pull_push_timeout_secs")]
    pub pull_push_timeout_secs: u64,
    /// Deadline for a clone
    #[serde(default = "default_clone_timeout_secs")]
    pub clone_timeout_secs: u64,
    /// How long a writer waits for the workspace lock
    #[serde(default = "default_lock_timeout_secs")]
    pub lock_timeout_secs: u64,
    /// Period of the background refresher; 0 disables it
    #[serde(default)]
    pub refresh_interval_secs: u64,
    /// Maximum number of cached definitions
    #[serde(default = "default_cache_max_entries")]
    pub cache_max_entries: usize,
    /// Cached definitions expire this long after their last access
    #[serde(default = "default_cache_expire_after_access_secs")]
    pub cache_expire_after_access_secs: u64,
    /// Maximum number of memoized per-commit diffs
    #[serde(default = "default_history_cache_capacity")]
    pub history_cache_capacity: usize,
    /// Number of pooled read-only repository handles
    #[serde(default = "default_read_handles")]
    pub read_handles: usize,
}

fn default_definitions_directory() -> String {
    DEFAULT_DEFINITIONS_DIRECTORY.to_string()
}

fn default_pull_push_timeout_secs() -> u64 {
    45
}

fn default_clone_timeout_secs() -> u64 {
    180
}

fn default_lock_timeout_secs() -> u64 {
    60
}

fn default_cache_max_entries() -> usize {
    2048
}

fn default_cache_expire_after_access_secs() -> u64 {
    6 * 60 * 60
}

fn default_history_cache_capacity() -> usize {
    16_384
}

fn default_read_handles() -> usize {
    4
}

impl GitStoreConfig {
    /// Configuration with defaults for everything but the remote and workspace
    pub fn new(git_url: impl Into<String>, workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            git_url: git_url.into(),
            workspace_root: workspace_root.into(),
            username: None,
            password: None,
            definitions_directory: default_definitions_directory(),
            branch: None,
            clean_initialization: false,
            pull_push_timeout_secs: default_pull_push_timeout_secs(),
            clone_timeout_secs: default_clone_timeout_secs(),
            lock_timeout_secs: default_lock_timeout_secs(),
            refresh_interval_secs: 0,
            cache_max_entries: default_cache_max_entries(),
            cache_expire_after_access_secs: default_cache_expire_after_access_secs(),
            history_cache_capacity: default_history_cache_capacity(),
            read_handles: default_read_handles(),
        }
    }

    /// Set transport credentials
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Track a specific branch
    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    /// Fetch/push deadline
    pub fn pull_push_timeout(&self) -> Duration {
        Duration::from_secs(self.pull_push_timeout_secs)
    }

    /// Clone deadline
    pub fn clone_timeout(&self) -> Duration {
        Duration::from_secs(self.clone_timeout_secs)
    }

    /// Workspace lock timeout
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }

    /// Refresher period, `None` when disabled
    pub fn refresh_interval(&self) -> Option<Duration> {
        (self.refresh_interval_secs > 0).then(|| Duration::from_secs(self.refresh_interval_secs))
    }

    /// Cache expire-after-access window
    pub fn cache_expire_after_access(&self) -> Duration {
        Duration::from_secs(self.cache_expire_after_access_secs)
    }

    /// Check values that would make the store unusable
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Config` naming the first invalid field.
    pub fn validate(&self) -> StoreResult<()> {
        if self.git_url.trim().is_empty() {
            return Err(StoreError::Config("git_url must not be empty".to_string()));
        }
        if self.workspace_root.as_os_str().is_empty() {
            return Err(StoreError::Config("workspace_root must not be empty".to_string()));
        }
        let dir = self.definitions_directory.trim_matches('/');
        if dir.is_empty() || dir.split('/').any(|part| part.is_empty() || part == "." || part == "..") {
            return Err(StoreError::Config(format!(
                "definitions_directory '{}' must be a relative path inside the repository",
                self.definitions_directory
            )));
        }
        if self.pull_push_timeout_secs == 0 || self.clone_timeout_secs == 0 {
            return Err(StoreError::Config("network timeouts must be positive".to_string()));
        }
        if self.cache_max_entries == 0 {
            return Err(StoreError::Config("cache_max_entries must be positive".to_string()));
        }
        if self.read_handles == 0 {
            return Err(StoreError::Config("read_handles must be positive".to_string()));
        }
        Ok(())
    }

    /// Returns a starter config file with comments
    pub fn default_toml() -> &'static str {
        r#"# Proctor test-definition store configuration

# Remote holding the test definitions, and the local checkout directory.
git_url = "https://git.example.com/proctor/proctor-data.git"
workspace_root = "/var/lib/proctor/workspace"

# Transport credentials (omit for anonymous or credential-helper access)
# username = "proctor"
# password = "token"

# Directory inside the repository holding one sub-directory per test
definitions_directory = "test-definitions"

# Branch to clone and track (default: the remote's default branch)
# branch = "main"

# Wipe and re-clone on every start instead of reusing the checkout
clean_initialization = false

# Network deadlines in seconds
pull_push_timeout_secs = 45
clone_timeout_secs = 180

# How long a writer waits for the workspace lock, in seconds
lock_timeout_secs = 60

# Background pull period in seconds (0 = disabled)
refresh_interval_secs = 0

# Definition cache: entry bound and expire-after-access window (seconds)
cache_max_entries = 2048
cache_expire_after_access_secs = 21600

# Memoized per-commit diffs used by history queries
history_cache_capacity = 16384

# Pooled read-only repository handles
read_handles = 4
"#
    }

    /// Parse and validate config text
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid TOML or fails validation.
    pub fn from_toml_str(content: &str) -> StoreResult<Self> {
        let config: GitStoreConfig = toml::from_str(content)
            .map_err(|e| StoreError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a config file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> StoreResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            StoreError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content).map_err(|e| match e {
            StoreError::Config(msg) => {
                StoreError::Config(format!("{} ({})", msg, path.display()))
            }
            other => other,
        })
    }

    /// Write the starter config file if it does not already exist
    ///
    /// Returns `Ok(())` whether the file was created or already existed.
    pub fn write_default_if_missing(path: &Path) -> StoreResult<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                StoreError::Config(format!(
                    "Failed to write default config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path
    pub fn write_to_file(&self, path: &Path) -> StoreResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| StoreError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            StoreError::Config(format!(
                "Failed to write config file '{}': {}",
                path.display(),
                e
            ))
        })
    }
}

impl fmt::Debug for GitStoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitStoreConfig")
            .field("git_url", &self.git_url)
            .field("workspace_root", &self.workspace_root)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("definitions_directory", &self.definitions_directory)
            .field("branch", &self.branch)
            .field("clean_initialization", &self.clean_initialization)
            .field("pull_push_timeout_secs", &self.pull_push_timeout_secs)
            .field("clone_timeout_secs", &self.clone_timeout_secs)
            .field("lock_timeout_secs", &self.lock_timeout_secs)
            .field("refresh_interval_secs", &self.refresh_interval_secs)
            .field("cache_max_entries", &self.cache_max_entries)
            .field("cache_expire_after_access_secs", &self.cache_expire_after_access_secs)
            .field("history_cache_capacity", &self.history_cache_capacity)
            .field("read_handles", &self.read_handles)
            .finish()
    }
}
