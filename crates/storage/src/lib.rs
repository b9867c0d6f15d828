//! Git-backed storage for Proctor test definitions
//!
//! This crate implements the store on top of a git repository:
//! - GitProctorStore: ProctorReader/ProctorWriter facade and lifecycle
//! - GitPersister: clone, pull, commit, push and revision-qualified reads
//! - WorkspaceProvider: checkout ownership and write serialization
//! - HistoryParser: per-test history from the commit graph, memoized per commit
//! - CachingDecorator: bounded expire-after-access cache keyed by revision
//! - Classifier: transport failures to actionable error kinds
//! - GitDirectoryRefresher: periodic background pull
//!
//! # Repository layout
//!
//! ```text
//! <root>/<definitions dir>/<test name>/definition.json
//! <root>/<definitions dir>/<test name>/metadata.json
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cache;
pub mod classifier;
pub mod client;
pub mod config;
pub mod history;
pub mod layout;
pub mod persister;
pub mod refresher;
pub mod repo_pool;
pub mod store;
pub mod workspace;

pub use cache::{CacheStats, CachingDecorator, ContentSource};
pub use classifier::{classify, CauseKind, Classification, PushRejected, TransportError};
pub use client::WorkspaceClient;
pub use config::{GitStoreConfig, CONFIG_FILE_NAME};
pub use history::HistoryParser;
pub use layout::{DefinitionLayout, DEFAULT_DEFINITIONS_DIRECTORY, ZERO_OBJECT_ID};
pub use persister::{GitPersister, NON_FAST_FORWARD_MESSAGE};
pub use refresher::GitDirectoryRefresher;
pub use repo_pool::RepoPool;
pub use store::{legacy, GitProctorStore, StoreState};
pub use workspace::WorkspaceProvider;
