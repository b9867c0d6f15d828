//! Proctor store - git-backed versioned storage for test definitions
//!
//! Every test definition lives as a JSON file in a git repository, so each
//! change is a commit: auditable, revertible and replicated with the
//! repository itself.
//!
//! # Quick Start
//!
//! ```ignore
//! use proctor_store::{ChangeMetadata, GitProctorStore, GitStoreConfig, ProctorReader, ProctorWriter};
//!
//! let config = GitStoreConfig::new("https://git.example.com/proctor/data.git", "/var/lib/proctor/ws");
//! let store = GitProctorStore::open(config)?;
//!
//! let change = ChangeMetadata::new("jdoe", "Add checkout button test");
//! let revision = store.add_test_definition(&change, "checkout_button", &definition, &metadata)?;
//! let history = store.history("checkout_button", 0, 10)?;
//! ```
//!
//! # Architecture
//!
//! The model, error taxonomy and reader/writer traits live in
//! `proctor-core`; the git-backed implementation lives in `proctor-storage`.
//! Both are re-exported here.

pub use proctor_core::*;
pub use proctor_storage::*;
