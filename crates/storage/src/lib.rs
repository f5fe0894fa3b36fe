//! Persistent state for quill.
//!
//! This crate provides the ledger and backlog store traits together with
//! JSON-file implementations that rewrite their file atomically after each
//! mutation.

#![warn(missing_docs)]

pub mod trait_;
pub mod json_storage;

pub use trait_::{BacklogStore, LedgerStore, Result, StorageError};
pub use json_storage::{write_json_atomic, JsonBacklog, JsonLedger, StatePaths};
