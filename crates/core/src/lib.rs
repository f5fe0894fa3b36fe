//! quill core data models.
//!
//! This crate defines the data structures shared by the ledger, the
//! backlog and the job runner.

#![warn(missing_docs)]

// Core identities
mod id;

// Backends and personas
mod backend;
mod agent;

// Work items
mod job;
mod backlog;

// Re-exports
pub use id::*;

pub use backend::BackendConfig;
pub use agent::AgentProfile;
pub use job::{DocumentSpec, JobDefinition, JobPayload, JobSource, RunnableJob};
pub use backlog::{BacklogItem, BacklogStatus, Priority};

/// Timestamp type
pub type Time = chrono::DateTime<chrono::Utc>;
