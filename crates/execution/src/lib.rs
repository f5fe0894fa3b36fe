//! Execution layer - failure classification, retry and fallback, suggestion
//! extraction and the sequential job runner.

#![warn(missing_docs)]

pub mod catalog;
pub mod classifier;
pub mod engine;
pub mod extractor;
pub mod retry;
pub mod summary;

#[cfg(test)]
mod testing;

pub use catalog::{Catalog, CatalogError, ResolvedJob};
pub use classifier::{ErrorClassifier, FailureClass};
pub use engine::{JobRunner, Plan, RunError, RunnerConfig};
pub use extractor::{ParsedSuggestion, RejectReason, Suggestion, SuggestionExtractor, DEFAULT_MARKER};
pub use retry::{
    AttemptOutcome, ControllerState, ExecutionAttempt, ExecutionFailure, ExecutionSuccess,
    RetryController, RetryPolicy,
};
pub use summary::{CompletedJob, FailedJob, HaltReason, RunSummary};
