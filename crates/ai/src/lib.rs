//! Generation backends and document sinks.
//!
//! The job runner only talks to [`GenerationBackend`]. Concrete backends and
//! the sink that turns generated text into stored documents live here.

#![warn(missing_docs)]

pub mod r#interface;
pub mod openai;
pub mod sink;
pub mod documenting;

pub use r#interface::{BackendError, Document, DocumentSink, GenerationBackend, SinkError};
pub use openai::OpenAiCompatibleBackend;
pub use sink::MarkdownSink;
pub use documenting::DocumentingBackend;
