//! Backend wrapper that materializes generated text as documents.

use async_trait::async_trait;
use quill_core::{BackendConfig, JobPayload};
use std::sync::Arc;

use crate::{BackendError, Document, DocumentSink, GenerationBackend};

/// Runs the inner backend, then stores the output through a sink.
///
/// A sink failure fails the invocation, so a job is never recorded as
/// complete while its document is missing.
pub struct DocumentingBackend {
    inner: Arc<dyn GenerationBackend>,
    sink: Arc<dyn DocumentSink>,
}

impl DocumentingBackend {
    /// Wrap `inner`, saving through `sink`.
    pub fn new(inner: Arc<dyn GenerationBackend>, sink: Arc<dyn DocumentSink>) -> Self {
        Self { inner, sink }
    }
}

#[async_trait]
impl GenerationBackend for DocumentingBackend {
    async fn invoke(&self, payload: &JobPayload, config: &BackendConfig) -> Result<String, BackendError> {
        let output = self.inner.invoke(payload, config).await?;

        if let Some(spec) = &payload.document {
            let document = Document {
                key: payload.job_key.clone(),
                title: spec.title.clone(),
                content: output.clone(),
                doc_type: spec.doc_type.clone(),
                format: spec.format.clone(),
            };
            self.sink
                .save(&document)
                .await
                .map_err(|e| BackendError::Invalid(format!("document sink failed: {}", e)))?;
        }

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SinkError;
    use quill_core::DocumentSpec;
    use std::path::PathBuf;
    use tokio::sync::Mutex;

    struct FixedBackend(Result<String, BackendError>);

    #[async_trait]
    impl GenerationBackend for FixedBackend {
        async fn invoke(&self, _: &JobPayload, _: &BackendConfig) -> Result<String, BackendError> {
            self.0.clone()
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        saved: Mutex<Vec<Document>>,
        fail: bool,
    }

    #[async_trait]
    impl DocumentSink for RecordingSink {
        async fn save(&self, document: &Document) -> Result<PathBuf, SinkError> {
            if self.fail {
                return Err(SinkError::InvalidTitle(document.title.clone()));
            }
            self.saved.lock().await.push(document.clone());
            Ok(PathBuf::from("out.md"))
        }
    }

    fn payload(document: Option<DocumentSpec>) -> JobPayload {
        JobPayload {
            job_name: "A".to_string(),
            job_key: "A".to_string(),
            system_prompt: "You are a writer.".to_string(),
            prompt: "Write".to_string(),
            document,
        }
    }

    fn config() -> BackendConfig {
        BackendConfig::new("primary", "openai", "gpt-4o-mini")
    }

    #[tokio::test]
    async fn test_saves_document_on_success() {
        let sink = Arc::new(RecordingSink::default());
        let backend = DocumentingBackend::new(
            Arc::new(FixedBackend(Ok("body".to_string()))),
            sink.clone(),
        );

        let output = backend
            .invoke(&payload(Some(DocumentSpec::markdown("Guide", "document"))), &config())
            .await
            .unwrap();

        assert_eq!(output, "body");
        let saved = sink.saved.lock().await;
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].title, "Guide");
        assert_eq!(saved[0].key, "A");
        assert_eq!(saved[0].content, "body");
    }

    #[tokio::test]
    async fn test_no_document_spec_skips_sink() {
        let sink = Arc::new(RecordingSink::default());
        let backend = DocumentingBackend::new(
            Arc::new(FixedBackend(Ok("body".to_string()))),
            sink.clone(),
        );

        backend.invoke(&payload(None), &config()).await.unwrap();
        assert!(sink.saved.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_sink_failure_fails_invocation() {
        let sink = Arc::new(RecordingSink { fail: true, ..Default::default() });
        let backend = DocumentingBackend::new(
            Arc::new(FixedBackend(Ok("body".to_string()))),
            sink,
        );

        let result = backend
            .invoke(&payload(Some(DocumentSpec::markdown("Guide", "document"))), &config())
            .await;
        assert!(matches!(result, Err(BackendError::Invalid(_))));
    }

    #[tokio::test]
    async fn test_backend_error_passes_through() {
        let sink = Arc::new(RecordingSink::default());
        let backend = DocumentingBackend::new(
            Arc::new(FixedBackend(Err(BackendError::RateLimited("429".to_string())))),
            sink.clone(),
        );

        let result = backend
            .invoke(&payload(Some(DocumentSpec::markdown("Guide", "document"))), &config())
            .await;
        assert_eq!(result, Err(BackendError::RateLimited("429".to_string())));
        assert!(sink.saved.lock().await.is_empty());
    }
}
