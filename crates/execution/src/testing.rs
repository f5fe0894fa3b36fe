//! Test doubles shared by the execution tests.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use quill_ai::{BackendError, GenerationBackend};
use quill_core::{BackendConfig, JobPayload};
use tokio::sync::Mutex;

/// Backend that replays queued results per `(backend key, job name)`.
///
/// Unscripted calls succeed with `"ok: <job>"`.
#[derive(Default)]
pub struct ScriptedBackend {
    scripts: Mutex<HashMap<(String, String), VecDeque<Result<String, BackendError>>>>,
    calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn script(
        &self,
        backend: &str,
        job: &str,
        results: impl IntoIterator<Item = Result<String, BackendError>>,
    ) {
        self.scripts
            .lock()
            .await
            .entry((backend.to_string(), job.to_string()))
            .or_default()
            .extend(results);
    }

    /// `(backend key, job name)` for every invocation, in order.
    pub async fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().await.clone()
    }

    pub async fn calls_for_job(&self, job: &str) -> Vec<String> {
        self.calls
            .lock()
            .await
            .iter()
            .filter(|(_, j)| j == job)
            .map(|(b, _)| b.clone())
            .collect()
    }
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    async fn invoke(&self, payload: &JobPayload, config: &BackendConfig) -> Result<String, BackendError> {
        let key = (config.key.clone(), payload.job_name.clone());
        self.calls.lock().await.push(key.clone());

        match self.scripts.lock().await.get_mut(&key).and_then(|q| q.pop_front()) {
            Some(result) => result,
            None => Ok(format!("ok: {}", payload.job_name)),
        }
    }
}

pub fn rate_limited() -> Result<String, BackendError> {
    Err(BackendError::RateLimited("HTTP 429: Too Many Requests".to_string()))
}

pub fn hard_error() -> Result<String, BackendError> {
    Err(BackendError::Invalid("HTTP 400: malformed prompt".to_string()))
}
