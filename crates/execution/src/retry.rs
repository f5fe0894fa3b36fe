//! Retry-and-fallback controller.
//!
//! Per job execution the controller walks a small state machine:
//!
//! ```text
//! Primary --transient, fallback unused--> Fallback   (immediate, at most once)
//! Primary/Fallback --transient, attempts left--> same backend after backoff
//! Primary/Fallback --transient, no attempts left--> Exhausted
//! any --hard--> propagate
//! ```
//!
//! The attempt counter counts same-backend attempts. Switching to the
//! fallback does not advance it, so backoff after a switch restarts at
//! `base_delay`.

use std::sync::Arc;
use std::time::Duration;

use quill_ai::{BackendError, GenerationBackend};
use quill_core::{BackendConfig, JobPayload};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::classifier::{ErrorClassifier, FailureClass};

/// Bounded exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum same-backend attempts (at least 1)
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles afterwards
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Create a policy. `max_attempts` is clamped to at least 1.
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Delay slept after failed attempt number `attempt` (1-based):
    /// `base_delay * 2^(attempt - 1)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay.saturating_mul(1u32 << exponent)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(45))
    }
}

/// Controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ControllerState {
    /// Running on the primary backend
    Primary,
    /// Switched to the fallback backend
    Fallback,
    /// Out of attempts
    Exhausted,
}

/// Outcome of one attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// Backend returned text
    Success,
    /// Capacity failure
    TransientFailure(String),
    /// Non-retryable failure
    HardFailure(String),
}

/// One try of one job. Not persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionAttempt {
    /// Which configuration slot was used
    pub state: ControllerState,
    /// Backend config key
    pub backend: String,
    /// Same-backend attempt number (1-based)
    pub attempt: u32,
    /// Backoff slept before this attempt
    pub delay_before: Duration,
    /// Result
    pub outcome: AttemptOutcome,
}

/// Successful execution.
#[derive(Debug, Clone)]
pub struct ExecutionSuccess {
    /// Generated text
    pub output: String,
    /// Every attempt made, last one successful
    pub attempts: Vec<ExecutionAttempt>,
}

impl ExecutionSuccess {
    /// Backend key that produced the output.
    pub fn backend(&self) -> &str {
        self.attempts.last().map(|a| a.backend.as_str()).unwrap_or_default()
    }

    /// Whether the fallback backend produced the output.
    pub fn used_fallback(&self) -> bool {
        self.attempts
            .last()
            .is_some_and(|a| a.state == ControllerState::Fallback)
    }
}

/// Failed execution.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{error} ({class}, {} attempt(s))", .attempts.len())]
pub struct ExecutionFailure {
    /// Last error seen
    pub error: BackendError,
    /// Its classification
    pub class: FailureClass,
    /// Whether retries ran out on a transient failure
    pub exhausted: bool,
    /// Every attempt made
    pub attempts: Vec<ExecutionAttempt>,
}

/// Executes jobs with bounded retries and a single fallback switch.
pub struct RetryController {
    backend: Arc<dyn GenerationBackend>,
    classifier: ErrorClassifier,
    policy: RetryPolicy,
    default_timeout: Duration,
}

impl RetryController {
    /// Create a controller.
    pub fn new(
        backend: Arc<dyn GenerationBackend>,
        policy: RetryPolicy,
        default_timeout: Duration,
    ) -> Self {
        Self {
            backend,
            classifier: ErrorClassifier::default(),
            policy,
            default_timeout,
        }
    }

    /// Replace the classifier.
    pub fn with_classifier(mut self, classifier: ErrorClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Run `payload` on `primary`, escalating to `fallback` on capacity errors.
    pub async fn execute(
        &self,
        payload: &JobPayload,
        primary: &BackendConfig,
        fallback: Option<&BackendConfig>,
    ) -> Result<ExecutionSuccess, ExecutionFailure> {
        let mut state = ControllerState::Primary;
        let mut config = primary;
        let mut attempt = 1;
        let mut delay_before = Duration::ZERO;
        let mut attempts = Vec::new();

        loop {
            debug!(job = %payload.job_name, backend = %config.label(), attempt, "Invoking backend");

            let error = match self.invoke_once(payload, config).await {
                Ok(output) => {
                    attempts.push(ExecutionAttempt {
                        state,
                        backend: config.key.clone(),
                        attempt,
                        delay_before,
                        outcome: AttemptOutcome::Success,
                    });
                    return Ok(ExecutionSuccess { output, attempts });
                }
                Err(error) => error,
            };

            let class = self.classifier.classify(&error);
            attempts.push(ExecutionAttempt {
                state,
                backend: config.key.clone(),
                attempt,
                delay_before,
                outcome: match class {
                    FailureClass::Transient => AttemptOutcome::TransientFailure(error.to_string()),
                    FailureClass::Hard => AttemptOutcome::HardFailure(error.to_string()),
                },
            });

            if class == FailureClass::Hard {
                warn!(job = %payload.job_name, backend = %config.key, %error, "Hard failure, not retrying");
                return Err(ExecutionFailure {
                    error,
                    class,
                    exhausted: false,
                    attempts,
                });
            }

            if state == ControllerState::Primary {
                if let Some(fallback) = fallback {
                    info!(
                        job = %payload.job_name,
                        from = %config.key,
                        to = %fallback.key,
                        %error,
                        "Capacity failure, switching to fallback backend"
                    );
                    state = ControllerState::Fallback;
                    config = fallback;
                    delay_before = Duration::ZERO;
                    continue;
                }
            }

            if attempt < self.policy.max_attempts {
                let delay = self.policy.delay_for(attempt);
                warn!(
                    job = %payload.job_name,
                    backend = %config.key,
                    attempt,
                    max_attempts = self.policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    %error,
                    "Capacity failure, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
                delay_before = delay;
                continue;
            }

            warn!(
                job = %payload.job_name,
                backend = %config.key,
                attempts = attempts.len(),
                state = ?ControllerState::Exhausted,
                %error,
                "Retries exhausted"
            );
            return Err(ExecutionFailure {
                error,
                class,
                exhausted: true,
                attempts,
            });
        }
    }

    async fn invoke_once(&self, payload: &JobPayload, config: &BackendConfig) -> Result<String, BackendError> {
        let timeout = config.timeout_or(self.default_timeout);
        match tokio::time::timeout(timeout, self.backend.invoke(payload, config)).await {
            Ok(result) => result,
            Err(_) => Err(BackendError::Timeout(format!(
                "no response from {} within {}s",
                config.label(),
                timeout.as_secs()
            ))),
        }
    }
}
