//! The job runner - drives the job list to completion.
//!
//! ```text
//! plan -> execute (retry/fallback) -> extract suggestions -> record -> cooldown
//! ```

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use quill_ai::GenerationBackend;
use quill_core::RunnableJob;
use quill_storage::{BacklogStore, LedgerStore, StorageError};
use tracing::{debug, error, info, warn};

use crate::catalog::{Catalog, CatalogError};
use crate::classifier::ErrorClassifier;
use crate::extractor::{SuggestionExtractor, DEFAULT_MARKER};
use crate::retry::{RetryController, RetryPolicy};
use crate::summary::{CompletedJob, FailedJob, HaltReason, RunSummary};

/// Runner configuration, built once at startup.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Pause between consecutive job executions
    pub cooldown: Duration,
    /// Same-backend retry bounds
    pub retry: RetryPolicy,
    /// Invocation timeout for backends without their own
    pub invocation_timeout: Duration,
    /// Stop the run when a job exhausts its retries on transient failures
    pub halt_on_exhaustion: bool,
    /// Cap on executions per run (None = unlimited)
    pub max_jobs: Option<usize>,
    /// Suggestion marker token
    pub marker: String,
    /// Extra phrases that mark a failure as transient
    pub transient_patterns: Vec<String>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(60),
            retry: RetryPolicy::default(),
            invocation_timeout: Duration::from_secs(300),
            halt_on_exhaustion: true,
            max_jobs: None,
            marker: DEFAULT_MARKER.to_string(),
            transient_patterns: Vec::new(),
        }
    }
}

/// Errors that abort a run.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// Ledger or backlog could not be read or written
    #[error("persistence failure: {0}")]
    Persistence(#[from] StorageError),

    /// A job could not be resolved against the catalog
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// The configured marker does not compile to a pattern
    #[error("invalid suggestion marker: {0}")]
    Marker(#[from] regex::Error),
}

/// Ordered job list for one run.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    /// Jobs to execute, in order
    pub jobs: Vec<RunnableJob>,
    /// Jobs filtered out as already completed
    pub skipped: usize,
}

/// Sequential job runner over a ledger and a backlog.
pub struct JobRunner<L: LedgerStore, B: BacklogStore> {
    catalog: Catalog,
    ledger: L,
    backlog: B,
    controller: RetryController,
    extractor: SuggestionExtractor,
    config: RunnerConfig,
}

impl<L: LedgerStore, B: BacklogStore> JobRunner<L, B> {
    /// Create a runner.
    pub fn new(
        catalog: Catalog,
        ledger: L,
        backlog: B,
        backend: Arc<dyn GenerationBackend>,
        config: RunnerConfig,
    ) -> Result<Self, RunError> {
        let extractor = SuggestionExtractor::new(&config.marker)?;
        let classifier = ErrorClassifier::with_extra_patterns(&config.transient_patterns);
        let controller = RetryController::new(backend, config.retry, config.invocation_timeout)
            .with_classifier(classifier);

        Ok(Self {
            catalog,
            ledger,
            backlog,
            controller,
            extractor,
            config,
        })
    }

    /// Static jobs in declaration order, then pending backlog items in
    /// insertion order, minus everything the ledger already holds.
    pub async fn plan(&self) -> Result<Plan, RunError> {
        let mut plan = Plan::default();

        for def in self.catalog.jobs() {
            if self.ledger.is_completed(&def.name).await? {
                plan.skipped += 1;
                continue;
            }
            plan.jobs.push(RunnableJob::from_definition(def));
        }

        for item in self.backlog.list().await? {
            let key = item.id.to_string();
            if !item.is_pending() || self.ledger.is_completed(&key).await? {
                plan.skipped += 1;
                continue;
            }
            plan.jobs.push(RunnableJob::from_backlog(&item, self.catalog.backlog_agent()));
        }

        Ok(plan)
    }

    /// Execute the plan.
    ///
    /// Job failures are recorded in the summary. Only persistence failures
    /// abort the run with an error.
    pub async fn run(&mut self) -> Result<RunSummary, RunError> {
        let Plan { jobs, skipped } = self.plan().await?;
        let mut queue: VecDeque<RunnableJob> = jobs.into();
        let mut summary = RunSummary::start(skipped);
        let mut executed = 0usize;

        info!(queued = queue.len(), skipped, "Starting run");

        while let Some(job) = queue.pop_front() {
            if let Some(max) = self.config.max_jobs {
                if executed >= max {
                    summary.deferred = queue.len() + 1;
                    info!(max, deferred = summary.deferred, "Reached per-run job limit");
                    break;
                }
            }

            if executed > 0 && !self.config.cooldown.is_zero() {
                debug!(cooldown_ms = self.config.cooldown.as_millis() as u64, "Cooling down");
                tokio::time::sleep(self.config.cooldown).await;
            }
            executed += 1;

            let resolved = self.catalog.resolve(&job)?;
            info!(job = %job.name, key = %job.ledger_key, backend = %resolved.primary.key, "Executing job");

            match self
                .controller
                .execute(&resolved.payload, resolved.primary, resolved.fallback)
                .await
            {
                Ok(success) => {
                    for mut item in self.extractor.extract(&success.output, &job.ledger_key) {
                        item.id = self.backlog.append(item.clone()).await?;
                        info!(job = %job.name, item = %item.name, id = %item.id, "Discovered follow-up job");
                        queue.push_back(RunnableJob::from_backlog(&item, self.catalog.backlog_agent()));
                        summary.discovered.push(item);
                    }

                    self.ledger.mark_completed(&job.ledger_key).await?;
                    if let Some(id) = job.backlog_id() {
                        self.backlog.mark_completed(id).await?;
                    }

                    info!(job = %job.name, backend = %success.backend(), attempts = success.attempts.len(), "Job completed");
                    summary.completed.push(CompletedJob {
                        name: job.name.clone(),
                        key: job.ledger_key.clone(),
                        backend: success.backend().to_string(),
                        attempts: success.attempts.len(),
                        used_fallback: success.used_fallback(),
                    });
                }
                Err(failure) => {
                    error!(job = %job.name, class = %failure.class, error = %failure.error, "Job failed");
                    let reason = failure.error.to_string();
                    summary.failed.push(FailedJob {
                        name: job.name.clone(),
                        key: job.ledger_key.clone(),
                        reason: reason.clone(),
                        class: failure.class,
                        attempts: failure.attempts.len(),
                        exhausted: failure.exhausted,
                    });

                    if failure.exhausted && self.config.halt_on_exhaustion {
                        warn!(job = %job.name, remaining = queue.len(), "Retries exhausted, halting run");
                        summary.halted = Some(HaltReason {
                            job: job.name.clone(),
                            reason,
                            remaining: queue.len(),
                        });
                        break;
                    }
                }
            }
        }

        summary.finish();
        summary.log();
        Ok(summary)
    }

    /// Get a reference to the ledger.
    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Get a reference to the backlog.
    pub fn backlog(&self) -> &B {
        &self.backlog
    }
}
