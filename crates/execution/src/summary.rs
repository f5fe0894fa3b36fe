//! End-of-run report.

use std::fmt::Write as _;

use quill_core::{BacklogItem, Time};
use serde::Serialize;
use tracing::{info, warn};

use crate::classifier::FailureClass;

/// A job that completed during the run.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CompletedJob {
    /// Job name
    pub name: String,
    /// Ledger key
    pub key: String,
    /// Backend key that produced the output
    pub backend: String,
    /// Backend invocations made
    pub attempts: usize,
    /// Whether the fallback backend produced the output
    pub used_fallback: bool,
}

/// A job that failed during the run.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FailedJob {
    /// Job name
    pub name: String,
    /// Ledger key
    pub key: String,
    /// Last error message
    pub reason: String,
    /// Classification of the last error
    pub class: FailureClass,
    /// Backend invocations made
    pub attempts: usize,
    /// Whether retries ran out on a transient failure
    pub exhausted: bool,
}

/// Why the run stopped early.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct HaltReason {
    /// Job that exhausted its retries
    pub job: String,
    /// Last error message
    pub reason: String,
    /// Jobs left unexecuted
    pub remaining: usize,
}

/// Summary of one run, logged, printed and written to `last-run.json`.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// Run start
    pub started_at: Time,
    /// Run end
    pub finished_at: Time,
    /// Successful jobs in execution order
    pub completed: Vec<CompletedJob>,
    /// Failed jobs in execution order
    pub failed: Vec<FailedJob>,
    /// Backlog items appended during the run
    pub discovered: Vec<BacklogItem>,
    /// Jobs skipped because the ledger already had them
    pub skipped: usize,
    /// Jobs left queued because of `max_jobs`
    pub deferred: usize,
    /// Set when the run stopped on retry exhaustion
    pub halted: Option<HaltReason>,
}

impl RunSummary {
    pub(crate) fn start(skipped: usize) -> Self {
        let now = chrono::Utc::now();
        Self {
            started_at: now,
            finished_at: now,
            completed: Vec::new(),
            failed: Vec::new(),
            discovered: Vec::new(),
            skipped,
            deferred: 0,
            halted: None,
        }
    }

    pub(crate) fn finish(&mut self) {
        self.finished_at = chrono::Utc::now();
    }

    /// Whether the run stopped on retry exhaustion.
    pub fn is_halted(&self) -> bool {
        self.halted.is_some()
    }

    /// Number of backend-invoking jobs attempted.
    pub fn executed(&self) -> usize {
        self.completed.len() + self.failed.len()
    }

    /// Emit the summary through `tracing`.
    pub fn log(&self) {
        info!(
            completed = self.completed.len(),
            failed = self.failed.len(),
            discovered = self.discovered.len(),
            skipped = self.skipped,
            deferred = self.deferred,
            "Run finished"
        );
        for job in &self.failed {
            warn!(job = %job.name, class = %job.class, attempts = job.attempts, reason = %job.reason, "Job failed");
        }
        if let Some(halt) = &self.halted {
            warn!(job = %halt.job, remaining = halt.remaining, "Run halted on exhausted retries");
        }
    }

    /// Human-readable report.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let elapsed = self.finished_at - self.started_at;

        let _ = writeln!(
            out,
            "Run summary ({}s): {} completed, {} failed, {} discovered, {} skipped",
            elapsed.num_seconds(),
            self.completed.len(),
            self.failed.len(),
            self.discovered.len(),
            self.skipped
        );

        if !self.completed.is_empty() {
            let _ = writeln!(out, "\nCompleted:");
            for job in &self.completed {
                let via = if job.used_fallback { " via fallback" } else { "" };
                let _ = writeln!(
                    out,
                    "  ✓ {} [{}{}, {} attempt(s)]",
                    job.name, job.backend, via, job.attempts
                );
            }
        }

        if !self.failed.is_empty() {
            let _ = writeln!(out, "\nFailed:");
            for job in &self.failed {
                let _ = writeln!(out, "  ✗ {} ({}): {}", job.name, job.class, job.reason);
            }
        }

        if !self.discovered.is_empty() {
            let _ = writeln!(out, "\nDiscovered:");
            for item in &self.discovered {
                let _ = writeln!(
                    out,
                    "  + {} [{}] from {} ({})",
                    item.name, item.priority, item.source_job, item.id
                );
            }
        }

        if self.deferred > 0 {
            let _ = writeln!(out, "\n{} job(s) deferred by the per-run limit", self.deferred);
        }

        if let Some(halt) = &self.halted {
            let _ = writeln!(
                out,
                "\nHalted: '{}' exhausted its retries ({}). {} job(s) not run; re-run once capacity recovers.",
                halt.job, halt.reason, halt.remaining
            );
        }

        out
    }
}
