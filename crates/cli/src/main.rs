//! quill CLI - resumable job orchestration for generation backends.

mod inputs;
mod manifest;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use quill_ai::{DocumentingBackend, GenerationBackend, MarkdownSink, OpenAiCompatibleBackend};
use quill_execution::{JobRunner, RunError, RunSummary, RunnerConfig};
use quill_storage::{write_json_atomic, BacklogStore, JsonBacklog, JsonLedger, LedgerStore, StatePaths};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::manifest::Manifest;

const EXIT_SETUP: u8 = 1;
const EXIT_HALTED: u8 = 2;

#[derive(Parser)]
#[command(name = "quill")]
#[command(about = "Resumable job orchestration for text-generation backends", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Manifest declaring backends, agents and jobs
    #[arg(short, long, global = true, default_value = "quill.json")]
    manifest: PathBuf,

    /// Directory holding the ledger, backlog and last run summary
    #[arg(short, long, global = true, default_value = ".quill")]
    state: PathBuf,

    /// Directory generated documents are written to
    #[arg(short, long, global = true, default_value = "outputs")]
    output: PathBuf,

    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute every job not yet in the ledger
    Run {
        /// Directory of *.md input documents substituted for {{inputs}}
        #[arg(long)]
        inputs: Option<PathBuf>,
        /// Keep going when a job exhausts its retries
        #[arg(long)]
        continue_on_exhaustion: bool,
        /// Execute at most this many jobs
        #[arg(long)]
        max_jobs: Option<usize>,
        /// Seconds to wait between jobs
        #[arg(long)]
        cooldown_secs: Option<u64>,
    },
    /// Show the jobs `run` would execute, in order
    Plan,
    /// Show ledger and backlog state
    Status,
    /// List backlog items
    Backlog {
        /// Only pending items
        #[arg(long)]
        pending: bool,
    },
    /// Clear the ledger so every job runs again
    Reset {
        /// Also drop the backlog
        #[arg(long)]
        backlog: bool,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match dispatch(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(EXIT_SETUP)
        }
    }
}

async fn dispatch(cli: Cli) -> Result<ExitCode> {
    let paths = StatePaths::new(&cli.state);

    match cli.command {
        Commands::Run {
            inputs: input_dir,
            continue_on_exhaustion,
            max_jobs,
            cooldown_secs,
        } => {
            let mut manifest = load_manifest(&cli.manifest).await?;
            if let Some(dir) = input_dir {
                let text = inputs::load_inputs(&dir).await?;
                manifest.apply_inputs(&text);
            }
            manifest.resolve_api_keys(|var| std::env::var(var).ok())?;

            let mut config = manifest.runner_config();
            if continue_on_exhaustion {
                config.halt_on_exhaustion = false;
            }
            if let Some(max) = max_jobs {
                config.max_jobs = Some(max);
            }
            if let Some(secs) = cooldown_secs {
                config.cooldown = Duration::from_secs(secs);
            }

            let mut runner = open_runner(manifest, &paths, &cli.output, config).await?;
            let result = runner.run().await;

            match &result {
                Ok(summary) => {
                    print!("{}", summary.render());
                    write_json_atomic(&paths.last_run(), summary)
                        .await
                        .context("cannot write run summary")?;
                    info!(path = %paths.last_run().display(), "Wrote run summary");
                }
                Err(e) => error!(error = %e, "Run aborted; state may be incomplete"),
            }

            return Ok(ExitCode::from(exit_code(&result)));
        }
        Commands::Plan => {
            let manifest = load_manifest(&cli.manifest).await?;
            let config = manifest.runner_config();
            let runner = open_runner(manifest, &paths, &cli.output, config).await?;
            let plan = runner.plan().await?;

            println!("Plan ({} to run, {} already completed)", plan.jobs.len(), plan.skipped);
            for (i, job) in plan.jobs.iter().enumerate() {
                println!("  {:>3}. {} [{}] agent={}", i + 1, job.name, job.ledger_key, job.agent);
            }
        }
        Commands::Status => {
            let ledger = JsonLedger::open(paths.ledger()).await?;
            let backlog = JsonBacklog::open(paths.backlog()).await?;
            let items = backlog.list().await?;
            let pending = items.iter().filter(|i| i.is_pending()).count();

            println!("quill status ({})", paths.root().display());
            println!("  Completed jobs: {}", ledger.len());
            for key in ledger.completed().await? {
                println!("    ✓ {}", key);
            }
            println!("  Backlog: {} pending, {} completed", pending, items.len() - pending);
        }
        Commands::Backlog { pending } => {
            let backlog = JsonBacklog::open(paths.backlog()).await?;
            let items: Vec<_> = backlog
                .list()
                .await?
                .into_iter()
                .filter(|i| !pending || i.is_pending())
                .collect();

            println!("Backlog ({})", items.len());
            for item in items {
                println!(
                    "  {} | {} | {} | {} (from {})",
                    item.id, item.status, item.priority, item.name, item.source_job
                );
            }
        }
        Commands::Reset { backlog } => {
            let mut ledger = JsonLedger::open(paths.ledger()).await?;
            let cleared = ledger.len();
            ledger.clear().await?;
            println!("Cleared {} ledger entries", cleared);

            if backlog {
                let mut store = JsonBacklog::open(paths.backlog()).await?;
                let dropped = store.list().await?.len();
                store.clear().await?;
                println!("Dropped {} backlog items", dropped);
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Process exit status for a finished run.
fn exit_code(result: &Result<RunSummary, RunError>) -> u8 {
    match result {
        Ok(summary) if summary.is_halted() => EXIT_HALTED,
        Ok(_) => 0,
        Err(_) => EXIT_SETUP,
    }
}

async fn load_manifest(path: &Path) -> Result<Manifest> {
    let manifest = Manifest::load(path).await?;
    info!(
        path = %path.display(),
        jobs = manifest.jobs.len(),
        agents = manifest.agents.len(),
        backends = manifest.backends.len(),
        "Loaded manifest"
    );
    Ok(manifest)
}

async fn open_runner(
    manifest: Manifest,
    paths: &StatePaths,
    output: &Path,
    config: RunnerConfig,
) -> Result<JobRunner<JsonLedger, JsonBacklog>> {
    let catalog = manifest.into_catalog()?;
    let ledger = JsonLedger::open(paths.ledger())
        .await
        .context("cannot open ledger")?;
    let backlog = JsonBacklog::open(paths.backlog())
        .await
        .context("cannot open backlog")?;

    let backend: Arc<dyn GenerationBackend> = Arc::new(DocumentingBackend::new(
        Arc::new(OpenAiCompatibleBackend::new()),
        Arc::new(MarkdownSink::new(output)),
    ));

    Ok(JobRunner::new(catalog, ledger, backlog, backend, config)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use quill_ai::BackendError;
    use quill_core::{AgentProfile, BackendConfig, JobDefinition, JobPayload};
    use quill_execution::{Catalog, RetryPolicy};
    use std::collections::HashMap;
    use tempfile::TempDir;

    /// Succeeds for every job except `failing`, which gets `error`.
    struct FailingJob {
        failing: &'static str,
        error: BackendError,
    }

    #[async_trait]
    impl GenerationBackend for FailingJob {
        async fn invoke(&self, payload: &JobPayload, _: &BackendConfig) -> Result<String, BackendError> {
            if payload.job_name == self.failing {
                Err(self.error.clone())
            } else {
                Ok(format!("ok: {}", payload.job_name))
            }
        }
    }

    fn catalog() -> Catalog {
        let agent = AgentProfile {
            name: "Analyst".to_string(),
            role: "Business Analyst".to_string(),
            goal: String::new(),
            background: String::new(),
            backend: "primary".to_string(),
            fallback_backend: None,
        };
        let jobs = ["A", "B", "C"]
            .iter()
            .map(|name| JobDefinition {
                name: name.to_string(),
                description: format!("Write {}", name),
                agent: "analyst".to_string(),
                expected_outcome: String::new(),
                document: None,
            })
            .collect();
        let backends = HashMap::from([(
            "primary".to_string(),
            BackendConfig::new("", "google", "gemini-2.0-flash-exp"),
        )]);

        Catalog::new(jobs, HashMap::from([("analyst".to_string(), agent)]), backends, "analyst").unwrap()
    }

    async fn run(dir: &TempDir, backend: FailingJob) -> Result<RunSummary, RunError> {
        let paths = StatePaths::new(dir.path());
        let ledger = JsonLedger::open(paths.ledger()).await.unwrap();
        let backlog = JsonBacklog::open(paths.backlog()).await.unwrap();
        let config = RunnerConfig {
            cooldown: Duration::ZERO,
            retry: RetryPolicy::new(2, Duration::ZERO),
            ..RunnerConfig::default()
        };

        let mut runner = JobRunner::new(catalog(), ledger, backlog, Arc::new(backend), config).unwrap();
        runner.run().await
    }

    #[tokio::test]
    async fn test_hard_failure_exits_zero() {
        let dir = TempDir::new().unwrap();
        let result = run(
            &dir,
            FailingJob {
                failing: "B",
                error: BackendError::Invalid("HTTP 400: malformed prompt".to_string()),
            },
        )
        .await;

        let summary = result.as_ref().unwrap();
        assert_eq!(summary.completed.len(), 2);
        assert_eq!(summary.failed[0].name, "B");
        assert_eq!(exit_code(&result), 0);
    }

    #[tokio::test]
    async fn test_exhaustion_exits_two() {
        let dir = TempDir::new().unwrap();
        let result = run(
            &dir,
            FailingJob {
                failing: "B",
                error: BackendError::RateLimited("HTTP 429: Too Many Requests".to_string()),
            },
        )
        .await;

        assert!(result.as_ref().unwrap().is_halted());
        assert_eq!(exit_code(&result), EXIT_HALTED);
    }

    #[tokio::test]
    async fn test_persistence_failure_exits_one() {
        let dir = TempDir::new().unwrap();
        let mut tmp = StatePaths::new(dir.path()).ledger().into_os_string();
        tmp.push(".tmp");
        std::fs::create_dir(tmp).unwrap();

        let result = run(
            &dir,
            FailingJob {
                failing: "none",
                error: BackendError::Other("unused".to_string()),
            },
        )
        .await;

        assert!(matches!(result, Err(RunError::Persistence(_))));
        assert_eq!(exit_code(&result), EXIT_SETUP);
    }
}
