//! Manifest loading: backends, agents, jobs and run settings.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use quill_core::{AgentProfile, BackendConfig, JobDefinition};
use quill_execution::{Catalog, CatalogError, RetryPolicy, RunnerConfig, DEFAULT_MARKER};
use serde::Deserialize;

/// Placeholder in job descriptions replaced by the loaded input documents.
pub const INPUTS_PLACEHOLDER: &str = "{{inputs}}";

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("cannot read manifest {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid manifest {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("backend '{backend}' needs an API key in ${var}")]
    MissingApiKey { backend: String, var: String },

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// Run tuning. Every field is optional and overrides a built-in default.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub max_attempts: Option<u32>,
    pub base_delay_secs: Option<u64>,
    pub cooldown_secs: Option<u64>,
    pub timeout_secs: Option<u64>,
    pub halt_on_exhaustion: Option<bool>,
    pub max_jobs_per_run: Option<usize>,
    /// Extra phrases that mark a backend failure as transient
    pub transient_patterns: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Manifest {
    pub backends: HashMap<String, BackendConfig>,
    pub agents: HashMap<String, AgentProfile>,
    #[serde(default)]
    pub jobs: Vec<JobDefinition>,
    pub backlog_agent: String,
    #[serde(default = "default_marker")]
    pub marker: String,
    #[serde(default)]
    pub settings: Settings,
}

fn default_marker() -> String {
    DEFAULT_MARKER.to_string()
}

impl Manifest {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ManifestError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        serde_json::from_str(&text).map_err(|source| ManifestError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Resolve every backend's API key through `lookup` (normally the
    /// process environment). Backends without `api_key_env` run keyless.
    pub fn resolve_api_keys(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ManifestError> {
        for (key, backend) in self.backends.iter_mut() {
            let Some(var) = &backend.api_key_env else {
                continue;
            };
            match lookup(var).filter(|v| !v.trim().is_empty()) {
                Some(value) => backend.api_key = Some(value),
                None => {
                    return Err(ManifestError::MissingApiKey {
                        backend: key.clone(),
                        var: var.clone(),
                    })
                }
            }
        }
        Ok(())
    }

    /// Substitute the input documents into every job description.
    pub fn apply_inputs(&mut self, inputs: &str) {
        for job in &mut self.jobs {
            if job.description.contains(INPUTS_PLACEHOLDER) {
                job.description = job.description.replace(INPUTS_PLACEHOLDER, inputs);
            }
        }
    }

    /// Runner configuration from the `settings` block over the defaults.
    pub fn runner_config(&self) -> RunnerConfig {
        let defaults = RunnerConfig::default();
        let s = &self.settings;

        RunnerConfig {
            cooldown: s.cooldown_secs.map(Duration::from_secs).unwrap_or(defaults.cooldown),
            retry: RetryPolicy::new(
                s.max_attempts.unwrap_or(defaults.retry.max_attempts),
                s.base_delay_secs
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.retry.base_delay),
            ),
            invocation_timeout: s
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.invocation_timeout),
            halt_on_exhaustion: s.halt_on_exhaustion.unwrap_or(defaults.halt_on_exhaustion),
            max_jobs: s.max_jobs_per_run,
            marker: self.marker.clone(),
            transient_patterns: s.transient_patterns.clone(),
        }
    }

    pub fn into_catalog(self) -> Result<Catalog, ManifestError> {
        Ok(Catalog::new(self.jobs, self.agents, self.backends, self.backlog_agent)?)
    }
}
