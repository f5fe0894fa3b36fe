//! Static job catalog: jobs, personas and backend configs, validated once.

use std::collections::{HashMap, HashSet};

use quill_core::{AgentProfile, BackendConfig, JobDefinition, JobPayload, RunnableJob};

/// Catalog validation errors.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// Two jobs share a name
    #[error("duplicate job name '{0}'")]
    DuplicateJob(String),

    /// Job names an agent that is not declared
    #[error("job '{job}' references unknown agent '{agent}'")]
    UnknownAgent {
        /// Job name
        job: String,
        /// Missing agent key
        agent: String,
    },

    /// Agent names a backend that is not declared
    #[error("agent '{agent}' references unknown backend '{backend}'")]
    UnknownBackend {
        /// Agent key
        agent: String,
        /// Missing backend key
        backend: String,
    },

    /// The agent assigned to backlog items is not declared
    #[error("backlog agent '{0}' is not declared")]
    UnknownBacklogAgent(String),
}

/// Everything needed to invoke one job.
#[derive(Debug, Clone)]
pub struct ResolvedJob<'a> {
    /// Backend payload
    pub payload: JobPayload,
    /// Primary backend
    pub primary: &'a BackendConfig,
    /// Optional fallback backend
    pub fallback: Option<&'a BackendConfig>,
}

/// Validated set of static jobs, personas and backends.
#[derive(Debug, Clone)]
pub struct Catalog {
    jobs: Vec<JobDefinition>,
    agents: HashMap<String, AgentProfile>,
    backends: HashMap<String, BackendConfig>,
    backlog_agent: String,
}

impl Catalog {
    /// Build and validate a catalog.
    ///
    /// Backend configs take their `key` from the map key.
    pub fn new(
        jobs: Vec<JobDefinition>,
        agents: HashMap<String, AgentProfile>,
        mut backends: HashMap<String, BackendConfig>,
        backlog_agent: impl Into<String>,
    ) -> Result<Self, CatalogError> {
        let backlog_agent = backlog_agent.into();

        for (key, config) in backends.iter_mut() {
            config.key = key.clone();
        }

        for (key, agent) in &agents {
            let referenced = std::iter::once(&agent.backend).chain(agent.fallback_backend.as_ref());
            for backend in referenced {
                if !backends.contains_key(backend) {
                    return Err(CatalogError::UnknownBackend {
                        agent: key.clone(),
                        backend: backend.clone(),
                    });
                }
            }
        }

        let mut seen = HashSet::new();
        for job in &jobs {
            if !seen.insert(job.name.as_str()) {
                return Err(CatalogError::DuplicateJob(job.name.clone()));
            }
            if !agents.contains_key(&job.agent) {
                return Err(CatalogError::UnknownAgent {
                    job: job.name.clone(),
                    agent: job.agent.clone(),
                });
            }
        }

        if !agents.contains_key(&backlog_agent) {
            return Err(CatalogError::UnknownBacklogAgent(backlog_agent));
        }

        Ok(Self {
            jobs,
            agents,
            backends,
            backlog_agent,
        })
    }

    /// Static jobs in declaration order.
    pub fn jobs(&self) -> &[JobDefinition] {
        &self.jobs
    }

    /// Agent that runs backlog items.
    pub fn backlog_agent(&self) -> &str {
        &self.backlog_agent
    }

    /// Look up a backend config.
    pub fn backend(&self, key: &str) -> Option<&BackendConfig> {
        self.backends.get(key)
    }

    /// Resolve the payload and backend configs for `job`.
    pub fn resolve(&self, job: &RunnableJob) -> Result<ResolvedJob<'_>, CatalogError> {
        let agent = self.agents.get(&job.agent).ok_or_else(|| CatalogError::UnknownAgent {
            job: job.name.clone(),
            agent: job.agent.clone(),
        })?;

        let lookup = |backend: &String| {
            self.backends
                .get(backend)
                .ok_or_else(|| CatalogError::UnknownBackend {
                    agent: job.agent.clone(),
                    backend: backend.clone(),
                })
        };

        let primary = lookup(&agent.backend)?;
        let fallback = agent.fallback_backend.as_ref().map(lookup).transpose()?;

        Ok(ResolvedJob {
            payload: JobPayload::for_job(job, agent.system_prompt()),
            primary,
            fallback,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent(backend: &str, fallback: Option<&str>) -> AgentProfile {
        AgentProfile {
            name: "Analyst".to_string(),
            role: "Business Analyst".to_string(),
            goal: String::new(),
            background: String::new(),
            backend: backend.to_string(),
            fallback_backend: fallback.map(str::to_string),
        }
    }

    fn job(name: &str, agent: &str) -> JobDefinition {
        JobDefinition {
            name: name.to_string(),
            description: format!("Do {}", name),
            agent: agent.to_string(),
            expected_outcome: String::new(),
            document: None,
        }
    }

    fn backends() -> HashMap<String, BackendConfig> {
        HashMap::from([
            ("primary".to_string(), BackendConfig::new("", "google", "gemini-2.0-flash-exp")),
            ("fallback".to_string(), BackendConfig::new("", "google", "gemini-1.5-flash")),
        ])
    }

    #[test]
    fn test_resolve_with_fallback() {
        let catalog = Catalog::new(
            vec![job("A", "analyst")],
            HashMap::from([("analyst".to_string(), agent("primary", Some("fallback")))]),
            backends(),
            "analyst",
        )
        .unwrap();

        let runnable = RunnableJob::from_definition(&catalog.jobs()[0]);
        let resolved = catalog.resolve(&runnable).unwrap();

        assert_eq!(resolved.primary.key, "primary");
        assert_eq!(resolved.fallback.map(|b| b.key.as_str()), Some("fallback"));
        assert_eq!(resolved.payload.job_name, "A");
        assert!(resolved.payload.system_prompt.starts_with("You are Analyst"));
    }

    #[test]
    fn test_duplicate_job_rejected() {
        let result = Catalog::new(
            vec![job("A", "analyst"), job("A", "analyst")],
            HashMap::from([("analyst".to_string(), agent("primary", None))]),
            backends(),
            "analyst",
        );
        assert!(matches!(result, Err(CatalogError::DuplicateJob(name)) if name == "A"));
    }

    #[test]
    fn test_unknown_agent_rejected() {
        let result = Catalog::new(
            vec![job("A", "ghost")],
            HashMap::from([("analyst".to_string(), agent("primary", None))]),
            backends(),
            "analyst",
        );
        assert!(matches!(result, Err(CatalogError::UnknownAgent { .. })));
    }

    #[test]
    fn test_unknown_fallback_backend_rejected() {
        let result = Catalog::new(
            vec![],
            HashMap::from([("analyst".to_string(), agent("primary", Some("missing")))]),
            backends(),
            "analyst",
        );
        assert!(matches!(
            result,
            Err(CatalogError::UnknownBackend { backend, .. }) if backend == "missing"
        ));
    }

    #[test]
    fn test_unknown_backlog_agent_rejected() {
        let result = Catalog::new(
            vec![],
            HashMap::from([("analyst".to_string(), agent("primary", None))]),
            backends(),
            "writer",
        );
        assert!(matches!(result, Err(CatalogError::UnknownBacklogAgent(_))));
    }
}
