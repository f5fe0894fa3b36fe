//! Job model - the unit of orchestrated work.

use serde::{Deserialize, Serialize};
use crate::id::BacklogId;
use crate::backlog::BacklogItem;

/// A statically authored job.
///
/// Created once at startup from the manifest and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDefinition {
    /// Stable identity across runs (also the ledger key)
    pub name: String,

    /// Prompt / instructions payload
    pub description: String,

    /// Key of the agent persona that runs this job
    pub agent: String,

    /// Free-text expected outcome, informational only
    #[serde(default)]
    pub expected_outcome: String,

    /// Document to materialize from the generated text
    #[serde(default)]
    pub document: Option<DocumentSpec>,
}

/// How a generated text is stored as a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSpec {
    /// Document title
    pub title: String,

    /// Document type (e.g. "use-cases", "document")
    #[serde(rename = "type", default = "default_doc_type")]
    pub doc_type: String,

    /// Output format (e.g. "markdown")
    #[serde(default = "default_format")]
    pub format: String,
}

fn default_doc_type() -> String {
    "document".to_string()
}

fn default_format() -> String {
    "markdown".to_string()
}

impl DocumentSpec {
    /// A markdown document with the given title and type.
    pub fn markdown(title: impl Into<String>, doc_type: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            doc_type: doc_type.into(),
            format: default_format(),
        }
    }
}

/// Where a runnable job came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobSource {
    /// Declared in the manifest
    Static,
    /// Discovered in a prior job's output
    Backlog(BacklogId),
}

/// A job ready to be scheduled.
///
/// Static definitions and backlog items both flatten into this shape. The
/// ledger key and human-readable name are carried from creation on.
#[derive(Debug, Clone, PartialEq)]
pub struct RunnableJob {
    /// Key recorded in the ledger on success
    pub ledger_key: String,

    /// Human-readable name
    pub name: String,

    /// Prompt / instructions payload
    pub description: String,

    /// Agent persona key
    pub agent: String,

    /// Expected outcome
    pub expected_outcome: String,

    /// Document to materialize
    pub document: Option<DocumentSpec>,

    /// Origin
    pub source: JobSource,
}

impl RunnableJob {
    /// Build from a static definition. The ledger key is the job name.
    pub fn from_definition(def: &JobDefinition) -> Self {
        Self {
            ledger_key: def.name.clone(),
            name: def.name.clone(),
            description: def.description.clone(),
            agent: def.agent.clone(),
            expected_outcome: def.expected_outcome.clone(),
            document: def.document.clone(),
            source: JobSource::Static,
        }
    }

    /// Build from a backlog item, run by `agent`. The ledger key is the item id.
    pub fn from_backlog(item: &BacklogItem, agent: &str) -> Self {
        Self {
            ledger_key: item.id.to_string(),
            name: item.name.clone(),
            description: item.description.clone(),
            agent: agent.to_string(),
            expected_outcome: format!("Follow-up work suggested by {}", item.source_job),
            document: Some(DocumentSpec::markdown(item.name.clone(), "follow-up")),
            source: JobSource::Backlog(item.id),
        }
    }

    /// Backlog id, if this job came from the backlog.
    pub fn backlog_id(&self) -> Option<BacklogId> {
        match self.source {
            JobSource::Backlog(id) => Some(id),
            JobSource::Static => None,
        }
    }
}

/// What the generation backend receives for one invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct JobPayload {
    /// Job name, for logs
    pub job_name: String,

    /// Ledger key of the job
    pub job_key: String,

    /// Persona system prompt
    pub system_prompt: String,

    /// User prompt
    pub prompt: String,

    /// Document to materialize on success
    pub document: Option<DocumentSpec>,
}

impl JobPayload {
    /// Assemble the payload for `job` as run by a persona with `system_prompt`.
    pub fn for_job(job: &RunnableJob, system_prompt: impl Into<String>) -> Self {
        let mut prompt = job.description.trim().to_string();
        if !job.expected_outcome.is_empty() {
            prompt.push_str("\n\nExpected outcome: ");
            prompt.push_str(&job.expected_outcome);
        }

        Self {
            job_name: job.name.clone(),
            job_key: job.ledger_key.clone(),
            system_prompt: system_prompt.into(),
            prompt,
            document: job.document.clone(),
        }
    }
}
