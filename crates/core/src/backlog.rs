//! Backlog model - follow-up work discovered in job output.

use serde::{Deserialize, Serialize};
use crate::id::BacklogId;
use crate::Time;

/// A dynamically discovered job.
///
/// Append-only: the only mutation is `Pending -> Completed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacklogItem {
    /// Unique, time-derived identifier
    pub id: BacklogId,

    /// Short name
    pub name: String,

    /// Instructions for the follow-up job
    pub description: String,

    /// Scheduling priority
    #[serde(default)]
    pub priority: Priority,

    /// Current status
    pub status: BacklogStatus,

    /// When the item was extracted
    pub created_at: Time,

    /// Name of the job whose output produced this item (weak reference)
    pub source_job: String,
}

impl BacklogItem {
    /// Create a new pending item with a fresh id.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        priority: Priority,
        source_job: impl Into<String>,
    ) -> Self {
        Self {
            id: BacklogId::new(),
            name: name.into(),
            description: description.into(),
            priority,
            status: BacklogStatus::Pending,
            created_at: chrono::Utc::now(),
            source_job: source_job.into(),
        }
    }

    /// Whether the item still awaits execution.
    pub fn is_pending(&self) -> bool {
        self.status == BacklogStatus::Pending
    }
}

/// Backlog item status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BacklogStatus {
    /// Awaiting execution
    Pending,
    /// Executed successfully
    Completed,
}

impl std::fmt::Display for BacklogStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BacklogStatus::Pending => write!(f, "pending"),
            BacklogStatus::Completed => write!(f, "completed"),
        }
    }
}

/// Ordinal priority. Ordering follows urgency: `Low < Medium < High < Critical`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Nice to have
    Low,
    /// Default when unspecified
    #[default]
    Medium,
    /// Important
    High,
    /// Blocking
    Critical,
}

impl Priority {
    /// Interpret a loosely typed priority value.
    ///
    /// Accepts names (`"high"`), P-levels (`"P0"` is critical) and the
    /// numbers 0-3 (0 is critical). Anything else yields `None`.
    pub fn from_value(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::String(s) => Self::from_label(s),
            serde_json::Value::Number(n) => n.as_u64().and_then(Self::from_level),
            _ => None,
        }
    }

    fn from_label(label: &str) -> Option<Self> {
        let label = label.trim().to_lowercase();
        match label.as_str() {
            "low" => Some(Priority::Low),
            "medium" | "normal" => Some(Priority::Medium),
            "high" => Some(Priority::High),
            "critical" | "urgent" => Some(Priority::Critical),
            _ => label
                .strip_prefix('p')
                .and_then(|level| level.parse().ok())
                .and_then(Self::from_level),
        }
    }

    fn from_level(level: u64) -> Option<Self> {
        match level {
            0 => Some(Priority::Critical),
            1 => Some(Priority::High),
            2 => Some(Priority::Medium),
            3 => Some(Priority::Low),
            _ => None,
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Low => write!(f, "low"),
            Priority::Medium => write!(f, "medium"),
            Priority::High => write!(f, "high"),
            Priority::Critical => write!(f, "critical"),
        }
    }
}
