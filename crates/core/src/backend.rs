//! Backend configuration - which provider and model an invocation targets.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Parameters identifying a generation provider, model and limits.
///
/// The core treats every field as opaque and passes the record through to
/// the backend unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Key under which this config is declared (e.g. "primary", "flash")
    #[serde(default)]
    pub key: String,

    /// Provider name, informational
    pub provider: String,

    /// Model identifier
    pub model: String,

    /// Base URL of an OpenAI-compatible endpoint
    #[serde(default)]
    pub base_url: Option<String>,

    /// Environment variable holding the API key
    #[serde(default)]
    pub api_key_env: Option<String>,

    /// API key, resolved once at startup
    #[serde(skip)]
    pub api_key: Option<String>,

    /// Sampling temperature
    #[serde(default)]
    pub temperature: Option<f64>,

    /// Completion token limit
    #[serde(default)]
    pub max_tokens: Option<u32>,

    /// Per-invocation timeout override, in seconds
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl BackendConfig {
    /// Create a config with only provider and model set.
    pub fn new(key: impl Into<String>, provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            provider: provider.into(),
            model: model.into(),
            base_url: None,
            api_key_env: None,
            api_key: None,
            temperature: None,
            max_tokens: None,
            timeout_secs: None,
        }
    }

    /// Invocation timeout, falling back to `default` when unset.
    pub fn timeout_or(&self, default: Duration) -> Duration {
        self.timeout_secs.map(Duration::from_secs).unwrap_or(default)
    }

    /// Short label for logs: `key (provider/model)`.
    pub fn label(&self) -> String {
        format!("{} ({}/{})", self.key, self.provider, self.model)
    }
}
