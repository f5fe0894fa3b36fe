//! OpenAI-compatible chat-completions backend.
//!
//! Works against any endpoint that speaks the `/chat/completions` dialect
//! (OpenAI, OpenRouter, Google's OpenAI-compatible surface, local proxies).
//! The backend performs exactly one HTTP request per invocation; retries and
//! fallback belong to the caller.

use async_trait::async_trait;
use quill_core::{BackendConfig, JobPayload};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{BackendError, GenerationBackend};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";
const GOOGLE_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";

/// Backend speaking the OpenAI chat-completions protocol.
pub struct OpenAiCompatibleBackend {
    client: Client,
}

impl OpenAiCompatibleBackend {
    /// Create a backend with a fresh HTTP client.
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }
}

impl Default for OpenAiCompatibleBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve the endpoint base URL for a config.
pub fn base_url_for(config: &BackendConfig) -> Result<String, BackendError> {
    if let Some(url) = &config.base_url {
        return Ok(url.trim_end_matches('/').to_string());
    }

    match config.provider.to_lowercase().as_str() {
        "openai" => Ok(OPENAI_BASE_URL.to_string()),
        "openrouter" => Ok(OPENROUTER_BASE_URL.to_string()),
        "google" | "gemini" => Ok(GOOGLE_BASE_URL.to_string()),
        other => Err(BackendError::Invalid(format!(
            "provider '{}' has no default base_url; set one in the backend config",
            other
        ))),
    }
}

/// Map a non-success HTTP status and body to a backend error.
pub fn error_for_status(status: u16, body: &str) -> BackendError {
    let message = serde_json::from_str::<ApiErrorResponse>(body)
        .map(|r| r.error.message)
        .unwrap_or_else(|_| body.trim().to_string());
    let message = format!("HTTP {}: {}", status, message);

    match status {
        429 => BackendError::RateLimited(message),
        400 | 401 | 403 | 404 | 422 => BackendError::Invalid(message),
        _ => BackendError::Other(message),
    }
}

#[async_trait]
impl GenerationBackend for OpenAiCompatibleBackend {
    async fn invoke(&self, payload: &JobPayload, config: &BackendConfig) -> Result<String, BackendError> {
        let url = format!("{}/chat/completions", base_url_for(config)?);

        let request = ApiRequest {
            model: &config.model,
            messages: vec![
                ApiMessage { role: "system", content: &payload.system_prompt },
                ApiMessage { role: "user", content: &payload.prompt },
            ],
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        };

        debug!(job = %payload.job_name, backend = %config.label(), "Sending chat completion request");

        let mut builder = self.client.post(&url).json(&request);
        if let Some(key) = &config.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                BackendError::Timeout(e.to_string())
            } else {
                BackendError::Other(format!("request to {} failed: {}", url, e))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "failed to read error response".to_string());
            return Err(error_for_status(status.as_u16(), &body));
        }

        let body: ApiResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Other(format!("failed to parse response: {}", e)))?;

        extract_content(body)
    }
}

fn extract_content(body: ApiResponse) -> Result<String, BackendError> {
    body.choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or_else(|| BackendError::Other("response contained no generated text".to_string()))
}

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    messages: Vec<ApiMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ApiMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ApiChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_from_provider() {
        let config = BackendConfig::new("primary", "Google", "gemini-2.0-flash-exp");
        assert_eq!(base_url_for(&config).unwrap(), GOOGLE_BASE_URL);
    }

    #[test]
    fn test_base_url_override_trims_slash() {
        let mut config = BackendConfig::new("local", "ollama", "llama3");
        config.base_url = Some("http://localhost:11434/v1/".to_string());
        assert_eq!(base_url_for(&config).unwrap(), "http://localhost:11434/v1");
    }

    #[test]
    fn test_unknown_provider_without_url_is_invalid() {
        let config = BackendConfig::new("x", "mystery", "m");
        assert!(matches!(base_url_for(&config), Err(BackendError::Invalid(_))));
    }

    #[test]
    fn test_status_429_is_rate_limited() {
        let body = r#"{"error": {"message": "Resource has been exhausted (e.g. check quota)."}}"#;
        let err = error_for_status(429, body);
        assert_eq!(
            err,
            BackendError::RateLimited(
                "HTTP 429: Resource has been exhausted (e.g. check quota).".to_string()
            )
        );
    }

    #[test]
    fn test_status_401_is_invalid() {
        let err = error_for_status(401, "bad key");
        assert_eq!(err, BackendError::Invalid("HTTP 401: bad key".to_string()));
    }

    #[test]
    fn test_status_500_is_other() {
        assert!(matches!(error_for_status(503, "overloaded"), BackendError::Other(_)));
    }

    #[test]
    fn test_extract_content_rejects_empty() {
        let body: ApiResponse =
            serde_json::from_str(r#"{"choices": [{"message": {"content": "  "}}]}"#).unwrap();
        assert!(extract_content(body).is_err());

        let body: ApiResponse =
            serde_json::from_str(r#"{"choices": [{"message": {"content": "hello"}}]}"#).unwrap();
        assert_eq!(extract_content(body).unwrap(), "hello");
    }
}
