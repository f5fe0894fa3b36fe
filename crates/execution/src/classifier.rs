//! Failure classification.
//!
//! The classifier is the single decision point between "try again" and
//! "give up on this job".

use quill_ai::BackendError;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Patterns (case-insensitive regexes) that mark a capacity / rate-limit failure.
///
/// Anchored on word boundaries so token counts, ids and file paths in an
/// unrelated message do not match.
pub const TRANSIENT_PATTERNS: &[&str] = &[
    r"\brate[ _-]?limit",
    r"\btoo many requests\b",
    r"\b(?:http|status|code|error)[ :=]*429\b",
    r"\bquota\b",
    r"\bresource(?: has been)?[ _]exhausted\b",
    r"\b(?:over|out of|insufficient|no) capacity\b",
    r"\boverloaded\b",
    r"\btimed out\b",
    r"\btimeout\b",
];

/// Substrings that make a timeout definitive rather than transient.
const DEFINITIVE_PATTERNS: &[&str] = &[
    "unauthorized",
    "forbidden",
    "permission denied",
    "invalid api key",
    "authentication",
];

/// How a failure should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureClass {
    /// Capacity exhaustion; recoverable by fallback or backoff
    Transient,
    /// Anything else; never retried
    Hard,
}

impl std::fmt::Display for FailureClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureClass::Transient => write!(f, "transient"),
            FailureClass::Hard => write!(f, "hard"),
        }
    }
}

/// Classifies backend failures by kind and message content.
#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    patterns: Vec<Regex>,
}

impl ErrorClassifier {
    /// Classifier using [`TRANSIENT_PATTERNS`] plus `extra` literal phrases.
    pub fn with_extra_patterns<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut classifier = Self::default();
        classifier.patterns.extend(
            extra
                .into_iter()
                .filter(|p| !p.as_ref().trim().is_empty())
                .filter_map(|p| compile(&regex::escape(p.as_ref().trim()))),
        );
        classifier
    }

    /// Classify `error`.
    ///
    /// `RateLimited` is always transient and `Invalid` always hard. An
    /// elapsed timeout is transient unless its message names a definitive
    /// failure. Anything else is transient iff its message matches a
    /// capacity pattern.
    pub fn classify(&self, error: &BackendError) -> FailureClass {
        let message = error.to_string().to_lowercase();

        match error {
            BackendError::RateLimited(_) => FailureClass::Transient,
            BackendError::Invalid(_) => FailureClass::Hard,
            BackendError::Timeout(_) => {
                if DEFINITIVE_PATTERNS.iter().any(|p| message.contains(p)) {
                    FailureClass::Hard
                } else {
                    FailureClass::Transient
                }
            }
            BackendError::Other(_) => {
                if self.patterns.iter().any(|re| re.is_match(&message)) {
                    FailureClass::Transient
                } else {
                    FailureClass::Hard
                }
            }
        }
    }
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self {
            patterns: TRANSIENT_PATTERNS.iter().filter_map(|p| compile(p)).collect(),
        }
    }
}

fn compile(pattern: &str) -> Option<Regex> {
    match RegexBuilder::new(pattern).case_insensitive(true).build() {
        Ok(re) => Some(re),
        Err(e) => {
            warn!(pattern, error = %e, "Skipping invalid transient pattern");
            None
        }
    }
}
