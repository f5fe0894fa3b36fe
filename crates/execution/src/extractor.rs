//! Suggestion extraction.
//!
//! Job output may embed follow-up work as `MARKER: { ...json... }`. Each
//! occurrence is parsed into a [`ParsedSuggestion`]; rejected payloads are
//! values routed to a discard path, never errors.

use quill_core::{BacklogItem, Priority};
use regex::{Regex, RegexBuilder};
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

/// Marker token used when none is configured.
pub const DEFAULT_MARKER: &str = "FOLLOW_UP_TASK";

/// A validated suggestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suggestion {
    /// Follow-up job name
    pub name: String,
    /// Follow-up job instructions
    pub description: String,
    /// Priority, defaulted when absent or unrecognized
    pub priority: Priority,
}

/// Why a marker payload was discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// Opening brace never closed
    Unbalanced,
    /// Payload is not valid JSON
    Malformed(String),
    /// Required field absent, empty or not a string
    MissingField(&'static str),
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::Unbalanced => write!(f, "unbalanced braces"),
            RejectReason::Malformed(e) => write!(f, "malformed payload: {}", e),
            RejectReason::MissingField(field) => write!(f, "missing field '{}'", field),
        }
    }
}

/// Result of parsing one marker occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedSuggestion {
    /// Well-formed
    Valid(Suggestion),
    /// Discarded
    Rejected {
        /// Raw payload text (possibly truncated at end of input)
        raw: String,
        /// Reason
        reason: RejectReason,
    },
}

/// Scans job output for follow-up-work markers.
#[derive(Debug, Clone)]
pub struct SuggestionExtractor {
    marker: Regex,
}

impl SuggestionExtractor {
    /// Extractor for `marker` (matched case-insensitively).
    pub fn new(marker: &str) -> Result<Self, regex::Error> {
        let boundary = if marker.starts_with(|c: char| c.is_alphanumeric() || c == '_') {
            r"\b"
        } else {
            ""
        };
        let pattern = format!(r"{}{}\s*:\s*\{{", boundary, regex::escape(marker));
        let marker = RegexBuilder::new(&pattern).case_insensitive(true).build()?;
        Ok(Self { marker })
    }

    /// Parse every non-overlapping marker occurrence in `text`.
    pub fn scan(&self, text: &str) -> Vec<ParsedSuggestion> {
        let mut results = Vec::new();
        let mut pos = 0;

        while let Some(m) = self.marker.find_at(text, pos) {
            // The match ends just past the opening brace.
            let open = m.end() - 1;
            match balanced_object_end(text, open) {
                Some(close) => {
                    let raw = &text[open..=close];
                    results.push(parse_payload(raw));
                    pos = close + 1;
                }
                None => {
                    results.push(ParsedSuggestion::Rejected {
                        raw: text[open..].to_string(),
                        reason: RejectReason::Unbalanced,
                    });
                    pos = m.end();
                }
            }
        }

        results
    }

    /// Extract well-formed suggestions from `text` as pending backlog items.
    ///
    /// Rejected payloads are logged and dropped.
    pub fn extract(&self, text: &str, source_job: &str) -> Vec<BacklogItem> {
        self.scan(text)
            .into_iter()
            .filter_map(|parsed| match parsed {
                ParsedSuggestion::Valid(s) => {
                    debug!(job = source_job, suggestion = %s.name, "Extracted follow-up suggestion");
                    Some(BacklogItem::new(s.name, s.description, s.priority, source_job))
                }
                ParsedSuggestion::Rejected { raw, reason } => {
                    warn!(
                        job = source_job,
                        %reason,
                        payload = %truncate(&raw, 120),
                        "Discarding malformed suggestion"
                    );
                    None
                }
            })
            .collect()
    }
}

/// Index of the brace closing the object opened at `open`, honoring JSON strings.
fn balanced_object_end(text: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[open..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + offset);
                }
            }
            _ => {}
        }
    }

    None
}

fn parse_payload(raw: &str) -> ParsedSuggestion {
    let reject = |reason| ParsedSuggestion::Rejected {
        raw: raw.to_string(),
        reason,
    };

    let fields: serde_json::Map<String, JsonValue> = match serde_json::from_str(raw) {
        Ok(fields) => fields,
        Err(e) => return reject(RejectReason::Malformed(e.to_string())),
    };

    let text_field = |key: &str| {
        fields
            .get(key)
            .and_then(JsonValue::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let Some(name) = text_field("name") else {
        return reject(RejectReason::MissingField("name"));
    };
    let Some(description) = text_field("description") else {
        return reject(RejectReason::MissingField("description"));
    };

    let priority = match fields.get("priority") {
        None | Some(JsonValue::Null) => Priority::default(),
        Some(v) => Priority::from_value(v).unwrap_or_else(|| {
            debug!(priority = %v, "Unrecognized priority, using default");
            Priority::default()
        }),
    };

    ParsedSuggestion::Valid(Suggestion {
        name,
        description,
        priority,
    })
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
