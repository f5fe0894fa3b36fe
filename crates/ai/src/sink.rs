//! Directory-backed document sink.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

use crate::{Document, DocumentSink, SinkError};

/// Writes each document to `<root>/<doc_type>/<slug>.<ext>`.
///
/// Saving a document with the same title and type again overwrites the
/// previous file.
pub struct MarkdownSink {
    root: PathBuf,
}

impl MarkdownSink {
    /// Create a sink rooted at `root`.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Where `document` would be written.
    ///
    /// The file is named after the title, or after the job key when the
    /// title has no usable characters.
    pub fn path_for(&self, document: &Document) -> Result<PathBuf, SinkError> {
        let stem = match slugify(&document.title) {
            s if s.is_empty() => slugify(&document.key),
            s => s,
        };
        if stem.is_empty() {
            return Err(SinkError::InvalidTitle(document.title.clone()));
        }

        let dir = match slugify(&document.doc_type) {
            d if d.is_empty() => "document".to_string(),
            d => d,
        };

        Ok(self
            .root
            .join(dir)
            .join(format!("{}.{}", stem, extension_for(&document.format))))
    }
}

#[async_trait]
impl DocumentSink for MarkdownSink {
    async fn save(&self, document: &Document) -> Result<PathBuf, SinkError> {
        let path = self.path_for(document)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| SinkError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        fs::write(&path, document.content.as_bytes())
            .await
            .map_err(|e| SinkError::Io {
                path: path.clone(),
                source: e,
            })?;

        info!(title = %document.title, path = %path.display(), "Saved document");
        Ok(path)
    }
}

fn extension_for(format: &str) -> &str {
    match format.to_lowercase().as_str() {
        "markdown" | "md" => "md",
        "json" => "json",
        "html" => "html",
        "yaml" | "yml" => "yaml",
        _ => "txt",
    }
}

/// Lowercase alphanumerics (any script) separated by single dashes.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_end_matches('-').to_string()
}
