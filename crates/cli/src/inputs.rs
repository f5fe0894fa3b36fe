//! Input requirement documents.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, info};

/// Load every `*.md` file in `dir`, sorted by file name, as `## NAME`
/// sections joined by blank lines.
pub async fn load_inputs(dir: &Path) -> Result<String> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("cannot read input directory {}", dir.display()))?;

    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "md") && entry.file_type().await?.is_file() {
            files.push(path);
        }
    }
    files.sort();

    let mut sections = Vec::with_capacity(files.len());
    for path in &files {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("cannot read {}", path.display()))?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_uppercase())
            .unwrap_or_default();
        debug!(file = %path.display(), chars = content.len(), "Loaded input document");
        sections.push(format!("## {}\n{}", name, content));
    }

    info!(dir = %dir.display(), documents = files.len(), "Loaded input documents");
    Ok(sections.join("\n\n"))
}
