//! JSON file store implementations.
//!
//! Each store keeps its full contents in memory and rewrites a single JSON
//! snapshot file after every mutation. Writes go to a sibling temp file that
//! is then renamed over the target, so a failed write leaves the previous
//! snapshot intact. A missing file reads as an empty store.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use quill_core::{BacklogId, BacklogItem, BacklogStatus, Time};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::{BacklogStore, LedgerStore, Result, StorageError};

const SNAPSHOT_VERSION: u32 = 1;

/// File locations inside a state directory.
#[derive(Debug, Clone)]
pub struct StatePaths {
    root: PathBuf,
}

impl StatePaths {
    /// Use `root` as the state directory.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// State directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Ledger snapshot.
    pub fn ledger(&self) -> PathBuf {
        self.root.join("ledger.json")
    }

    /// Backlog snapshot.
    pub fn backlog(&self) -> PathBuf {
        self.root.join("backlog.json")
    }

    /// Summary of the most recent run.
    pub fn last_run(&self) -> PathBuf {
        self.root.join("last-run.json")
    }
}

/// Persisted ledger (ledger.json)
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LedgerSnapshot {
    version: u32,
    updated_at: Time,
    completed: Vec<String>,
}

/// Accepted ledger file shapes: the versioned snapshot, or a bare list of keys.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LedgerFile {
    Snapshot(LedgerSnapshot),
    Keys(Vec<String>),
}

impl LedgerFile {
    fn into_keys(self) -> Vec<String> {
        match self {
            LedgerFile::Snapshot(snapshot) => snapshot.completed,
            LedgerFile::Keys(keys) => keys,
        }
    }
}

/// Persisted backlog (backlog.json)
#[derive(Debug, Clone, Serialize, Deserialize)]
struct BacklogSnapshot {
    version: u32,
    updated_at: Time,
    items: Vec<BacklogItem>,
}

/// File-backed ledger.
pub struct JsonLedger {
    path: PathBuf,
    order: Vec<String>,
    index: HashSet<String>,
}

impl JsonLedger {
    /// Open the ledger at `path`. A missing file is an empty ledger.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let order = read_json::<LedgerFile>(&path)
            .await?
            .map(LedgerFile::into_keys)
            .unwrap_or_default();

        let mut index = HashSet::with_capacity(order.len());
        let order: Vec<String> = order.into_iter().filter(|k| index.insert(k.clone())).collect();
        debug!(path = %path.display(), entries = order.len(), "Opened ledger");

        Ok(Self { path, order, index })
    }

    /// Number of completed keys.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether nothing has completed yet.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    async fn persist(&self) -> Result<()> {
        let snapshot = LedgerSnapshot {
            version: SNAPSHOT_VERSION,
            updated_at: chrono::Utc::now(),
            completed: self.order.clone(),
        };
        write_json_atomic(&self.path, &snapshot).await
    }
}

#[async_trait]
impl LedgerStore for JsonLedger {
    async fn is_completed(&self, key: &str) -> Result<bool> {
        Ok(self.index.contains(key))
    }

    async fn mark_completed(&mut self, key: &str) -> Result<()> {
        if self.index.contains(key) {
            return Ok(());
        }

        self.order.push(key.to_string());
        self.index.insert(key.to_string());

        if let Err(e) = self.persist().await {
            // Keep memory in step with the file that is still on disk.
            self.order.pop();
            self.index.remove(key);
            return Err(e);
        }

        debug!(key, "Recorded completion in ledger");
        Ok(())
    }

    async fn completed(&self) -> Result<Vec<String>> {
        Ok(self.order.clone())
    }

    async fn clear(&mut self) -> Result<()> {
        let previous = std::mem::take(&mut self.order);
        let previous_index = std::mem::take(&mut self.index);

        if let Err(e) = self.persist().await {
            self.order = previous;
            self.index = previous_index;
            return Err(e);
        }
        Ok(())
    }
}

/// File-backed backlog.
pub struct JsonBacklog {
    path: PathBuf,
    items: Vec<BacklogItem>,
}

impl JsonBacklog {
    /// Open the backlog at `path`. A missing file is an empty backlog.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let items = match read_json::<BacklogSnapshot>(&path).await? {
            Some(snapshot) => snapshot.items,
            None => Vec::new(),
        };
        debug!(path = %path.display(), items = items.len(), "Opened backlog");

        Ok(Self { path, items })
    }

    /// Items still awaiting execution, in insertion order.
    pub fn pending(&self) -> impl Iterator<Item = &BacklogItem> {
        self.items.iter().filter(|item| item.is_pending())
    }

    async fn persist(&self) -> Result<()> {
        let snapshot = BacklogSnapshot {
            version: SNAPSHOT_VERSION,
            updated_at: chrono::Utc::now(),
            items: self.items.clone(),
        };
        write_json_atomic(&self.path, &snapshot).await
    }
}

#[async_trait]
impl BacklogStore for JsonBacklog {
    async fn list(&self) -> Result<Vec<BacklogItem>> {
        Ok(self.items.clone())
    }

    async fn append(&mut self, mut item: BacklogItem) -> Result<BacklogId> {
        item.id = BacklogId::new();
        let id = item.id;
        self.items.push(item);

        if let Err(e) = self.persist().await {
            self.items.pop();
            return Err(e);
        }

        debug!(%id, "Appended backlog item");
        Ok(id)
    }

    async fn mark_completed(&mut self, id: BacklogId) -> Result<()> {
        let Some(pos) = self.items.iter().position(|item| item.id == id) else {
            return Err(StorageError::NotFound(format!("backlog item {}", id)));
        };

        if self.items[pos].status == BacklogStatus::Completed {
            return Ok(());
        }

        self.items[pos].status = BacklogStatus::Completed;
        if let Err(e) = self.persist().await {
            self.items[pos].status = BacklogStatus::Pending;
            return Err(e);
        }
        Ok(())
    }

    async fn clear(&mut self) -> Result<()> {
        let previous = std::mem::take(&mut self.items);
        if let Err(e) = self.persist().await {
            self.items = previous;
            return Err(e);
        }
        Ok(())
    }
}

/// Serialize `value` as pretty JSON and atomically replace `path` with it.
pub async fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| StorageError::io(parent, e))?;
    }

    let tmp_path = tmp_path_for(path);
    let mut file = fs::File::create(&tmp_path)
        .await
        .map_err(|e| StorageError::io(&tmp_path, e))?;
    file.write_all(json.as_bytes())
        .await
        .map_err(|e| StorageError::io(&tmp_path, e))?;
    file.sync_all()
        .await
        .map_err(|e| StorageError::io(&tmp_path, e))?;
    drop(file);

    fs::rename(&tmp_path, path)
        .await
        .map_err(|e| StorageError::io(path, e))?;
    sync_parent_dir(path).await
}

/// Flush the directory entry so the rename itself survives a crash.
#[cfg(unix)]
async fn sync_parent_dir(path: &Path) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let handle = fs::File::open(dir)
        .await
        .map_err(|e| StorageError::io(dir, e))?;
    handle
        .sync_all()
        .await
        .map_err(|e| StorageError::io(dir, e))
}

#[cfg(not(unix))]
async fn sync_parent_dir(_path: &Path) -> Result<()> {
    Ok(())
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match fs::read_to_string(path).await {
        Ok(json) => {
            let value = serde_json::from_str(&json)?;
            Ok(Some(value))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StorageError::io(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_core::Priority;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_ledger_is_empty() {
        let dir = TempDir::new().unwrap();
        let ledger = JsonLedger::open(dir.path().join("ledger.json")).await.unwrap();

        assert!(ledger.is_empty());
        assert!(!ledger.is_completed("A").await.unwrap());
    }

    #[tokio::test]
    async fn test_ledger_reads_bare_key_list() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.json");
        std::fs::write(&path, r#"["A", "B", "A"]"#).unwrap();

        let mut ledger = JsonLedger::open(&path).await.unwrap();
        assert_eq!(ledger.completed().await.unwrap(), vec!["A", "B"]);
        assert!(ledger.is_completed("B").await.unwrap());

        ledger.mark_completed("C").await.unwrap();
        let raw: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["completed"], serde_json::json!(["A", "B", "C"]));
    }

    #[tokio::test]
    async fn test_ledger_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.json");

        let mut ledger = JsonLedger::open(&path).await.unwrap();
        ledger.mark_completed("A").await.unwrap();
        ledger.mark_completed("C").await.unwrap();
        drop(ledger);

        let ledger = JsonLedger::open(&path).await.unwrap();
        assert!(ledger.is_completed("A").await.unwrap());
        assert!(!ledger.is_completed("B").await.unwrap());
        assert_eq!(ledger.completed().await.unwrap(), vec!["A", "C"]);
    }

    #[tokio::test]
    async fn test_mark_completed_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let mut ledger = JsonLedger::open(dir.path().join("ledger.json")).await.unwrap();

        ledger.mark_completed("A").await.unwrap();
        ledger.mark_completed("A").await.unwrap();

        assert_eq!(ledger.len(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_ledger_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.json");
        std::fs::write(&path, "{ not json").unwrap();

        let result = JsonLedger::open(&path).await;
        assert!(matches!(result, Err(StorageError::Json(_))));
    }

    #[tokio::test]
    async fn test_failed_write_keeps_previous_snapshot() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.json");

        let mut ledger = JsonLedger::open(&path).await.unwrap();
        ledger.mark_completed("A").await.unwrap();

        // A directory squatting on the temp path makes the next write fail.
        std::fs::create_dir(tmp_path_for(&path)).unwrap();
        assert!(ledger.mark_completed("B").await.is_err());
        assert!(!ledger.is_completed("B").await.unwrap());

        let reopened = JsonLedger::open(&path).await.unwrap();
        assert_eq!(reopened.completed().await.unwrap(), vec!["A"]);
    }

    #[tokio::test]
    async fn test_clear_ledger() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.json");

        let mut ledger = JsonLedger::open(&path).await.unwrap();
        ledger.mark_completed("A").await.unwrap();
        ledger.clear().await.unwrap();

        let reopened = JsonLedger::open(&path).await.unwrap();
        assert!(reopened.is_empty());
    }

    #[tokio::test]
    async fn test_backlog_append_preserves_duplicates() {
        let dir = TempDir::new().unwrap();
        let mut backlog = JsonBacklog::open(dir.path().join("backlog.json")).await.unwrap();

        let item = BacklogItem::new("X", "follow-up", Priority::Medium, "A");
        let first = backlog.append(item.clone()).await.unwrap();
        let second = backlog.append(item).await.unwrap();

        assert_ne!(first, second);
        let items = backlog.list().await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id, first);
        assert_eq!(items[1].id, second);
        assert_eq!(items[0].name, items[1].name);
    }

    #[tokio::test]
    async fn test_backlog_mark_completed_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("backlog.json");

        let mut backlog = JsonBacklog::open(&path).await.unwrap();
        let id = backlog
            .append(BacklogItem::new("X", "follow-up", Priority::High, "A"))
            .await
            .unwrap();
        backlog
            .append(BacklogItem::new("Y", "another", Priority::Low, "A"))
            .await
            .unwrap();
        backlog.mark_completed(id).await.unwrap();
        backlog.mark_completed(id).await.unwrap();
        drop(backlog);

        let backlog = JsonBacklog::open(&path).await.unwrap();
        let items = backlog.list().await.unwrap();
        assert_eq!(items[0].status, BacklogStatus::Completed);
        assert_eq!(items[1].status, BacklogStatus::Pending);
        assert_eq!(backlog.pending().count(), 1);
    }

    #[tokio::test]
    async fn test_backlog_mark_unknown_id() {
        let dir = TempDir::new().unwrap();
        let mut backlog = JsonBacklog::open(dir.path().join("backlog.json")).await.unwrap();

        let result = backlog.mark_completed(BacklogId::new()).await;
        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_write_json_atomic_creates_parent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("last-run.json");

        write_json_atomic(&path, &serde_json::json!({"ok": true})).await.unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"ok\": true"));
        assert!(!tmp_path_for(&path).exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_sync_parent_dir() {
        let dir = TempDir::new().unwrap();
        sync_parent_dir(&dir.path().join("ledger.json")).await.unwrap();

        let result = sync_parent_dir(&dir.path().join("missing").join("ledger.json")).await;
        assert!(matches!(result, Err(StorageError::Io { .. })));
    }
}
