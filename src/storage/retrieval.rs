//! Long-term context store
//!
//! Holds one compressed summary per (conversation, iteration). Reads return
//! a conversation's summaries oldest iteration first, whatever order the
//! backing store keeps them in.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

use crate::core::{CraneError, Result};

/// File name of the file-backed store inside the base directory
pub const RETRIEVAL_FILE: &str = "retrieval.json";

/// Summary persistence across iterations
#[async_trait]
pub trait RetrievalStore: Send + Sync {
    /// Upsert the summary of one iteration
    async fn save(&self, conversation_id: u64, iteration_id: u64, summary: &str) -> Result<()>;

    /// Every summary of a conversation in iteration order
    async fn retrieve_all(&self, conversation_id: u64) -> Result<Vec<String>>;
}

/// One stored summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalEntry {
    /// `"<conversation>-<iteration>"`
    pub id: String,
    pub conversation_id: u64,
    pub iteration: u64,
    pub history: String,
}

impl RetrievalEntry {
    pub fn new(conversation_id: u64, iteration: u64, history: impl Into<String>) -> Self {
        Self {
            id: format!("{}-{}", conversation_id, iteration),
            conversation_id,
            iteration,
            history: history.into(),
        }
    }
}

/// In-process store
#[derive(Debug, Default)]
pub struct MemoryRetrievalStore {
    entries: Mutex<BTreeMap<(u64, u64), String>>,
}

impl MemoryRetrievalStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<(u64, u64), String>>> {
        self.entries
            .lock()
            .map_err(|_| CraneError::storage("retrieval lock poisoned"))
    }
}

#[async_trait]
impl RetrievalStore for MemoryRetrievalStore {
    async fn save(&self, conversation_id: u64, iteration_id: u64, summary: &str) -> Result<()> {
        self.lock()?
            .insert((conversation_id, iteration_id), summary.to_string());
        Ok(())
    }

    async fn retrieve_all(&self, conversation_id: u64) -> Result<Vec<String>> {
        Ok(self
            .lock()?
            .range((conversation_id, 0)..=(conversation_id, u64::MAX))
            .map(|(_, summary)| summary.clone())
            .collect())
    }
}

/// Store kept as a JSON array on disk
#[derive(Debug, Clone)]
pub struct FileRetrievalStore {
    path: PathBuf,
}

impl FileRetrievalStore {
    /// Store the entries at `<base>/retrieval.json`
    pub fn in_dir(base: impl AsRef<Path>) -> Self {
        Self {
            path: base.as_ref().join(RETRIEVAL_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_entries(&self) -> Result<Vec<RetrievalEntry>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(CraneError::storage(format!(
                "Failed to read {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    async fn write_entries(&self, entries: &[RetrievalEntry]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(entries)?;
        tokio::fs::write(&self.path, content).await?;
        Ok(())
    }
}

#[async_trait]
impl RetrievalStore for FileRetrievalStore {
    async fn save(&self, conversation_id: u64, iteration_id: u64, summary: &str) -> Result<()> {
        let mut entries = self.read_entries().await?;
        let entry = RetrievalEntry::new(conversation_id, iteration_id, summary);

        match entries.iter_mut().find(|e| e.id == entry.id) {
            Some(existing) => *existing = entry,
            None => entries.push(entry),
        }

        debug!(conversation_id, iteration_id, "saving summary to retrieval store");
        self.write_entries(&entries).await
    }

    async fn retrieve_all(&self, conversation_id: u64) -> Result<Vec<String>> {
        let mut entries: Vec<RetrievalEntry> = self
            .read_entries()
            .await?
            .into_iter()
            .filter(|e| e.conversation_id == conversation_id)
            .collect();
        entries.sort_by_key(|e| e.iteration);
        Ok(entries.into_iter().map(|e| e.history).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_order_and_isolation() {
        let store = MemoryRetrievalStore::new();
        store.save(1, 2, "third").await.unwrap();
        store.save(1, 0, "first").await.unwrap();
        store.save(2, 0, "other conversation").await.unwrap();
        store.save(1, 1, "second").await.unwrap();

        assert_eq!(
            store.retrieve_all(1).await.unwrap(),
            vec!["first", "second", "third"]
        );
        assert_eq!(store.retrieve_all(3).await.unwrap(), Vec::<String>::new());
    }

    #[tokio::test]
    async fn test_file_store_sorts_and_upserts() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileRetrievalStore::in_dir(dir.path());

        store.save(0, 1, "later").await.unwrap();
        store.save(0, 0, "earlier").await.unwrap();
        store.save(0, 1, "later, revised").await.unwrap();

        assert_eq!(
            store.retrieve_all(0).await.unwrap(),
            vec!["earlier", "later, revised"]
        );
    }

    #[test]
    fn test_entry_id() {
        assert_eq!(RetrievalEntry::new(4, 2, "x").id, "4-2");
    }
}
