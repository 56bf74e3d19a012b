//! Durable conversation / iteration counters
//!
//! A single small record, read and overwritten whole. Last writer wins;
//! only one manager is expected to drive a store at a time.

use serde::{Deserialize, Deserializer, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::core::{CraneError, Result};
use crate::storage::write_atomic;

/// File name of the counter record inside the base directory
pub const COUNTERS_FILE: &str = "conversation_id.json";

/// The persisted ids
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    #[serde(default, deserialize_with = "id_from_number_or_string")]
    pub conversation_id: u64,
    #[serde(default, deserialize_with = "id_from_number_or_string")]
    pub iteration_id: u64,
}

/// Older records stored ids as strings ("3")
fn id_from_number_or_string<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) if s.trim().is_empty() => Ok(0),
        Raw::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// Read/overwrite access to the counter record
pub trait CounterStore: Send + Sync {
    /// Current values; a store that was never written reads as zeros
    fn read(&self) -> Result<Counters>;

    /// Overwrite both values
    fn write(&self, counters: &Counters) -> Result<()>;
}

/// Counter record kept as JSON on disk
#[derive(Debug, Clone)]
pub struct FileCounterStore {
    path: PathBuf,
}

impl FileCounterStore {
    /// Store the record at `<base>/conversation_id.json`
    pub fn in_dir(base: impl AsRef<Path>) -> Self {
        Self {
            path: base.as_ref().join(COUNTERS_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CounterStore for FileCounterStore {
    fn read(&self) -> Result<Counters> {
        if !self.path.exists() {
            return Ok(Counters::default());
        }
        let content = fs::read_to_string(&self.path).map_err(|e| {
            CraneError::storage(format!("Failed to read {}: {}", self.path.display(), e))
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    fn write(&self, counters: &Counters) -> Result<()> {
        let content = serde_json::to_string_pretty(counters)?;
        write_atomic(&self.path, content.as_bytes())
    }
}

/// In-process counter record
#[derive(Debug, Default)]
pub struct MemoryCounterStore {
    inner: Mutex<Counters>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_counters(counters: Counters) -> Self {
        Self {
            inner: Mutex::new(counters),
        }
    }
}

impl CounterStore for MemoryCounterStore {
    fn read(&self) -> Result<Counters> {
        self.inner
            .lock()
            .map(|c| *c)
            .map_err(|_| CraneError::storage("counter lock poisoned"))
    }

    fn write(&self, counters: &Counters) -> Result<()> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| CraneError::storage("counter lock poisoned"))?;
        *guard = *counters;
        Ok(())
    }
}
