//! Storage module - durable state behind small traits
//!
//! Counters, transcripts and long-term summaries each sit behind a trait
//! with a file-backed and an in-memory implementation.

pub mod counters;
pub mod retrieval;
pub mod transcripts;

use std::fs;
use std::path::Path;

use crate::core::{CraneError, Result};

pub use counters::{CounterStore, Counters, FileCounterStore, MemoryCounterStore};
pub use retrieval::{FileRetrievalStore, MemoryRetrievalStore, RetrievalEntry, RetrievalStore};
pub use transcripts::{
    FileTranscriptStore, MemoryTranscriptStore, ResponseRecord, TranscriptRecord, TranscriptStore,
};

/// Write through a sibling temp file and rename over the target
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| {
                CraneError::storage(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }
    }

    let tmp = path.with_extension("tmp");
    fs::write(&tmp, contents)
        .map_err(|e| CraneError::storage(format!("Failed to write {}: {}", tmp.display(), e)))?;
    fs::rename(&tmp, path)
        .map_err(|e| CraneError::storage(format!("Failed to write {}: {}", path.display(), e)))?;
    Ok(())
}
