//! Transcript persistence
//!
//! One record per (conversation, iteration) for reviewer responses, one per
//! named non-reviewer response (`summary`, `change_<label>`) and a free-text
//! error log.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::core::{CraneError, Message, Result};
use crate::storage::write_atomic;

const RESPONSES_FILE: &str = "responses.json";
const ERRORS_FILE: &str = "errors.txt";

/// Reviewer transcript of one iteration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptRecord {
    pub conversation_id: u64,
    pub iteration_id: u64,
    pub responses: Vec<Message>,
}

/// A moderator or feedback response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseRecord {
    pub conversation_id: u64,
    pub iteration_id: u64,
    pub response: Vec<Message>,
}

/// Durable transcript storage
pub trait TranscriptStore: Send + Sync {
    /// Create the conversation location if absent
    fn ensure_conversation(&self, conversation_id: u64) -> Result<()>;

    /// Create the iteration location if absent
    fn ensure_iteration(&self, conversation_id: u64, iteration_id: u64) -> Result<()>;

    fn has_conversation(&self, conversation_id: u64) -> bool;

    fn has_iteration(&self, conversation_id: u64, iteration_id: u64) -> bool;

    /// Overwrite the reviewer transcript of an iteration
    fn save_responses(&self, record: &TranscriptRecord) -> Result<()>;

    fn load_responses(
        &self,
        conversation_id: u64,
        iteration_id: u64,
    ) -> Result<Option<TranscriptRecord>>;

    /// Overwrite a named non-reviewer response of an iteration
    fn save_agent_response(&self, name: &str, record: &ResponseRecord) -> Result<()>;

    fn load_agent_response(
        &self,
        conversation_id: u64,
        iteration_id: u64,
        name: &str,
    ) -> Result<Option<ResponseRecord>>;

    /// Overwrite the error log of an iteration
    fn save_errors(&self, conversation_id: u64, iteration_id: u64, text: &str) -> Result<()>;

    fn load_errors(&self, conversation_id: u64, iteration_id: u64) -> Result<Option<String>>;
}

/// Directory tree under a base path:
/// `conversation_<c>/iteration_<i>/{responses.json, <name>.json, errors.txt}`
#[derive(Debug, Clone)]
pub struct FileTranscriptStore {
    base: PathBuf,
}

impl FileTranscriptStore {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn conversation_dir(&self, conversation_id: u64) -> PathBuf {
        self.base.join(format!("conversation_{}", conversation_id))
    }

    pub fn iteration_dir(&self, conversation_id: u64, iteration_id: u64) -> PathBuf {
        self.conversation_dir(conversation_id)
            .join(format!("iteration_{}", iteration_id))
    }

    fn create_dir(path: &Path) -> Result<()> {
        if !path.exists() {
            fs::create_dir_all(path).map_err(|e| {
                CraneError::storage(format!("Failed to create {}: {}", path.display(), e))
            })?;
        }
        Ok(())
    }

    fn read_optional(path: &Path) -> Result<Option<String>> {
        if !path.exists() {
            return Ok(None);
        }
        fs::read_to_string(path)
            .map(Some)
            .map_err(|e| CraneError::storage(format!("Failed to read {}: {}", path.display(), e)))
    }
}

impl TranscriptStore for FileTranscriptStore {
    fn ensure_conversation(&self, conversation_id: u64) -> Result<()> {
        Self::create_dir(&self.conversation_dir(conversation_id))
    }

    fn ensure_iteration(&self, conversation_id: u64, iteration_id: u64) -> Result<()> {
        Self::create_dir(&self.iteration_dir(conversation_id, iteration_id))
    }

    fn has_conversation(&self, conversation_id: u64) -> bool {
        self.conversation_dir(conversation_id).is_dir()
    }

    fn has_iteration(&self, conversation_id: u64, iteration_id: u64) -> bool {
        self.iteration_dir(conversation_id, iteration_id).is_dir()
    }

    fn save_responses(&self, record: &TranscriptRecord) -> Result<()> {
        let path = self
            .iteration_dir(record.conversation_id, record.iteration_id)
            .join(RESPONSES_FILE);
        write_atomic(&path, serde_json::to_string_pretty(record)?.as_bytes())
    }

    fn load_responses(
        &self,
        conversation_id: u64,
        iteration_id: u64,
    ) -> Result<Option<TranscriptRecord>> {
        let path = self
            .iteration_dir(conversation_id, iteration_id)
            .join(RESPONSES_FILE);
        match Self::read_optional(&path)? {
            Some(content) => Ok(Some(serde_json::from_str(&content)?)),
            None => Ok(None),
        }
    }

    fn save_agent_response(&self, name: &str, record: &ResponseRecord) -> Result<()> {
        let path = self
            .iteration_dir(record.conversation_id, record.iteration_id)
            .join(format!("{}.json", name));
        write_atomic(&path, serde_json::to_string_pretty(record)?.as_bytes())
    }

    fn load_agent_response(
        &self,
        conversation_id: u64,
        iteration_id: u64,
        name: &str,
    ) -> Result<Option<ResponseRecord>> {
        let path = self
            .iteration_dir(conversation_id, iteration_id)
            .join(format!("{}.json", name));
        match Self::read_optional(&path)? {
            Some(content) => Ok(Some(serde_json::from_str(&content)?)),
            None => Ok(None),
        }
    }

    fn save_errors(&self, conversation_id: u64, iteration_id: u64, text: &str) -> Result<()> {
        let path = self
            .iteration_dir(conversation_id, iteration_id)
            .join(ERRORS_FILE);
        write_atomic(&path, text.as_bytes())
    }

    fn load_errors(&self, conversation_id: u64, iteration_id: u64) -> Result<Option<String>> {
        Self::read_optional(
            &self
                .iteration_dir(conversation_id, iteration_id)
                .join(ERRORS_FILE),
        )
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    conversations: BTreeSet<u64>,
    iterations: BTreeSet<(u64, u64)>,
    responses: HashMap<(u64, u64), TranscriptRecord>,
    agent_responses: HashMap<(u64, u64, String), ResponseRecord>,
    errors: HashMap<(u64, u64), String>,
}

/// In-process transcript store
#[derive(Debug, Default)]
pub struct MemoryTranscriptStore {
    state: Mutex<MemoryState>,
}

impl MemoryTranscriptStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut MemoryState) -> T) -> Result<T> {
        let mut guard = self
            .state
            .lock()
            .map_err(|_| CraneError::storage("transcript lock poisoned"))?;
        Ok(f(&mut guard))
    }
}

impl TranscriptStore for MemoryTranscriptStore {
    fn ensure_conversation(&self, conversation_id: u64) -> Result<()> {
        self.with_state(|s| {
            s.conversations.insert(conversation_id);
        })
    }

    fn ensure_iteration(&self, conversation_id: u64, iteration_id: u64) -> Result<()> {
        self.with_state(|s| {
            s.conversations.insert(conversation_id);
            s.iterations.insert((conversation_id, iteration_id));
        })
    }

    fn has_conversation(&self, conversation_id: u64) -> bool {
        self.with_state(|s| s.conversations.contains(&conversation_id))
            .unwrap_or(false)
    }

    fn has_iteration(&self, conversation_id: u64, iteration_id: u64) -> bool {
        self.with_state(|s| s.iterations.contains(&(conversation_id, iteration_id)))
            .unwrap_or(false)
    }

    fn save_responses(&self, record: &TranscriptRecord) -> Result<()> {
        self.with_state(|s| {
            s.responses
                .insert((record.conversation_id, record.iteration_id), record.clone());
        })
    }

    fn load_responses(
        &self,
        conversation_id: u64,
        iteration_id: u64,
    ) -> Result<Option<TranscriptRecord>> {
        self.with_state(|s| s.responses.get(&(conversation_id, iteration_id)).cloned())
    }

    fn save_agent_response(&self, name: &str, record: &ResponseRecord) -> Result<()> {
        self.with_state(|s| {
            s.agent_responses.insert(
                (record.conversation_id, record.iteration_id, name.to_string()),
                record.clone(),
            );
        })
    }

    fn load_agent_response(
        &self,
        conversation_id: u64,
        iteration_id: u64,
        name: &str,
    ) -> Result<Option<ResponseRecord>> {
        self.with_state(|s| {
            s.agent_responses
                .get(&(conversation_id, iteration_id, name.to_string()))
                .cloned()
        })
    }

    fn save_errors(&self, conversation_id: u64, iteration_id: u64, text: &str) -> Result<()> {
        self.with_state(|s| {
            s.errors
                .insert((conversation_id, iteration_id), text.to_string());
        })
    }

    fn load_errors(&self, conversation_id: u64, iteration_id: u64) -> Result<Option<String>> {
        self.with_state(|s| s.errors.get(&(conversation_id, iteration_id)).cloned())
    }
}
