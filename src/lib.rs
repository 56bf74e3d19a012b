//! Crane - multi-agent review conversations
//!
//! A panel of reviewer agents critiques an input artifact over one or more
//! iterations. After each iteration a moderator compresses the discussion
//! and a feedback agent rewrites the artifact from that summary.
//!
//! # Architecture
//!
//! - **Core**: Shared types, configuration, and error handling
//! - **LLM**: Provider adapters (OpenAI chat, HuggingFace inference) and the HTTP transport
//! - **Agent**: Model-backed participants with retries, timeouts and an error log
//! - **Storage**: Durable counters, transcripts and the long-term context store
//! - **Orchestration**: Conversation state and the manager that drives it
//! - **CLI**: Run assembly and the terminal human participant
//!
//! # Usage
//!
//! ```rust,no_run
//! use crane::cli::{run_conversation, RunRequest};
//! use crane::Config;
//!
//! #[tokio::main]
//! async fn main() -> crane::Result<()> {
//!     let config = Config::load(None)?;
//!     let request = RunRequest {
//!         task: "Add input validation".into(),
//!         input: "fn parse(s: &str) -> u32 { s.parse().unwrap() }".into(),
//!     };
//!
//!     let report = run_conversation(&config, &request).await?;
//!     println!("{}", report.status_line());
//!     Ok(())
//! }
//! ```

pub mod agent;
pub mod cli;
pub mod core;
pub mod llm;
pub mod orchestration;
pub mod storage;

// Re-export commonly used items
pub use agent::Agent;
pub use core::{Config, CraneError, Message, Result};
pub use orchestration::{Conversation, ConversationManager, ConversationReport, RunOutcome};
