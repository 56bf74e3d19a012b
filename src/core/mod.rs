//! Core module - shared infrastructure for Crane
//!
//! This module contains foundational types, configuration, and error handling
//! used throughout the crate.

pub mod config;
pub mod error;
pub mod types;

pub use config::{AgentConfig, Config, ProviderType, RunConfig, StorageConfig};
pub use error::{CallError, CraneError, Result};
pub use types::*;
