//! Agent module - model-backed conversation participants
//!
//! Contains the agent wrapper around one provider endpoint and the error
//! log agents report failures through.

pub mod error_log;
pub mod participant;

pub use error_log::ErrorLog;
pub use participant::Agent;
