//! LLM module - model provider integrations
//!
//! Provides the adapter and transport seams plus one adapter per provider
//! family.

pub mod http;
pub mod provider;
pub mod traits;

pub use http::HttpTransport;
pub use provider::create_adapter;
pub use traits::{
    AgentPrompt, ParsedResponse, ProviderAdapter, ProviderRequest, ProviderResponse, Transport,
};
