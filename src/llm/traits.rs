//! Provider seams
//!
//! A [`ProviderAdapter`] knows how one provider family shapes requests and
//! wraps responses. A [`Transport`] moves the request over the wire. The
//! agent combines the two and owns retry and timeout policy, so neither
//! seam knows anything about conversations.

use async_trait::async_trait;

use crate::core::{CallError, TokenUsage};

/// Everything an agent sends on one turn
#[derive(Debug, Clone, Default)]
pub struct AgentPrompt {
    /// Model identifier, if the provider needs one in the body
    pub model: Option<String>,
    /// Static system-role context
    pub context: String,
    /// Rolling context injected by the orchestrator (history, summaries)
    pub additional_context: String,
    /// The problem currently under review
    pub input_problem: String,
    /// Instructions for this turn
    pub instructions: String,
    /// Upper bound on generated tokens
    pub max_tokens: u32,
}

impl AgentPrompt {
    /// System-role text: static context followed by rolling context
    pub fn system_text(&self) -> String {
        join_sections(&[&self.context, &self.additional_context])
    }

    /// User-role text: the problem followed by the instructions
    pub fn user_text(&self) -> String {
        join_sections(&[&self.input_problem, &self.instructions])
    }
}

fn join_sections(sections: &[&str]) -> String {
    sections
        .iter()
        .filter(|s| !s.trim().is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// A request ready to be sent
#[derive(Debug, Clone)]
pub struct ProviderRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: serde_json::Value,
}

/// Raw response from a transport
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    pub status: u16,
    pub body: String,
}

impl ProviderResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Text unwrapped from a provider envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedResponse {
    pub text: String,
    pub usage: Option<TokenUsage>,
}

/// Request shaping and response unwrapping for one provider family
pub trait ProviderAdapter: Send + Sync {
    /// Build the outbound request for a prompt
    fn build_request(&self, prompt: &AgentPrompt) -> ProviderRequest;

    /// Unwrap a successful response body into plain text
    fn parse_response(
        &self,
        body: &str,
        prompt: &AgentPrompt,
    ) -> std::result::Result<ParsedResponse, CallError>;

    /// Get the provider name
    fn name(&self) -> &str;
}

/// Sends a request and returns the status and body.
///
/// Implementations report connection failures as [`CallError::Network`] and
/// return every HTTP status, successful or not, as a [`ProviderResponse`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        request: &ProviderRequest,
    ) -> std::result::Result<ProviderResponse, CallError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_sections_skip_empty() {
        let prompt = AgentPrompt {
            context: "You review code.".into(),
            input_problem: "fn main() {}".into(),
            instructions: "Find bugs.".into(),
            ..Default::default()
        };
        assert_eq!(prompt.system_text(), "You review code.");
        assert_eq!(prompt.user_text(), "fn main() {}\n\nFind bugs.");
    }

    #[test]
    fn test_response_success_range() {
        let ok = ProviderResponse {
            status: 200,
            body: String::new(),
        };
        let busy = ProviderResponse {
            status: 503,
            body: String::new(),
        };
        assert!(ok.is_success());
        assert!(!busy.is_success());
    }
}
