//! OpenAI-compatible chat-completion provider

use serde::Deserialize;
use serde_json::json;

use crate::core::{AgentConfig, CallError, TokenUsage};
use crate::llm::traits::{AgentPrompt, ParsedResponse, ProviderAdapter, ProviderRequest};

/// Chat-completion adapter
pub struct OpenAIAdapter {
    endpoint: String,
    api_key: Option<String>,
}

/// Message in a chat-completion response
#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Chat-completion response
#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

impl OpenAIAdapter {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key,
        }
    }

    pub fn from_config(config: &AgentConfig) -> Self {
        Self::new(config.endpoint.clone(), config.api_key())
    }
}

impl ProviderAdapter for OpenAIAdapter {
    fn build_request(&self, prompt: &AgentPrompt) -> ProviderRequest {
        let mut body = json!({
            "messages": [
                { "role": "system", "content": prompt.system_text() },
                { "role": "user", "content": prompt.user_text() },
            ],
            "max_tokens": prompt.max_tokens,
        });
        if let Some(ref model) = prompt.model {
            body["model"] = json!(model);
        }

        let mut headers = vec![("Content-Type".to_string(), "application/json".to_string())];
        if let Some(ref key) = self.api_key {
            headers.push(("Authorization".to_string(), format!("Bearer {}", key)));
        }

        ProviderRequest {
            url: self.endpoint.clone(),
            headers,
            body,
        }
    }

    fn parse_response(
        &self,
        body: &str,
        _prompt: &AgentPrompt,
    ) -> Result<ParsedResponse, CallError> {
        let response: ChatResponse = serde_json::from_str(body)
            .map_err(|e| CallError::InvalidResponse(format!("chat completion: {}", e)))?;

        let text = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| CallError::InvalidResponse("no choices in response".to_string()))?;

        let usage = response.usage.map(|u| TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        });

        Ok(ParsedResponse { text, usage })
    }

    fn name(&self) -> &str {
        "openai"
    }
}
