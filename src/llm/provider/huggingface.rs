//! Hugging Face text-generation provider
//!
//! The endpoint echoes the prompt in `generated_text`. The continuation is
//! whatever follows the last `Instructions:` marker, with the instructions
//! themselves stripped out.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use serde_json::json;

use crate::core::{AgentConfig, CallError};
use crate::llm::traits::{AgentPrompt, ParsedResponse, ProviderAdapter, ProviderRequest};

/// Marker placed before the instructions in the single-string prompt.
pub const INSTRUCTIONS_MARKER: &str = "Instructions:";

static CONTINUATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s).*Instructions:(.*)").expect("continuation pattern is valid"));

/// Text-generation adapter
pub struct HuggingFaceAdapter {
    endpoint: String,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Generation {
    generated_text: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GenerationResponse {
    Batch(Vec<Generation>),
    Single(Generation),
}

impl HuggingFaceAdapter {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key,
        }
    }

    pub fn from_config(config: &AgentConfig) -> Self {
        Self::new(config.endpoint.clone(), config.api_key())
    }

    /// Flatten the prompt into the single string the endpoint expects
    fn render_prompt(prompt: &AgentPrompt) -> String {
        let mut text = prompt.system_text();
        if !prompt.input_problem.trim().is_empty() {
            if !text.is_empty() {
                text.push_str("\n\n");
            }
            text.push_str(&prompt.input_problem);
        }
        if !text.is_empty() {
            text.push_str("\n\n");
        }
        text.push_str(INSTRUCTIONS_MARKER);
        text.push(' ');
        text.push_str(&prompt.instructions);
        text
    }

    /// Pull the continuation out of an echoed completion
    fn extract_continuation(generated: &str, instructions: &str) -> String {
        let tail = CONTINUATION_RE
            .captures(generated)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
            .unwrap_or(generated);

        let stripped = if instructions.is_empty() {
            tail.to_string()
        } else {
            tail.replacen(instructions, "", 1)
        };
        stripped.trim().to_string()
    }
}

impl ProviderAdapter for HuggingFaceAdapter {
    fn build_request(&self, prompt: &AgentPrompt) -> ProviderRequest {
        let mut headers = vec![("Content-Type".to_string(), "application/json".to_string())];
        if let Some(ref key) = self.api_key {
            headers.push(("Authorization".to_string(), format!("Bearer {}", key)));
        }

        ProviderRequest {
            url: self.endpoint.clone(),
            headers,
            body: json!({
                "inputs": Self::render_prompt(prompt),
                "parameters": { "max_new_tokens": prompt.max_tokens },
            }),
        }
    }

    fn parse_response(&self, body: &str, prompt: &AgentPrompt) -> Result<ParsedResponse, CallError> {
        let response: GenerationResponse = serde_json::from_str(body)
            .map_err(|e| CallError::InvalidResponse(format!("text generation: {}", e)))?;

        let generated = match response {
            GenerationResponse::Batch(items) => items
                .into_iter()
                .next()
                .map(|g| g.generated_text)
                .ok_or_else(|| CallError::InvalidResponse("empty generation list".to_string()))?,
            GenerationResponse::Single(g) => g.generated_text,
        };

        Ok(ParsedResponse {
            text: Self::extract_continuation(&generated, &prompt.instructions),
            usage: None,
        })
    }

    fn name(&self) -> &str {
        "huggingface"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prompt() -> AgentPrompt {
        AgentPrompt {
            context: "You review Android telephony code.".into(),
            input_problem: "CR: fix SMS".into(),
            instructions: "List the defects.".into(),
            max_tokens: 128,
            ..Default::default()
        }
    }

    #[test]
    fn test_prompt_ends_with_instructions() {
        let adapter = HuggingFaceAdapter::new("https://example.com/models/x", None);
        let request = adapter.build_request(&prompt());
        let inputs = request.body["inputs"].as_str().unwrap();
        assert!(inputs.starts_with("You review Android telephony code."));
        assert!(inputs.ends_with("Instructions: List the defects."));
        assert_eq!(request.body["parameters"]["max_new_tokens"], 128);
        assert!(request.headers.iter().all(|(k, _)| k != "Authorization"));
    }

    #[test]
    fn test_extracts_continuation_from_batch() {
        let adapter = HuggingFaceAdapter::new("https://example.com/models/x", None);
        let body = serde_json::json!([{
            "generated_text": "You review Android telephony code.\n\nCR: fix SMS\n\nInstructions: List the defects. The null check on sentIntent is missing."
        }])
        .to_string();
        let parsed = adapter.parse_response(&body, &prompt()).unwrap();
        assert_eq!(parsed.text, "The null check on sentIntent is missing.");
        assert!(parsed.usage.is_none());
    }

    #[test]
    fn test_uses_last_marker() {
        let text = HuggingFaceAdapter::extract_continuation(
            "Instructions: old\nInstructions: List the defects. none",
            "List the defects.",
        );
        assert_eq!(text, "none");
    }

    #[test]
    fn test_single_object_response() {
        let adapter = HuggingFaceAdapter::new("https://example.com/models/x", None);
        let body = r#"{"generated_text": "Instructions: List the defects. ok"}"#;
        assert_eq!(adapter.parse_response(body, &prompt()).unwrap().text, "ok");
    }

    #[test]
    fn test_error_payload_is_invalid() {
        let adapter = HuggingFaceAdapter::new("https://example.com/models/x", None);
        let err = adapter
            .parse_response(r#"{"error": "model loading"}"#, &prompt())
            .unwrap_err();
        assert!(matches!(err, CallError::InvalidResponse(_)));
    }
}
