//! Shared types used across Crane modules
//!
//! Contains the message record exchanged between agents, agent roles and
//! token accounting.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::error::CraneError;

/// Marker an agent writes to address a previous speaker.
pub const RESPONSE_MARKER: &str = "in response to: ";

/// Content every reviewer emits when it considers the work finished.
pub const STOP_SENTINEL: &str = "Another round is not needed.";

/// Sender label for retrieved long-term context merged into history.
pub const RAG_SENDER: &str = "RAG";

static RESPONSE_MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)in response to: ([\w\-]+)\s*").expect("marker pattern is valid")
});

/// One agent's contribution to a round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Name of the agent (or human) that produced the message
    pub sender: String,
    /// Message text
    pub content: String,
    /// Lowercased name of the addressed speaker, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_response_to: Option<String>,
}

impl Message {
    /// Create a raw message; addressing is extracted by [`Message::normalized`]
    pub fn new(sender: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            content: content.into(),
            in_response_to: None,
        }
    }

    /// Produce the persisted form of this message.
    ///
    /// The first `in response to: <name>` marker (any casing) is removed
    /// from the content and its name becomes `in_response_to`. Without a
    /// marker the message is returned unchanged.
    pub fn normalized(&self) -> Self {
        if self.in_response_to.is_some() {
            return self.clone();
        }

        let Some(captures) = RESPONSE_MARKER_RE.captures(&self.content) else {
            return self.clone();
        };

        let whole = captures.get(0).map(|m| m.range()).unwrap_or(0..0);
        let addressee = captures
            .get(1)
            .map(|m| m.as_str().to_lowercase())
            .unwrap_or_default();

        let mut content = String::with_capacity(self.content.len());
        content.push_str(&self.content[..whole.start]);
        content.push_str(&self.content[whole.end..]);

        Self {
            sender: self.sender.clone(),
            content: content.trim().to_string(),
            in_response_to: Some(addressee),
        }
    }

    /// Whether this message is the unanimous-stop sentinel
    pub fn is_stop_sentinel(&self) -> bool {
        self.content == STOP_SENTINEL
    }
}

/// Role an agent plays in the conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentRole {
    /// Summarizes each iteration
    Moderator,
    /// Critiques the input
    Reviewer,
    /// Rewrites the input from the summary
    Feedback,
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentRole::Moderator => write!(f, "moderator"),
            AgentRole::Reviewer => write!(f, "reviewer"),
            AgentRole::Feedback => write!(f, "feedback"),
        }
    }
}

impl FromStr for AgentRole {
    type Err = CraneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "moderator" => Ok(AgentRole::Moderator),
            "reviewer" => Ok(AgentRole::Reviewer),
            "feedback" | "feedback_agent" => Ok(AgentRole::Feedback),
            other => Err(CraneError::config(format!("unknown agent role '{}'", other))),
        }
    }
}

/// Token usage information
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl TokenUsage {
    /// Add another usage record into this one
    pub fn add(&mut self, other: &TokenUsage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_extraction_case_insensitive() {
        let msg = Message::new("reviewer_2", "In RESPONSE tO: reviewerX rest-of-text");
        let normalized = msg.normalized();
        assert_eq!(normalized.content, "rest-of-text");
        assert_eq!(normalized.in_response_to.as_deref(), Some("reviewerx"));
        assert_eq!(normalized.sender, "reviewer_2");
    }

    #[test]
    fn test_marker_inside_sentence() {
        let msg = Message::new(
            "test_1",
            "test i am writing something In RESPONSE tO: reviewer_1 to test the new feature",
        );
        let normalized = msg.normalized();
        assert_eq!(
            normalized.content,
            "test i am writing something to test the new feature"
        );
        assert_eq!(normalized.in_response_to.as_deref(), Some("reviewer_1"));
        assert!(!normalized.content.to_lowercase().contains(RESPONSE_MARKER));
    }

    #[test]
    fn test_no_marker_omits_field() {
        let msg = Message::new("reviewer_1", "looks fine");
        let normalized = msg.normalized();
        assert_eq!(normalized, msg);

        let json = serde_json::to_value(&normalized).unwrap();
        assert!(json.get("in_response_to").is_none());
        assert_eq!(json["sender"], "reviewer_1");
    }

    #[test]
    fn test_stop_sentinel_exact_match() {
        assert!(Message::new("r", STOP_SENTINEL).is_stop_sentinel());
        assert!(!Message::new("r", "another round is not needed.").is_stop_sentinel());
        assert!(!Message::new("r", "Another round is not needed").is_stop_sentinel());
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!("Reviewer".parse::<AgentRole>().unwrap(), AgentRole::Reviewer);
        assert_eq!(
            "feedback_agent".parse::<AgentRole>().unwrap(),
            AgentRole::Feedback
        );
        assert!("judge".parse::<AgentRole>().is_err());
    }

    #[test]
    fn test_usage_accumulates() {
        let mut total = TokenUsage::default();
        total.add(&TokenUsage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        });
        total.add(&TokenUsage {
            prompt_tokens: 1,
            completion_tokens: 2,
            total_tokens: 3,
        });
        assert_eq!(total.total_tokens, 18);
        assert_eq!(total.prompt_tokens, 11);
    }
}
