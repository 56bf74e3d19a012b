//! Human participant seam
//!
//! A human may take over one role. The manager hands the responder the
//! same material the model would have received and uses the reply as that
//! role's contribution.

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::{AgentRole, Result};

/// Source of human replies
#[async_trait]
pub trait HumanResponder: Send + Sync {
    /// Ask for a contribution in `role`; `prompt` carries the context to show
    async fn respond(&self, role: AgentRole, prompt: &str) -> Result<String>;
}

/// A responder bound to the role it plays
#[derive(Clone)]
pub struct HumanParticipant {
    pub role: AgentRole,
    pub responder: Arc<dyn HumanResponder>,
}

impl HumanParticipant {
    pub fn new(role: AgentRole, responder: Arc<dyn HumanResponder>) -> Self {
        Self { role, responder }
    }

    /// Name recorded as the sender of human messages
    pub fn sender(&self) -> &'static str {
        match self.role {
            AgentRole::Moderator => "Human Moderator",
            AgentRole::Reviewer => "Human Reviewer",
            AgentRole::Feedback => "Human Feedback Agent",
        }
    }
}

impl std::fmt::Debug for HumanParticipant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HumanParticipant")
            .field("role", &self.role)
            .finish()
    }
}
