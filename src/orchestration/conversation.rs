//! Conversation state
//!
//! Owns the agents, the live history of the current iteration and the
//! handles to durable counters and transcripts.

use std::sync::Arc;

use crate::agent::Agent;
use crate::core::{AgentRole, CraneError, Message, Result, TokenUsage};
use crate::storage::{
    CounterStore, Counters, MemoryCounterStore, MemoryTranscriptStore, ResponseRecord,
    TranscriptRecord, TranscriptStore,
};

/// Agents plus the history of the iteration in progress
pub struct Conversation {
    moderator: Agent,
    reviewers: Vec<Agent>,
    feedback_agent: Agent,
    /// Normalized messages of the current iteration only
    history: Vec<Message>,
    counters: Arc<dyn CounterStore>,
    transcripts: Arc<dyn TranscriptStore>,
}

impl Conversation {
    /// Create a conversation; reviewers are queried in the given order
    pub fn new(
        moderator: Agent,
        reviewers: Vec<Agent>,
        feedback_agent: Agent,
        counters: Arc<dyn CounterStore>,
        transcripts: Arc<dyn TranscriptStore>,
    ) -> Result<Self> {
        if moderator.role() != AgentRole::Moderator {
            return Err(CraneError::config(format!(
                "'{}' is not configured as a moderator",
                moderator.name()
            )));
        }
        if reviewers.is_empty() {
            return Err(CraneError::config("at least one reviewer is required"));
        }
        if let Some(r) = reviewers.iter().find(|r| r.role() != AgentRole::Reviewer) {
            return Err(CraneError::config(format!(
                "'{}' is not configured as a reviewer",
                r.name()
            )));
        }
        if feedback_agent.role() != AgentRole::Feedback {
            return Err(CraneError::config(format!(
                "'{}' is not configured as a feedback agent",
                feedback_agent.name()
            )));
        }

        Ok(Self {
            moderator,
            reviewers,
            feedback_agent,
            history: Vec::new(),
            counters,
            transcripts,
        })
    }

    /// Conversation backed by in-memory stores
    pub fn in_memory(moderator: Agent, reviewers: Vec<Agent>, feedback_agent: Agent) -> Result<Self> {
        Self::new(
            moderator,
            reviewers,
            feedback_agent,
            Arc::new(MemoryCounterStore::new()),
            Arc::new(MemoryTranscriptStore::new()),
        )
    }

    /// Append the normalized form of a message and return the history
    pub fn add_message(&mut self, message: Message) -> &[Message] {
        self.history.push(message.normalized());
        &self.history
    }

    pub fn get_history(&self) -> &[Message] {
        &self.history
    }

    pub fn set_history(&mut self, history: Vec<Message>) {
        self.history = history;
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    pub fn moderator(&self) -> &Agent {
        &self.moderator
    }

    pub fn moderator_mut(&mut self) -> &mut Agent {
        &mut self.moderator
    }

    pub fn reviewers(&self) -> &[Agent] {
        &self.reviewers
    }

    pub fn reviewers_mut(&mut self) -> &mut [Agent] {
        &mut self.reviewers
    }

    pub fn feedback_agent(&self) -> &Agent {
        &self.feedback_agent
    }

    pub fn feedback_agent_mut(&mut self) -> &mut Agent {
        &mut self.feedback_agent
    }

    pub fn transcripts(&self) -> &Arc<dyn TranscriptStore> {
        &self.transcripts
    }

    /// Tokens reported across every agent
    pub fn total_usage(&self) -> TokenUsage {
        let mut total = self.moderator.usage();
        total.add(&self.feedback_agent.usage());
        for reviewer in &self.reviewers {
            total.add(&reviewer.usage());
        }
        total
    }

    // Durable identity

    pub fn get_conversation_id(&self) -> Result<u64> {
        Ok(self.counters.read()?.conversation_id)
    }

    pub fn set_conversation_id(&self, conversation_id: u64) -> Result<()> {
        self.update_counters(|c| c.conversation_id = conversation_id)
    }

    /// Advance the conversation id by one and return the new value
    pub fn increment_conversation_id(&self) -> Result<u64> {
        let next = self.get_conversation_id()? + 1;
        self.set_conversation_id(next)?;
        Ok(next)
    }

    pub fn reset_conversation(&self) -> Result<()> {
        self.set_conversation_id(0)
    }

    pub fn get_iteration_id(&self) -> Result<u64> {
        Ok(self.counters.read()?.iteration_id)
    }

    pub fn set_iteration_id(&self, iteration_id: u64) -> Result<()> {
        self.update_counters(|c| c.iteration_id = iteration_id)
    }

    /// Advance the iteration id by one and return the new value
    pub fn increment_iteration_id(&self) -> Result<u64> {
        let next = self.get_iteration_id()? + 1;
        self.set_iteration_id(next)?;
        Ok(next)
    }

    pub fn reset_iteration(&self) -> Result<()> {
        self.set_iteration_id(0)
    }

    fn update_counters(&self, f: impl FnOnce(&mut Counters)) -> Result<()> {
        let mut counters = self.counters.read()?;
        f(&mut counters);
        self.counters.write(&counters)
    }

    // Transcripts

    /// Make sure the current conversation has a storage location
    pub fn ensure_conversation_path(&self) -> Result<()> {
        self.transcripts
            .ensure_conversation(self.get_conversation_id()?)
    }

    /// Make sure the current iteration has a storage location
    pub fn ensure_iteration_path(&self) -> Result<()> {
        let counters = self.counters.read()?;
        self.transcripts
            .ensure_iteration(counters.conversation_id, counters.iteration_id)
    }

    /// Overwrite the transcript of the current iteration
    pub fn save_model_responses(&self, messages: &[Message]) -> Result<()> {
        let counters = self.counters.read()?;
        self.transcripts.save_responses(&TranscriptRecord {
            conversation_id: counters.conversation_id,
            iteration_id: counters.iteration_id,
            responses: messages.to_vec(),
        })
    }

    pub fn load_model_responses(
        &self,
        conversation_id: u64,
        iteration_id: u64,
    ) -> Result<Option<TranscriptRecord>> {
        self.transcripts.load_responses(conversation_id, iteration_id)
    }

    /// Persist a moderator or feedback response under `name`
    pub fn save_non_reviewer_response(&self, name: &str, message: &Message) -> Result<()> {
        let counters = self.counters.read()?;
        self.transcripts.save_agent_response(
            name,
            &ResponseRecord {
                conversation_id: counters.conversation_id,
                iteration_id: counters.iteration_id,
                response: vec![message.normalized()],
            },
        )
    }

    /// Persist an error log for the given iteration of the current conversation
    pub fn save_errors(&self, iteration_id: u64, text: &str) -> Result<()> {
        let conversation_id = self.get_conversation_id()?;
        self.transcripts
            .ensure_iteration(conversation_id, iteration_id)?;
        self.transcripts
            .save_errors(conversation_id, iteration_id, text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{AgentConfig, CallError, ProviderType};
    use crate::llm::{ProviderRequest, ProviderResponse, Transport};
    use async_trait::async_trait;

    struct Offline;

    #[async_trait]
    impl Transport for Offline {
        async fn send(
            &self,
            _request: &ProviderRequest,
        ) -> std::result::Result<ProviderResponse, CallError> {
            Err(CallError::Network("offline".into()))
        }
    }

    fn agent(name: &str, role: AgentRole) -> Agent {
        let mut cfg = AgentConfig::new(
            name,
            role,
            ProviderType::HuggingFace,
            "https://api-inference.huggingface.co/models/distilgpt2",
            "Do your part.",
        );
        cfg.summarization_instructions = Some("Summarize.".into());
        Agent::with_transport(cfg, Arc::new(Offline)).unwrap()
    }

    fn conversation() -> Conversation {
        Conversation::in_memory(
            agent("moderator", AgentRole::Moderator),
            vec![agent("reviewer_1", AgentRole::Reviewer)],
            agent("feedback_agent", AgentRole::Feedback),
        )
        .unwrap()
    }

    #[test]
    fn test_add_message_returns_normalized_history() {
        let mut conv = conversation();
        let history = conv.add_message(Message::new(
            "reviewer_1",
            "In response to: reviewer_2 I disagree",
        ));
        let last = history.last().unwrap();
        assert_eq!(last.content, "I disagree");
        assert_eq!(last.in_response_to.as_deref(), Some("reviewer_2"));
        assert_eq!(conv.get_history().len(), 1);
    }

    #[test]
    fn test_roles_are_checked() {
        let result = Conversation::in_memory(
            agent("reviewer_1", AgentRole::Reviewer),
            vec![agent("reviewer_2", AgentRole::Reviewer)],
            agent("feedback_agent", AgentRole::Feedback),
        );
        assert!(result.is_err());

        let result = Conversation::in_memory(
            agent("moderator", AgentRole::Moderator),
            vec![],
            agent("feedback_agent", AgentRole::Feedback),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_counters() {
        let conv = conversation();
        assert_eq!(conv.get_conversation_id().unwrap(), 0);
        assert_eq!(conv.increment_conversation_id().unwrap(), 1);
        assert_eq!(conv.increment_iteration_id().unwrap(), 1);
        assert_eq!(conv.increment_iteration_id().unwrap(), 2);
        assert_eq!(conv.get_conversation_id().unwrap(), 1);

        conv.reset_iteration().unwrap();
        assert_eq!(conv.get_iteration_id().unwrap(), 0);
        assert_eq!(conv.get_conversation_id().unwrap(), 1);

        conv.reset_conversation().unwrap();
        assert_eq!(conv.get_conversation_id().unwrap(), 0);
    }

    #[test]
    fn test_ensure_paths_twice() {
        let conv = conversation();
        conv.set_conversation_id(5).unwrap();
        conv.set_iteration_id(1).unwrap();
        for _ in 0..2 {
            conv.ensure_conversation_path().unwrap();
            conv.ensure_iteration_path().unwrap();
        }
        assert!(conv.transcripts().has_conversation(5));
        assert!(conv.transcripts().has_iteration(5, 1));
    }

    #[test]
    fn test_save_model_responses_round_trip() {
        let mut conv = conversation();
        conv.set_conversation_id(2).unwrap();
        conv.set_iteration_id(1).unwrap();
        conv.add_message(Message::new("reviewer_1", "first"));
        conv.add_message(Message::new("reviewer_1", "in response to: moderator second"));

        let history = conv.get_history().to_vec();
        conv.save_model_responses(&history).unwrap();

        let record = conv.load_model_responses(2, 1).unwrap().unwrap();
        assert_eq!(record.conversation_id, 2);
        assert_eq!(record.iteration_id, 1);
        assert_eq!(record.responses, history);
    }
}
