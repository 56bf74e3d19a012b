//! Assemble a conversation from configuration and run it

use std::sync::Arc;

use tracing::info;

use crate::agent::Agent;
use crate::cli::human::StdinResponder;
use crate::core::{AgentConfig, AgentRole, Config, CraneError, Result};
use crate::llm::{HttpTransport, Transport};
use crate::orchestration::{Conversation, ConversationManager, ConversationReport};
use crate::storage::{FileCounterStore, FileRetrievalStore, FileTranscriptStore};

/// What to review
#[derive(Debug, Clone)]
pub struct RunRequest {
    /// Change request the reviewers work against
    pub task: String,
    /// Artifact under review
    pub input: String,
}

/// Build a manager over file-backed stores in `config.storage.base_path`.
/// All agents share one HTTP transport.
pub fn build_manager(config: &Config) -> Result<ConversationManager> {
    let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new()?);
    build_manager_with_transport(config, transport)
}

/// Same as [`build_manager`] with an explicit transport
pub fn build_manager_with_transport(
    config: &Config,
    transport: Arc<dyn Transport>,
) -> Result<ConversationManager> {
    config.validate()?;

    let agent = |cfg: &AgentConfig| Agent::with_transport(cfg.clone(), Arc::clone(&transport));
    let single = |role: AgentRole| {
        config
            .agents_with_role(role)
            .next()
            .ok_or_else(|| CraneError::config(format!("no {} configured", role)))
    };

    let moderator = agent(single(AgentRole::Moderator)?)?;
    let feedback_agent = agent(single(AgentRole::Feedback)?)?;
    let reviewers = config
        .agents_with_role(AgentRole::Reviewer)
        .map(agent)
        .collect::<Result<Vec<_>>>()?;

    let base = &config.storage.base_path;
    let conversation = Conversation::new(
        moderator,
        reviewers,
        feedback_agent,
        Arc::new(FileCounterStore::in_dir(base)),
        Arc::new(FileTranscriptStore::new(base.clone())),
    )?;

    let mut manager = ConversationManager::new(
        conversation,
        Arc::new(FileRetrievalStore::in_dir(base)),
        &config.run,
    );

    if let Some(role) = config.run.human_role {
        info!(role = %role, "human participant enabled");
        manager = manager.with_human(role, Arc::new(StdinResponder::new()));
    }

    Ok(manager)
}

/// Run one conversation with the configured agents
pub async fn run_conversation(config: &Config, request: &RunRequest) -> Result<ConversationReport> {
    let mut manager = build_manager(config)?;
    info!(
        base_path = %config.storage.base_path.display(),
        change = %config.run.change_name,
        "running review conversation"
    );
    manager
        .simulate_conversation(&request.task, &request.input)
        .await
}
