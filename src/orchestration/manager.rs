//! Conversation manager
//!
//! Drives reviewers through an iteration, has the moderator compress the
//! iteration and the feedback agent produce the next revision, then loops
//! until the iteration limit or a unanimous stop.
//!
//! Reviewers are queried one after another in configuration order, so a
//! reviewer's context in a round includes the messages of the reviewers
//! before it in the same round.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::agent::ErrorLog;
use crate::core::{AgentRole, CraneError, Message, Result, RunConfig, RAG_SENDER};
use crate::orchestration::conversation::Conversation;
use crate::orchestration::human::{HumanParticipant, HumanResponder};
use crate::orchestration::loop_state::{ConversationLoopState, ConversationPhase, IterationPhase};
use crate::orchestration::report::{ConversationReport, RunOutcome};
use crate::storage::RetrievalStore;

/// Record name of the moderator's summary
pub const SUMMARY_RECORD: &str = "summary";

const DRAINED_INDENT: &str = "   ";

/// Runs conversations over a [`Conversation`]
pub struct ConversationManager {
    conversation: Conversation,
    retrieval: Arc<dyn RetrievalStore>,
    /// Attempts for summarization and feedback
    max_retries: usize,
    /// Subsequent rounds per iteration
    messages_per_iteration: usize,
    /// Per-reviewer message limit within one iteration
    reviewer_quota: usize,
    max_iterations: usize,
    /// Label of the feedback output record
    change_name: String,
    stopping_condition: bool,
    /// Errors of the iteration in progress
    errors: ErrorLog,
    /// Errors already flushed during this run
    run_errors: Vec<String>,
    human: Option<HumanParticipant>,
    state: ConversationLoopState,
}

impl ConversationManager {
    pub fn new(
        conversation: Conversation,
        retrieval: Arc<dyn RetrievalStore>,
        run: &RunConfig,
    ) -> Self {
        Self {
            conversation,
            retrieval,
            max_retries: run.max_retries,
            messages_per_iteration: run.messages_per_iteration,
            reviewer_quota: run.reviewer_quota(),
            max_iterations: run.max_iterations,
            change_name: run.change_name.clone(),
            stopping_condition: false,
            errors: ErrorLog::new(),
            run_errors: Vec::new(),
            human: None,
            state: ConversationLoopState::default(),
        }
    }

    /// Let a human play `role`
    pub fn with_human(mut self, role: AgentRole, responder: Arc<dyn HumanResponder>) -> Self {
        self.human = Some(HumanParticipant::new(role, responder));
        self
    }

    pub fn set_max_retries(&mut self, max_retries: usize) {
        self.max_retries = max_retries;
    }

    pub fn set_messages_per_iteration(&mut self, messages: usize) {
        self.messages_per_iteration = messages;
    }

    pub fn set_reviewer_quota(&mut self, quota: usize) {
        self.reviewer_quota = quota;
    }

    pub fn set_max_iterations(&mut self, max_iterations: usize) {
        self.max_iterations = max_iterations;
    }

    pub fn set_change_name(&mut self, change_name: impl Into<String>) {
        self.change_name = change_name.into();
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn conversation_mut(&mut self) -> &mut Conversation {
        &mut self.conversation
    }

    /// Errors logged since the last flush
    pub fn errors(&self) -> &ErrorLog {
        &self.errors
    }

    pub fn stopping_condition(&self) -> bool {
        self.stopping_condition
    }

    pub fn state(&self) -> &ConversationLoopState {
        &self.state
    }

    /// Run one full conversation starting from `input`.
    ///
    /// Run-fatal failures end up in the report's outcome; only storage
    /// failures while finalizing are returned as `Err`. Either way the
    /// durable conversation id is advanced and the iteration id reset.
    pub async fn simulate_conversation(
        &mut self,
        task: &str,
        input: &str,
    ) -> Result<ConversationReport> {
        let conversation_id = self.conversation.get_conversation_id()?;
        self.state = ConversationLoopState::new(self.max_iterations, input);
        self.stopping_condition = false;
        self.conversation.clear_history();
        self.errors.clear();
        self.run_errors.clear();

        info!(
            conversation_id,
            max_iterations = self.max_iterations,
            reviewers = self.conversation.reviewers().len(),
            "starting conversation"
        );

        let outcome = match self.run_iterations(task).await {
            Ok(()) => RunOutcome::Completed,
            Err(err) => {
                error!(conversation_id, error = %err, "conversation aborted");
                self.errors.add(err.to_string());
                RunOutcome::Aborted(err)
            }
        };

        self.state.phase = ConversationPhase::Finalize;
        let mut flushed = Ok(());
        if let RunOutcome::Aborted(_) = outcome {
            self.reset_iteration_messages();
            flushed = match self.conversation.get_iteration_id() {
                Ok(iteration_id) => self.flush_errors(iteration_id),
                Err(e) => Err(e),
            };
            if let Err(ref e) = flushed {
                warn!(conversation_id, error = %e, "failed to record the errors of the aborted run");
            }
        }

        // The counters move even when the error record could not be written
        let reset = self.conversation.reset_iteration();
        let next = self.conversation.increment_conversation_id()?;
        reset?;
        flushed?;
        self.state.phase = ConversationPhase::Finished;

        info!(
            conversation_id,
            next_conversation_id = next,
            iterations = self.state.iterations_completed,
            stopped_early = self.state.stopped,
            "conversation finished"
        );

        Ok(ConversationReport {
            conversation_id,
            iterations_completed: self.state.iterations_completed,
            stopped_early: self.state.stopped,
            final_input: self.state.current_input.clone(),
            outcome,
            errors: self.run_errors.clone(),
            token_usage: self.conversation.total_usage(),
        })
    }

    async fn run_iterations(&mut self, task: &str) -> Result<()> {
        self.conversation.ensure_conversation_path()?;

        while self.state.should_continue() {
            self.state.phase = ConversationPhase::Iterate;
            self.conversation.ensure_iteration_path()?;
            let iteration_id = self.conversation.get_iteration_id()?;

            let current = self.state.current_input.clone();
            let problem = if self.state.is_first_iteration() {
                format!("CHANGE REQUEST TASK: {}; Current problem: {}", task, current)
            } else {
                format!("### CR_TASK \n{}\n\n ### Code snippet\n{}", task, current)
            };

            info!(iteration = self.state.iteration, iteration_id, "starting iteration");
            self.simulate_iteration(&problem).await?;

            if !self.state.is_first_iteration() {
                self.state.phase = ConversationPhase::StopCheck;
                if self.check_stopping_condition() {
                    info!(iteration_id, "reviewers agree another round is not needed");
                    self.state.stopped = true;
                    self.flush_errors(iteration_id)?;
                    self.state.complete_iteration();
                    break;
                }
            }

            let summary = self.summarize_iteration_history().await?;
            let revision = self.fetch_model_feedback(&summary, &current).await?;
            self.state.current_input = revision;

            self.flush_errors(iteration_id)?;
            self.conversation.increment_iteration_id()?;
            self.state.complete_iteration();
        }

        Ok(())
    }

    /// One iteration: initial review, the subsequent rounds, persist and
    /// reset the per-reviewer counters
    pub async fn simulate_iteration(&mut self, input_text: &str) -> Result<()> {
        self.initial_review_selection(input_text).await?;

        for round in 1..=self.messages_per_iteration {
            let appended = self.subsequent_round(round, input_text).await?;
            debug!(round, appended, "round complete");
        }

        self.state.enter(IterationPhase::Persist);
        self.conversation
            .save_model_responses(self.conversation.get_history())?;

        self.state.enter(IterationPhase::ResetCounters);
        self.reset_iteration_messages();
        Ok(())
    }

    /// Every reviewer sees the problem once. Failed reviewers contribute
    /// nothing.
    pub async fn initial_review_selection(&mut self, input_text: &str) -> Result<()> {
        self.state.enter(IterationPhase::InitialReview);
        let rag = self.long_term_context().await?;
        let rag_context = rag.join("\n\n");

        for idx in 0..self.conversation.reviewers().len() {
            let reviewer = &mut self.conversation.reviewers_mut()[idx];
            reviewer.set_additional_context(rag_context.clone());
            reviewer.set_input_problem(input_text);
            let name = reviewer.name().to_string();

            match reviewer.query().await {
                Ok(text) => {
                    self.conversation.add_message(Message::new(name, text));
                }
                Err(err) => {
                    let drained = reviewer.drain_errors();
                    warn!(agent = %name, error = %err, "reviewer skipped in initial review");
                    self.errors.add(format!(
                        "An error occurred while communicating with {} during the first step.",
                        name
                    ));
                    self.errors.extend_indented(DRAINED_INDENT, drained);
                }
            }
        }

        self.human_review(input_text, &rag).await;
        Ok(())
    }

    /// One subsequent round. Reviewers under quota see the history so far
    /// plus long-term context; a failed reviewer contributes an empty
    /// message. Returns the number of reviewer messages appended.
    pub async fn subsequent_round(&mut self, round: usize, input_text: &str) -> Result<usize> {
        self.state.enter(IterationPhase::SubsequentRounds { round });
        let rag = self.long_term_context().await?;
        let mut appended = 0;

        for idx in 0..self.conversation.reviewers().len() {
            if self.conversation.reviewers()[idx].iteration_messages() >= self.reviewer_quota {
                continue;
            }

            let context = render_messages(&integrate_rag_and_history(
                self.conversation.get_history(),
                &rag,
            ))?;

            let reviewer = &mut self.conversation.reviewers_mut()[idx];
            reviewer.set_additional_context(context);
            reviewer.set_input_problem(input_text);
            let name = reviewer.name().to_string();

            let text = match reviewer.query().await {
                Ok(text) => text,
                Err(err) => {
                    let drained = reviewer.drain_errors();
                    warn!(agent = %name, round, error = %err, "reviewer contributed an empty message");
                    self.errors.add(format!(
                        "An error occurred while trying to communicate with {} during round {}.",
                        name, round
                    ));
                    self.errors.extend_indented(DRAINED_INDENT, drained);
                    String::new()
                }
            };

            reviewer.increment_iteration_messages();
            self.conversation.add_message(Message::new(name, text));
            appended += 1;
        }

        self.human_review(input_text, &rag).await;
        Ok(appended)
    }

    /// Have the moderator compress the iteration history.
    ///
    /// On success the summary is recorded, the live history cleared and the
    /// summary pushed to the retrieval store.
    pub async fn summarize_iteration_history(&mut self) -> Result<String> {
        self.state.enter(IterationPhase::Summarize);
        let transcript = render_messages(self.conversation.get_history())?;

        if let Some(human) = self.human_for(AgentRole::Moderator) {
            let instructions = self
                .conversation
                .moderator()
                .config()
                .summarization_instructions
                .clone()
                .unwrap_or_default();
            let prompt = format!("{}\n\n{}", instructions, transcript);
            let summary = human
                .responder
                .respond(AgentRole::Moderator, &prompt)
                .await?;
            return self.finish_summary(human.sender(), summary).await;
        }

        let moderator = self.conversation.moderator_mut();
        moderator.set_additional_context(String::new());
        moderator.set_input_problem(transcript);
        let name = moderator.name().to_string();

        for attempt in 0..self.max_retries {
            let moderator = self.conversation.moderator_mut();
            match moderator.query_summarization().await {
                Ok(summary) => return self.finish_summary(&name, summary).await,
                Err(err) => {
                    let drained = moderator.drain_errors();
                    warn!(agent = %name, attempt, error = %err, "summarization failed");
                    self.errors.add(format!(
                        "Attempt {}: An error occurred while communicating with the moderator during the summarization of the input.",
                        attempt
                    ));
                    self.errors.extend_indented(DRAINED_INDENT, drained);
                }
            }
        }

        Err(CraneError::SummarizationExhausted {
            attempts: self.max_retries,
        })
    }

    async fn finish_summary(&mut self, sender: &str, summary: String) -> Result<String> {
        let conversation_id = self.conversation.get_conversation_id()?;
        let iteration_id = self.conversation.get_iteration_id()?;

        self.conversation
            .save_non_reviewer_response(SUMMARY_RECORD, &Message::new(sender, summary.clone()))?;
        self.conversation.clear_history();

        self.retrieval
            .save(conversation_id, iteration_id, &summary)
            .await
            .map_err(|e| {
                CraneError::RetrievalWrite(format!(
                    "Failed to save the summary of iteration {}: {}",
                    iteration_id, e
                ))
            })?;

        info!(conversation_id, iteration_id, "iteration summarized");
        Ok(summary)
    }

    /// Ask the feedback agent for the next revision of `input_text`
    pub async fn fetch_model_feedback(&mut self, summary: &str, input_text: &str) -> Result<String> {
        self.state.enter(IterationPhase::Feedback);
        let record = format!("change_{}", self.change_name);
        let suggestions = format!("## Summary of Suggestions\n{}\n\n", summary);
        let problem = format!("## Current problem\n{}", input_text);

        if let Some(human) = self.human_for(AgentRole::Feedback) {
            let prompt = format!("{}{}", suggestions, problem);
            let revision = human
                .responder
                .respond(AgentRole::Feedback, &prompt)
                .await?;
            self.conversation
                .save_non_reviewer_response(&record, &Message::new(human.sender(), revision.clone()))?;
            return Ok(revision);
        }

        let agent = self.conversation.feedback_agent_mut();
        agent.set_additional_context(suggestions);
        agent.set_input_problem(problem);
        let name = agent.name().to_string();

        for attempt in 0..self.max_retries {
            let agent = self.conversation.feedback_agent_mut();
            match agent.query().await {
                Ok(revision) => {
                    self.conversation
                        .save_non_reviewer_response(&record, &Message::new(name.as_str(), revision.clone()))?;
                    info!(agent = %name, record = %record, "revision received");
                    return Ok(revision);
                }
                Err(err) => {
                    let drained = agent.drain_errors();
                    warn!(agent = %name, attempt, error = %err, "feedback failed");
                    self.errors.add(format!(
                        "Attempt {}: An error occurred while communicating with the feedback agent.",
                        attempt
                    ));
                    self.errors.extend_indented(DRAINED_INDENT, drained);
                }
            }
        }

        Err(CraneError::FeedbackExhausted {
            attempts: self.max_retries,
        })
    }

    /// True when the history is non-empty and every message is the stop
    /// sentinel
    pub fn check_stopping_condition(&mut self) -> bool {
        let history = self.conversation.get_history();
        self.stopping_condition =
            !history.is_empty() && history.iter().all(Message::is_stop_sentinel);
        self.stopping_condition
    }

    /// Zero every reviewer's per-iteration message count
    pub fn reset_iteration_messages(&mut self) {
        for reviewer in self.conversation.reviewers_mut() {
            reviewer.reset_iteration_messages();
        }
    }

    /// Summaries of earlier iterations of this conversation; empty on
    /// iteration 0
    async fn long_term_context(&self) -> Result<Vec<String>> {
        let iteration_id = self.conversation.get_iteration_id()?;
        if iteration_id == 0 {
            return Ok(Vec::new());
        }

        let conversation_id = self.conversation.get_conversation_id()?;
        self.retrieval
            .retrieve_all(conversation_id)
            .await
            .map_err(|e| {
                CraneError::RetrievalRead(format!(
                    "Unable to retrieve long-term context during iteration {}: {}",
                    iteration_id, e
                ))
            })
    }

    /// Ask a human reviewer, if one is configured. Failures are logged like
    /// any reviewer failure.
    async fn human_review(&mut self, input_text: &str, rag: &[String]) {
        let Some(human) = self.human_for(AgentRole::Reviewer) else {
            return;
        };

        let history = match render_messages(self.conversation.get_history()) {
            Ok(history) => history,
            Err(e) => {
                self.errors.add(format!("Failed to render the history for the human reviewer: {}", e));
                return;
            }
        };
        let prompt = format!(
            "The conversation is: {}\nAdditional long-term context: {}\nThe CR is: {}",
            history,
            rag.join("\n\n"),
            input_text
        );

        match human.responder.respond(AgentRole::Reviewer, &prompt).await {
            Ok(text) => {
                self.conversation.add_message(Message::new(human.sender(), text));
            }
            Err(e) => {
                warn!(error = %e, "human reviewer skipped");
                self.errors.add(format!(
                    "An error occurred while communicating with the human reviewer: {}",
                    e
                ));
            }
        }
    }

    fn human_for(&self, role: AgentRole) -> Option<HumanParticipant> {
        self.human.as_ref().filter(|h| h.role == role).cloned()
    }

    /// Write the iteration's errors to `errors.txt` and start a fresh log
    fn flush_errors(&mut self, iteration_id: u64) -> Result<()> {
        let text = self
            .errors
            .to_text(&format!("iteration n.{}", iteration_id));
        self.conversation.save_errors(iteration_id, &text)?;
        self.run_errors.extend(self.errors.drain());
        Ok(())
    }
}

/// Append long-term context as `RAG` messages after the live history
pub fn integrate_rag_and_history(history: &[Message], rag: &[String]) -> Vec<Message> {
    history
        .iter()
        .cloned()
        .chain(rag.iter().map(|summary| Message::new(RAG_SENDER, summary.as_str())))
        .collect()
}

fn render_messages(messages: &[Message]) -> Result<String> {
    Ok(serde_json::to_string_pretty(messages)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::STOP_SENTINEL;

    #[test]
    fn test_rag_goes_after_history() {
        let history = vec![
            Message::new("reviewer_1", "a"),
            Message::new("reviewer_2", "b"),
        ];
        let rag = vec!["summary 0".to_string(), "summary 1".to_string()];

        let merged = integrate_rag_and_history(&history, &rag);
        let senders: Vec<_> = merged.iter().map(|m| m.sender.as_str()).collect();
        assert_eq!(senders, vec!["reviewer_1", "reviewer_2", "RAG", "RAG"]);
        assert_eq!(merged[2].content, "summary 0");
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_no_rag_keeps_history() {
        let history = vec![Message::new("reviewer_1", "a")];
        assert_eq!(integrate_rag_and_history(&history, &[]), history);
    }

    #[test]
    fn test_render_messages_is_json() {
        let rendered = render_messages(&[Message::new("reviewer_1", STOP_SENTINEL)]).unwrap();
        let parsed: Vec<Message> = serde_json::from_str(&rendered).unwrap();
        assert!(parsed[0].is_stop_sentinel());
    }
}
