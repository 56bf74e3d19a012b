//! Result of one conversation run

use crate::core::{CraneError, TokenUsage};

/// How a run ended
#[derive(Debug)]
pub enum RunOutcome {
    /// Reached the iteration limit or the unanimous stop
    Completed,
    /// A run-fatal error ended the conversation
    Aborted(CraneError),
}

/// Summary returned by `simulate_conversation`
#[derive(Debug)]
pub struct ConversationReport {
    /// Id the run was recorded under
    pub conversation_id: u64,
    pub iterations_completed: usize,
    /// Whether the reviewers unanimously asked to stop
    pub stopped_early: bool,
    /// Latest revision produced by the feedback agent
    pub final_input: String,
    pub outcome: RunOutcome,
    /// Every error logged during the run, in order
    pub errors: Vec<String>,
    pub token_usage: TokenUsage,
}

impl ConversationReport {
    /// Completed without any logged error
    pub fn is_clean(&self) -> bool {
        self.is_completed() && self.errors.is_empty()
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.outcome, RunOutcome::Completed)
    }

    pub fn abort_reason(&self) -> Option<&CraneError> {
        match self.outcome {
            RunOutcome::Aborted(ref e) => Some(e),
            RunOutcome::Completed => None,
        }
    }

    /// One line for the console
    pub fn status_line(&self) -> String {
        match self.outcome {
            RunOutcome::Completed if self.errors.is_empty() => format!(
                "conversation {} completed without errors after {} iteration(s)",
                self.conversation_id, self.iterations_completed
            ),
            RunOutcome::Completed => format!(
                "conversation {} completed after {} iteration(s) with {} logged error(s)",
                self.conversation_id,
                self.iterations_completed,
                self.errors.len()
            ),
            RunOutcome::Aborted(ref e) => format!(
                "conversation {} aborted after {} iteration(s): {}",
                self.conversation_id, self.iterations_completed, e
            ),
        }
    }
}
