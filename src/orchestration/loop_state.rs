//! Conversation loop state
//!
//! Tracks where the manager is in the iteration / conversation state
//! machine, plus the progress that survives an aborted run.

use std::fmt;

/// Step within one iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationPhase {
    Idle,
    InitialReview,
    SubsequentRounds { round: usize },
    Persist,
    ResetCounters,
    Summarize,
    Feedback,
}

/// Step within one conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationPhase {
    Iterate,
    StopCheck,
    Finalize,
    Finished,
}

impl fmt::Display for IterationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IterationPhase::Idle => write!(f, "idle"),
            IterationPhase::InitialReview => write!(f, "initial review"),
            IterationPhase::SubsequentRounds { round } => write!(f, "round {}", round),
            IterationPhase::Persist => write!(f, "persist"),
            IterationPhase::ResetCounters => write!(f, "reset counters"),
            IterationPhase::Summarize => write!(f, "summarization"),
            IterationPhase::Feedback => write!(f, "feedback"),
        }
    }
}

/// State of the conversation loop
#[derive(Debug, Clone)]
pub struct ConversationLoopState {
    /// Index of the iteration in progress (0-indexed)
    pub iteration: usize,
    /// Maximum iterations for this conversation
    pub max_iterations: usize,
    /// Iterations that ran through feedback or the stop check
    pub iterations_completed: usize,
    /// Set when every reviewer returned the stop sentinel
    pub stopped: bool,
    /// Latest revision of the artifact under review
    pub current_input: String,
    pub phase: ConversationPhase,
    pub iteration_phase: IterationPhase,
}

impl ConversationLoopState {
    /// Create a new loop state for the given input
    pub fn new(max_iterations: usize, input: impl Into<String>) -> Self {
        Self {
            iteration: 0,
            max_iterations,
            iterations_completed: 0,
            stopped: false,
            current_input: input.into(),
            phase: ConversationPhase::Iterate,
            iteration_phase: IterationPhase::Idle,
        }
    }

    /// Check if another iteration should start
    pub fn should_continue(&self) -> bool {
        self.iteration < self.max_iterations && !self.stopped
    }

    /// Record a finished iteration and move to the next
    pub fn complete_iteration(&mut self) {
        self.iterations_completed += 1;
        self.iteration += 1;
        self.iteration_phase = IterationPhase::Idle;
        self.phase = ConversationPhase::Iterate;
    }

    pub fn enter(&mut self, phase: IterationPhase) {
        self.iteration_phase = phase;
    }

    pub fn is_first_iteration(&self) -> bool {
        self.iteration == 0
    }
}

impl Default for ConversationLoopState {
    fn default() -> Self {
        Self::new(0, String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loop_state_new() {
        let state = ConversationLoopState::new(2, "diff");
        assert_eq!(state.iteration, 0);
        assert!(state.is_first_iteration());
        assert_eq!(state.current_input, "diff");
        assert_eq!(state.iteration_phase, IterationPhase::Idle);
    }

    #[test]
    fn test_should_continue() {
        let mut state = ConversationLoopState::new(2, "");
        assert!(state.should_continue());

        state.complete_iteration();
        assert!(state.should_continue());

        state.complete_iteration();
        assert!(!state.should_continue());
        assert_eq!(state.iterations_completed, 2);
    }

    #[test]
    fn test_stop_ends_loop() {
        let mut state = ConversationLoopState::new(5, "");
        state.stopped = true;
        assert!(!state.should_continue());
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(
            IterationPhase::SubsequentRounds { round: 2 }.to_string(),
            "round 2"
        );
    }
}
