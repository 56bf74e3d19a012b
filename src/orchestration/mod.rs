//! Orchestration module - conversation state and the manager that drives it

pub mod conversation;
pub mod human;
pub mod loop_state;
pub mod manager;
pub mod report;

pub use conversation::Conversation;
pub use human::{HumanParticipant, HumanResponder};
pub use loop_state::{ConversationLoopState, ConversationPhase, IterationPhase};
pub use manager::{integrate_rag_and_history, ConversationManager};
pub use report::{ConversationReport, RunOutcome};
