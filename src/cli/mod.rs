//! CLI module - terminal human participant and run assembly

pub mod human;
pub mod run;

pub use human::StdinResponder;
pub use run::{build_manager, build_manager_with_transport, run_conversation, RunRequest};
