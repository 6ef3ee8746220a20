//! Conversation domain.
//!
//! - [`message::Message`]: a single user, assistant or tool message
//! - [`history::Conversation`]: the ordered history with the tool-result invariant
//! - [`phase::TurnPhase`]: where a turn currently is in the orchestration loop

pub mod history;
pub mod message;
pub mod phase;
