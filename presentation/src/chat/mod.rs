//! Interactive chat module
//!
//! Reads user lines from stdin and hands each one to the conversation
//! orchestrator.

mod repl;

pub use repl::{ChatRepl, ReplCommand};
