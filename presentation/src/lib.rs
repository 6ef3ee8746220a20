//! Presentation layer for toolchat
//!
//! This crate contains the CLI definition, the line-based chat REPL,
//! console formatting and turn progress reporting.

pub mod chat;
pub mod cli;
pub mod output;
pub mod progress;

// Re-export commonly used types
pub use chat::{ChatRepl, ReplCommand};
pub use cli::commands::Cli;
pub use output::console::ConsoleFormatter;
pub use progress::reporter::TurnProgressReporter;
