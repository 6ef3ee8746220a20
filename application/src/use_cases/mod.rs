//! Use cases

pub mod run_conversation;
