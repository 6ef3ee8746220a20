//! Domain layer for toolchat
//!
//! This crate contains the core types of the tool-calling conversation:
//! messages and history, tool descriptors, function specs and the pure
//! schema adapter between them. It has no dependencies on I/O, transports
//! or presentation concerns.
//!
//! # Core Concepts
//!
//! ## Conversation
//!
//! An ordered [`Conversation`] of [`Message`]s replayed verbatim to the model
//! on every completion request. Tool results may only answer tool calls
//! issued by the assistant message right before them.
//!
//! ## Tools
//!
//! The tool backend publishes a catalog of [`ToolDescriptor`]s once per
//! session. [`adapt`] turns that catalog into [`FunctionSpec`]s for the
//! completion service; the model answers with [`ToolCallRequest`]s whose
//! outcome is a [`ToolResult`].

pub mod conversation;
pub mod core;
pub mod tool;
pub mod util;

// Re-export commonly used types
pub use conversation::{
    history::Conversation,
    message::{Message, Role},
    phase::TurnPhase,
};
pub use core::error::{ArgumentParseError, DomainError};
pub use tool::{
    entities::{FunctionSpec, ToolCallRequest, ToolDescriptor},
    schema::{SchemaAdaptationError, adapt},
    state::BackendState,
    value_objects::{ToolError, ToolResult},
};
