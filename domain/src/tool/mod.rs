//! Tool domain module
//!
//! Defines the data that flows between the tool backend, the completion
//! service and the conversation loop.
//!
//! ```text
//! ┌────────────────┐  adapt()  ┌──────────────┐         ┌─────────────────┐
//! │ ToolDescriptor │──────────▶│ FunctionSpec │ model ─▶│ ToolCallRequest │
//! │ (backend)      │           │ (completion) │         │ (arguments str) │
//! └────────────────┘           └──────────────┘         └────────┬────────┘
//!                                                                │ call_tool
//!                                                                ▼
//!                                                         ┌────────────┐
//!                                                         │ ToolResult │
//!                                                         └────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`ToolDescriptor`]: a tool as published by the backend catalog
//! - [`FunctionSpec`]: the same tool in function-calling form
//! - [`ToolCallRequest`]: a model request to invoke a tool
//! - [`ToolResult`]: the outcome, success or structured [`ToolError`]
//! - [`BackendState`]: lifecycle of the tool backend session
//!
//! Everything here is pure data; I/O lives in the infrastructure layer.

pub mod entities;
pub mod schema;
pub mod state;
pub mod value_objects;

pub use entities::{FunctionSpec, ToolCallRequest, ToolDescriptor};
pub use schema::{SchemaAdaptationError, adapt};
pub use state::BackendState;
pub use value_objects::{ToolError, ToolResult};
