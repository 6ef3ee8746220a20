//! MCP (Model Context Protocol) tool server adapter
//!
//! Implements the [`ToolBackend`](toolchat_application::ToolBackend) port by
//! running a tool server as a child process and speaking newline-delimited
//! JSON-RPC 2.0 over its stdin/stdout.

pub mod error;
pub mod protocol;
pub mod session;
pub mod transport;
