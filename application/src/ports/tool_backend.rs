//! Tool Backend port
//!
//! Defines the interface to the session with the external tool backend.
//! A tool that fails comes back as `Ok(ToolResult)` with a
//! [`ToolError`](toolchat_domain::ToolError); `Err(BackendError)` is
//! reserved for channel faults.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::time::Duration;
use thiserror::Error;
use toolchat_domain::{BackendState, ToolDescriptor, ToolResult};

/// Channel-level failures of the tool backend session
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Tool backend unavailable: {0}")]
    Unavailable(String),

    #[error("Tool backend did not answer '{method}' within {timeout:?}")]
    Timeout { method: String, timeout: Duration },

    #[error("Tool backend session is {0}, not ready")]
    NotReady(BackendState),

    #[error("Tool backend channel closed")]
    ChannelClosed,

    #[error("Tool backend protocol error: {0}")]
    Protocol(String),
}

impl BackendError {
    /// Errors that mean the backend cannot be used at all.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, BackendError::Unavailable(_))
    }
}

/// Port for the tool backend session
#[async_trait]
pub trait ToolBackend: Send + Sync {
    /// Current lifecycle state
    fn state(&self) -> BackendState;

    /// Fetch the tool catalog. The backend is queried at most once per
    /// session; later calls return the cached catalog.
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, BackendError>;

    /// Invoke a tool and wait for its correlated response.
    async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<ToolResult, BackendError>;

    /// Terminate the backend and release its streams. Idempotent.
    async fn close(&self);
}
