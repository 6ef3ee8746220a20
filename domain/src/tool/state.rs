//! Tool backend session lifecycle.

use serde::{Deserialize, Serialize};

/// State of the tool backend session.
///
/// ```text
/// Unstarted ──start()──▶ Starting ──handshake ok──▶ Ready ──call timeout──▶ Degraded
///                            │                        │                        │
///                            └──── failure ──────────▶└──────── close() ──────▶└──▶ Closed
/// ```
///
/// Only `Ready` accepts tool calls. `Degraded` and `Closed` are terminal for
/// dispatch; a degraded session is still closed explicitly to reap the child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendState {
    #[default]
    Unstarted,
    Starting,
    Ready,
    Degraded,
    Closed,
}

impl BackendState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendState::Unstarted => "unstarted",
            BackendState::Starting => "starting",
            BackendState::Ready => "ready",
            BackendState::Degraded => "degraded",
            BackendState::Closed => "closed",
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, BackendState::Ready)
    }
}

impl std::fmt::Display for BackendState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
