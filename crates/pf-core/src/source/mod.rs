//! Source classification: maps a connection string to the kind of adapter that serves it.

use crate::SourceError;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// SourceKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum SourceKind {
    /// Raw bidirectional socket (`ws://`, `wss://`).
    Stream,
    /// Named channel on a shared Socket.IO connection (`sio://`).
    PubSub,
    /// Single HTTP fetch (`http://`, `https://`).
    HttpOnce,
    /// HTTP fetch re-issued on a fixed period.
    HttpPolled { interval_ms: Option<u64> },
    /// Notebook kernel comm channel (`comm://`). Classified, never adapted.
    Comm,
}

impl SourceKind {
    /// Short tag matching the scheme family, e.g. `"ws"` or `"http"`.
    pub fn scheme_tag(&self) -> &'static str {
        match self {
            SourceKind::Stream => "ws",
            SourceKind::PubSub => "sio",
            SourceKind::HttpOnce | SourceKind::HttpPolled { .. } => "http",
            SourceKind::Comm => "comm",
        }
    }

    pub fn is_http(&self) -> bool {
        matches!(self, SourceKind::HttpOnce | SourceKind::HttpPolled { .. })
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Stream => write!(f, "stream"),
            SourceKind::PubSub => write!(f, "pubsub"),
            SourceKind::HttpOnce => write!(f, "http"),
            SourceKind::HttpPolled {
                interval_ms: Some(ms),
            } => write!(f, "http (every {ms}ms)"),
            SourceKind::HttpPolled { interval_ms: None } => write!(f, "http (polled)"),
            SourceKind::Comm => write!(f, "comm"),
        }
    }
}

/// Recognised scheme markers, in match order.
const SCHEMES: &[(&str, SourceKind)] = &[
    ("sio://", SourceKind::PubSub),
    ("ws://", SourceKind::Stream),
    ("wss://", SourceKind::Stream),
    ("http://", SourceKind::HttpOnce),
    ("https://", SourceKind::HttpOnce),
    ("comm://", SourceKind::Comm),
];

/// Classify a connection string by the first scheme marker it contains.
///
/// Matching is substring-based, so a marker anywhere in the string counts.
pub fn classify(url: &str) -> Result<SourceKind, SourceError> {
    SCHEMES
        .iter()
        .find(|(marker, _)| url.contains(marker))
        .map(|(_, kind)| *kind)
        .ok_or_else(|| SourceError::UnrecognizedSource(url.to_string()))
}

// ---------------------------------------------------------------------------
// ConnectionDescriptor
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    pub url: String,
    pub kind: SourceKind,
}

impl ConnectionDescriptor {
    pub fn parse(url: &str) -> Result<Self, SourceError> {
        let kind = classify(url)?;
        Ok(Self {
            url: url.to_string(),
            kind,
        })
    }

    /// Attach a polling period. Only HTTP descriptors are affected; a zero
    /// period keeps the descriptor a one-shot fetch.
    pub fn with_repeat(mut self, repeat_ms: u64) -> Self {
        if self.kind.is_http() {
            self.kind = if repeat_ms > 0 {
                SourceKind::HttpPolled {
                    interval_ms: Some(repeat_ms),
                }
            } else {
                SourceKind::HttpOnce
            };
        }
        self
    }
}
