//! pf-core: Shared types for pspfeed
//!
//! This crate has zero internal crate dependencies and defines the
//! canonical types used across all other pf-* crates: source
//! classification, the update contract between adapters and widgets,
//! and the export artifacts.

pub mod artifact;
pub mod source;
pub mod update;

use thiserror::Error;

/// MIME type the hosting widget registers its payloads under.
pub const MIME_TYPE: &str = "application/psp+json";

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("unrecognized source: {0}")]
    UnrecognizedSource(String),
    #[error("no adapter available for {0} sources")]
    UnsupportedSource(String),
    #[error("connection error: url={url}, error={message}")]
    Connection { url: String, message: String },
    #[error("decode error: url={url}, error={message}")]
    Decode { url: String, message: String },
    #[error("adapter already started: {0}")]
    AlreadyStarted(String),
    #[error("configuration error: {0}")]
    Config(String),
}

impl SourceError {
    pub fn connection(url: &str, message: impl ToString) -> Self {
        Self::Connection {
            url: url.to_string(),
            message: message.to_string(),
        }
    }

    pub fn decode(url: &str, message: impl ToString) -> Self {
        Self::Decode {
            url: url.to_string(),
            message: message.to_string(),
        }
    }
}

/// Re-export commonly used types.
pub mod prelude {
    pub use crate::artifact::{Artifact, ViewMode};
    pub use crate::source::{classify, ConnectionDescriptor, SourceKind};
    pub use crate::update::{dispatch, ErrorObserver, LogObserver, UpdatePayload, UpdateSink};
    pub use crate::SourceError;
}
