//! pf-export: copy and download exports. Artifact producers, readiness polling, CSV encoding.

pub mod action;
pub mod backoff;
pub mod csv;
pub mod encode;
pub mod poller;
pub mod producer;
pub mod slot;

use thiserror::Error;

pub use action::{
    ClipboardTarget, DirectoryTarget, ExportAction, ExportReport, ExportTicket, Exporter, FileTarget,
    SystemClipboard,
};
pub use backoff::BackoffSchedule;
pub use poller::{PollOutcome, ReadinessPoller};
pub use producer::{producer_for, ArtifactProducer, SnapshotHost, ViewHost, VisualCapture};
pub use slot::{readiness_slot, SlotReader, SlotWriter};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("timed out after {waited_ms}ms waiting for artifact")]
    Timeout { waited_ms: u64 },
    #[error("artifact production failed: {0}")]
    Produce(String),
    #[error("image error: {0}")]
    Image(String),
    #[error("clipboard error: {0}")]
    Clipboard(String),
    #[error("export task failed: {0}")]
    Task(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<image::ImageError> for ExportError {
    fn from(e: image::ImageError) -> Self {
        ExportError::Image(e.to_string())
    }
}
