//! Update contract: what adapters hand to a visualization, and where they report failures.

use crate::SourceError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One update for the visualization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum UpdatePayload {
    /// Ordered sequence of records.
    Batch(Vec<Value>),
    /// A single record, or any non-array payload passed through unchanged.
    Record(Value),
}

impl UpdatePayload {
    /// Flatten into a sequence of records.
    pub fn into_rows(self) -> Vec<Value> {
        match self {
            UpdatePayload::Batch(rows) => rows,
            UpdatePayload::Record(record) => vec![record],
        }
    }

    pub fn len(&self) -> usize {
        match self {
            UpdatePayload::Batch(rows) => rows.len(),
            UpdatePayload::Record(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Apply the delivery rule shared by every adapter.
///
/// In record mode each payload is one record and is wrapped as a batch of
/// one. Otherwise the payload is handed over as-is.
pub fn dispatch(record_mode: bool, payload: Value) -> UpdatePayload {
    if record_mode {
        return UpdatePayload::Batch(vec![payload]);
    }
    match payload {
        Value::Array(rows) => UpdatePayload::Batch(rows),
        other => UpdatePayload::Record(other),
    }
}

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

/// The capability a visualization exposes to receive data.
pub trait UpdateSink: Send + Sync {
    fn apply(&self, update: UpdatePayload);
}

/// Receives connection and decode failures from adapters.
pub trait ErrorObserver: Send + Sync {
    fn on_error(&self, error: &SourceError);
}

/// Observer that reports every failure through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl ErrorObserver for LogObserver {
    fn on_error(&self, error: &SourceError) {
        match error {
            SourceError::Decode { .. } => tracing::warn!("dropped update: {error}"),
            _ => tracing::error!("{error}"),
        }
    }
}
