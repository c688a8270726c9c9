//! pf-source: Source adapters: WebSocket stream, Socket.IO channel, polled HTTP.
//!
//! Every adapter decodes its own wire format and then hands the result to
//! the same delivery rule ([`pf_core::update::dispatch`]), so sinks never
//! see which kind of source produced an update.

pub mod decode;
pub mod http;
pub mod pubsub;
pub mod socketio;
pub mod stream;

#[cfg(test)]
pub(crate) mod testing;

use pf_core::source::{ConnectionDescriptor, SourceKind};
use pf_core::update::{dispatch, ErrorObserver, UpdateSink};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

pub use pf_core::SourceError;

use crate::http::HttpAdapter;
use crate::pubsub::{PubSubAdapter, PubSubHub};
use crate::stream::StreamAdapter;

/// Default key unwrapped from every pub/sub message.
pub const DEFAULT_ENVELOPE_FIELD: &str = "payload";

/// One data-source connection feeding one sink.
pub trait SourceAdapter: Send {
    fn url(&self) -> &str;

    fn kind(&self) -> SourceKind;

    /// Spawn the adapter's connection task. Must run inside a Tokio runtime.
    /// Fails with [`SourceError::AlreadyStarted`] on a second call.
    fn start(
        &mut self,
        sink: Arc<dyn UpdateSink>,
        observer: Arc<dyn ErrorObserver>,
    ) -> Result<AdapterHandle, SourceError>;
}

/// Handle to a started adapter. Dropping it leaves the adapter running for
/// the rest of the session; `abort` tears the connection down.
#[derive(Debug)]
pub struct AdapterHandle {
    url: String,
    task: JoinHandle<()>,
}

impl AdapterHandle {
    pub(crate) fn new(url: &str, task: JoinHandle<()>) -> Self {
        Self {
            url: url.to_string(),
            task,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn abort(&self) {
        tracing::debug!(url = %self.url, "stopping adapter");
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait until the adapter stops on its own (peer close, single fetch done).
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            if e.is_panic() {
                tracing::error!(url = %self.url, "adapter task panicked: {e}");
            }
        }
    }
}

/// Transport parameters for [`build_adapter`]. Each adapter only reads the
/// fields that apply to it.
#[derive(Debug, Clone, Default)]
pub struct AdapterOptions {
    /// Stream: message sent once when the socket opens.
    pub send: Option<String>,
    /// PubSub: channel (event name) to subscribe to.
    pub channel: Option<String>,
    /// PubSub: key unwrapped from each message. Defaults to `payload`.
    pub envelope_field: Option<String>,
    /// HTTP: narrow the response body to this top-level field.
    pub field: Option<String>,
    /// HTTP: request timeout.
    pub timeout: Option<Duration>,
    /// Wrap each payload as a one-record batch.
    pub record_mode: bool,
}

/// Build the adapter matching a classified descriptor.
pub fn build_adapter(
    descriptor: &ConnectionDescriptor,
    options: AdapterOptions,
    hub: &PubSubHub,
) -> Result<Box<dyn SourceAdapter>, SourceError> {
    let url = descriptor.url.clone();
    match descriptor.kind {
        SourceKind::Stream => Ok(Box::new(StreamAdapter::new(
            url,
            options.send,
            options.record_mode,
        ))),
        SourceKind::PubSub => {
            let channel = options
                .channel
                .filter(|c| !c.is_empty())
                .ok_or_else(|| SourceError::Config(format!("{url}: pub/sub source needs a channel")))?;
            let envelope = options
                .envelope_field
                .unwrap_or_else(|| DEFAULT_ENVELOPE_FIELD.to_string());
            Ok(Box::new(
                PubSubAdapter::new(url, channel, options.record_mode, hub.clone())
                    .with_envelope_field(envelope),
            ))
        }
        SourceKind::HttpOnce => Ok(Box::new(HttpAdapter::new(
            url,
            options.field,
            options.record_mode,
            0,
            options.timeout,
        )?)),
        SourceKind::HttpPolled { interval_ms } => {
            let repeat = interval_ms.ok_or_else(|| {
                SourceError::Config(format!("{url}: polled source without an interval"))
            })?;
            Ok(Box::new(HttpAdapter::new(
                url,
                options.field,
                options.record_mode,
                repeat,
                options.timeout,
            )?))
        }
        SourceKind::Comm => Err(SourceError::UnsupportedSource(descriptor.kind.to_string())),
    }
}

// ---------------------------------------------------------------------------
// Delivery
// ---------------------------------------------------------------------------

/// Sink, observer and delivery mode bundled for a running adapter.
#[derive(Clone)]
pub(crate) struct Delivery {
    record_mode: bool,
    sink: Arc<dyn UpdateSink>,
    observer: Arc<dyn ErrorObserver>,
}

impl Delivery {
    pub(crate) fn new(
        record_mode: bool,
        sink: Arc<dyn UpdateSink>,
        observer: Arc<dyn ErrorObserver>,
    ) -> Self {
        Self {
            record_mode,
            sink,
            observer,
        }
    }

    /// Dispatch a decoded payload, or report why it could not be decoded.
    pub(crate) fn deliver(&self, decoded: Result<Value, SourceError>) {
        match decoded {
            Ok(payload) => {
                let update = dispatch(self.record_mode, payload);
                tracing::trace!(rows = update.len(), "delivering update");
                self.sink.apply(update);
            }
            Err(e) => self.report(&e),
        }
    }

    pub(crate) fn report(&self, error: &SourceError) {
        self.observer.on_error(error);
    }
}
