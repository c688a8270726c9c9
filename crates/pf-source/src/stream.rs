//! Stream adapter: raw WebSocket feed (`ws://`, `wss://`).

use crate::{decode, AdapterHandle, Delivery, SourceAdapter};
use futures_util::{SinkExt, StreamExt};
use pf_core::source::SourceKind;
use pf_core::update::{ErrorObserver, UpdateSink};
use pf_core::SourceError;
use std::sync::Arc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info};

/// Connects once, optionally sends one outbound message, then delivers every
/// inbound frame. There is no reconnection: a dropped socket ends the adapter
/// after reporting a connection error.
#[derive(Debug)]
pub struct StreamAdapter {
    url: String,
    send: Option<String>,
    record_mode: bool,
    started: bool,
}

impl StreamAdapter {
    pub fn new(url: impl Into<String>, send: Option<String>, record_mode: bool) -> Self {
        Self {
            url: url.into(),
            send: send.filter(|s| !s.is_empty()),
            record_mode,
            started: false,
        }
    }
}

impl SourceAdapter for StreamAdapter {
    fn url(&self) -> &str {
        &self.url
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Stream
    }

    fn start(
        &mut self,
        sink: Arc<dyn UpdateSink>,
        observer: Arc<dyn ErrorObserver>,
    ) -> Result<AdapterHandle, SourceError> {
        if self.started {
            return Err(SourceError::AlreadyStarted(self.url.clone()));
        }
        self.started = true;

        let delivery = Delivery::new(self.record_mode, sink, observer);
        let url = self.url.clone();
        let send = self.send.clone();
        let task = tokio::spawn(async move {
            if let Err(e) = run_stream(&url, send, &delivery).await {
                delivery.report(&e);
            }
        });
        Ok(AdapterHandle::new(&self.url, task))
    }
}

/// Runs until the socket closes; always ends with the reason as an error.
async fn run_stream(url: &str, send: Option<String>, delivery: &Delivery) -> Result<(), SourceError> {
    info!(url = %url, "connecting to stream source");
    let (ws, _response) = tokio_tungstenite::connect_async(url)
        .await
        .map_err(|e| SourceError::connection(url, e))?;
    info!(url = %url, "stream source connected");

    let (mut write, mut read) = ws.split();

    if let Some(message) = send {
        write
            .send(Message::Text(message))
            .await
            .map_err(|e| SourceError::connection(url, format!("failed to send: {e}")))?;
        debug!(url = %url, "outbound message sent");
    }

    while let Some(frame) = read.next().await {
        match frame {
            Ok(Message::Text(text)) => delivery.deliver(decode::decode_text(url, &text)),
            Ok(Message::Binary(bytes)) => delivery.deliver(decode::decode_binary(url, &bytes)),
            Ok(Message::Close(frame)) => {
                let reason = frame
                    .map(|f| format!("closed by peer: {} {}", f.code, f.reason))
                    .unwrap_or_else(|| "closed by peer".to_string());
                return Err(SourceError::connection(url, reason));
            }
            // Pings are answered by tungstenite on the next read.
            Ok(_) => {}
            Err(e) => return Err(SourceError::connection(url, e)),
        }
    }

    Err(SourceError::connection(url, "connection dropped"))
}
