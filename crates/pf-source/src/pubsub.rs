//! PubSub adapter: one named channel on a shared Socket.IO connection (`sio://`).

use crate::socketio::{self, HubEvent};
use crate::{decode, AdapterHandle, Delivery, SourceAdapter, DEFAULT_ENVELOPE_FIELD};
use pf_core::source::SourceKind;
use pf_core::update::{ErrorObserver, UpdateSink};
use pf_core::SourceError;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const DEFAULT_SOCKETIO_PATH: &str = "socket.io";
const CHANNEL_CAPACITY: usize = 1024;

struct SharedConnection {
    tx: broadcast::Sender<HubEvent>,
    task: JoinHandle<()>,
}

type Connections = Arc<Mutex<HashMap<String, SharedConnection>>>;

/// Shares one Socket.IO connection per url between every subscriber.
///
/// The connection is opened by the first subscriber and closes itself once
/// the last subscriber is gone. A closed connection leaves the hub before
/// its subscribers hear about it, so a later subscriber always gets a fresh
/// connection.
#[derive(Clone)]
pub struct PubSubHub {
    connections: Connections,
    path: String,
}

impl Default for PubSubHub {
    fn default() -> Self {
        Self::new()
    }
}

impl PubSubHub {
    pub fn new() -> Self {
        Self::with_path(DEFAULT_SOCKETIO_PATH)
    }

    /// Use a non-default server mount path (default `socket.io`).
    pub fn with_path(path: impl Into<String>) -> Self {
        Self {
            connections: Arc::new(Mutex::new(HashMap::new())),
            path: path.into(),
        }
    }

    /// Subscribe to every event on the connection for `url`, opening it if needed.
    pub fn subscribe(&self, url: &str) -> Result<broadcast::Receiver<HubEvent>, SourceError> {
        let mut connections = self
            .connections
            .lock()
            .map_err(|e| SourceError::Config(format!("pub/sub hub poisoned: {e}")))?;

        if let Some(conn) = connections.get(url) {
            if !conn.task.is_finished() {
                return Ok(conn.tx.subscribe());
            }
        }

        let endpoint = socketio::endpoint(url, &self.path)?;
        let (tx, rx) = broadcast::channel(CHANNEL_CAPACITY);
        let task = tokio::spawn(run_shared(
            self.connections.clone(),
            url.to_string(),
            endpoint,
            tx.clone(),
        ));
        connections.insert(url.to_string(), SharedConnection { tx, task });
        Ok(rx)
    }

    /// Number of shared connections held by the hub.
    pub fn connection_count(&self) -> usize {
        self.connections.lock().map(|c| c.len()).unwrap_or(0)
    }
}

/// Run one connection, then drop it from the hub and notify whoever is still
/// subscribed. Both happen under the hub lock so no subscriber can attach to
/// a connection that has already ended.
async fn run_shared(
    connections: Connections,
    url: String,
    endpoint: socketio::Endpoint,
    tx: broadcast::Sender<HubEvent>,
) {
    let result = socketio::run_connection(&url, &endpoint, &tx).await;

    let mut connections = connections.lock().unwrap_or_else(|e| e.into_inner());
    connections.remove(&url);
    match result {
        Ok(()) => {
            debug!(url = %url, "pub/sub connection idle, closing");
            // Someone may have subscribed after the last check.
            if tx.receiver_count() > 0 {
                let _ = tx.send(HubEvent::Disconnected("connection closed".to_string()));
            }
        }
        Err(e) => {
            warn!(url = %url, "pub/sub connection ended: {e}");
            let _ = tx.send(HubEvent::Disconnected(e.to_string()));
        }
    }
}

/// Delivers the unwrapped body of every message on one channel.
pub struct PubSubAdapter {
    url: String,
    channel: String,
    envelope_field: String,
    record_mode: bool,
    hub: PubSubHub,
    started: bool,
}

impl PubSubAdapter {
    pub fn new(
        url: impl Into<String>,
        channel: impl Into<String>,
        record_mode: bool,
        hub: PubSubHub,
    ) -> Self {
        Self {
            url: url.into(),
            channel: channel.into(),
            envelope_field: DEFAULT_ENVELOPE_FIELD.to_string(),
            record_mode,
            hub,
            started: false,
        }
    }

    pub fn with_envelope_field(mut self, field: impl Into<String>) -> Self {
        self.envelope_field = field.into();
        self
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }
}

impl SourceAdapter for PubSubAdapter {
    fn url(&self) -> &str {
        &self.url
    }

    fn kind(&self) -> SourceKind {
        SourceKind::PubSub
    }

    fn start(
        &mut self,
        sink: Arc<dyn UpdateSink>,
        observer: Arc<dyn ErrorObserver>,
    ) -> Result<AdapterHandle, SourceError> {
        if self.started {
            return Err(SourceError::AlreadyStarted(self.url.clone()));
        }
        let rx = self.hub.subscribe(&self.url)?;
        self.started = true;

        let delivery = Delivery::new(self.record_mode, sink, observer);
        let url = self.url.clone();
        let channel = self.channel.clone();
        let envelope = self.envelope_field.clone();
        let task = tokio::spawn(async move { forward(rx, &url, &channel, &envelope, &delivery).await });
        Ok(AdapterHandle::new(&self.url, task))
    }
}

/// Deliver events for `channel` until the connection goes away.
async fn forward(
    mut rx: broadcast::Receiver<HubEvent>,
    url: &str,
    channel: &str,
    envelope: &str,
    delivery: &Delivery,
) {
    loop {
        match rx.recv().await {
            Ok(HubEvent::Message { event, data }) if event == channel => {
                delivery.deliver(decode::take_field(url, data, envelope));
            }
            Ok(HubEvent::Message { .. }) => {}
            Ok(HubEvent::Disconnected(reason)) => {
                delivery.report(&SourceError::connection(url, reason));
                break;
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(url = %url, channel = %channel, skipped, "subscriber lagging, messages dropped");
                delivery.report(&SourceError::connection(
                    url,
                    format!("{skipped} messages dropped"),
                ));
            }
            Err(RecvError::Closed) => break,
        }
    }
}
