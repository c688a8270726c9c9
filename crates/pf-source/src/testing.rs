//! Test helpers: channel-backed sink/observer and a local listener.

use pf_core::update::{ErrorObserver, UpdatePayload, UpdateSink};
use pf_core::SourceError;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

pub struct ChannelSink(UnboundedSender<UpdatePayload>);

impl UpdateSink for ChannelSink {
    fn apply(&self, update: UpdatePayload) {
        let _ = self.0.send(update);
    }
}

pub struct ChannelObserver(UnboundedSender<String>);

impl ErrorObserver for ChannelObserver {
    fn on_error(&self, error: &SourceError) {
        let _ = self.0.send(error.to_string());
    }
}

pub fn channel_sink() -> (Arc<ChannelSink>, UnboundedReceiver<UpdatePayload>) {
    let (tx, rx) = unbounded_channel();
    (Arc::new(ChannelSink(tx)), rx)
}

pub fn channel_observer() -> (Arc<ChannelObserver>, UnboundedReceiver<String>) {
    let (tx, rx) = unbounded_channel();
    (Arc::new(ChannelObserver(tx)), rx)
}

/// Receive the next item or panic after five seconds.
pub async fn next<T>(rx: &mut UnboundedReceiver<T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for item")
        .expect("channel closed")
}

/// Assert nothing arrives within `wait`.
pub async fn assert_quiet<T: std::fmt::Debug>(rx: &mut UnboundedReceiver<T>, wait: Duration) {
    if let Ok(Some(item)) = tokio::time::timeout(wait, rx.recv()).await {
        panic!("unexpected item: {item:?}");
    }
}

/// Bind an ephemeral local port and return the listener with its `host:port`.
pub async fn listen() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    (listener, addr)
}

/// A `host:port` with nothing listening on it.
pub async fn dead_addr() -> String {
    let (listener, addr) = listen().await;
    drop(listener);
    addr
}
