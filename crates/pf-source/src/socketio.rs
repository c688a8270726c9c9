//! Minimal Socket.IO client over the Engine.IO v4 WebSocket transport.
//!
//! Only what a subscriber needs: the open handshake, heartbeat replies,
//! namespace connect and inbound `EVENT` packets. Acks and binary
//! attachments are ignored.

use futures_util::{SinkExt, StreamExt};
use pf_core::SourceError;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use url::Url;

const SIO_MARKER: &str = "sio://";

/// Event seen on a shared connection.
#[derive(Debug, Clone, PartialEq)]
pub enum HubEvent {
    Message { event: String, data: Value },
    Disconnected(String),
}

// ---------------------------------------------------------------------------
// Addressing
// ---------------------------------------------------------------------------

/// WebSocket endpoint and namespace for a `sio://` connection string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub ws_url: String,
    pub namespace: String,
}

/// `sio://host:port/ns?q=1` → `ws://host:port/<path>/?q=1&EIO=4&transport=websocket`, namespace `/ns`.
pub fn endpoint(url: &str, path: &str) -> Result<Endpoint, SourceError> {
    let start = url
        .find(SIO_MARKER)
        .ok_or_else(|| SourceError::UnrecognizedSource(url.to_string()))?;
    let rest = &url[start + SIO_MARKER.len()..];
    let mut parsed = Url::parse(&format!("ws://{rest}"))
        .map_err(|e| SourceError::Config(format!("{url}: invalid address: {e}")))?;

    let namespace = match parsed.path().trim_end_matches('/') {
        "" => "/".to_string(),
        ns => ns.to_string(),
    };

    parsed.set_path(&format!("/{}/", path.trim_matches('/')));
    parsed
        .query_pairs_mut()
        .append_pair("EIO", "4")
        .append_pair("transport", "websocket");

    Ok(Endpoint {
        ws_url: parsed.to_string(),
        namespace,
    })
}

// ---------------------------------------------------------------------------
// Packet codec
// ---------------------------------------------------------------------------

/// Engine.IO transport packet.
#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    Open(String),
    Close,
    Ping(String),
    Pong(String),
    Message(String),
    Upgrade,
    Noop,
}

pub fn parse_engine_packet(text: &str) -> Option<EnginePacket> {
    let mut chars = text.chars();
    let kind = chars.next()?;
    let body = chars.as_str().to_string();
    match kind {
        '0' => Some(EnginePacket::Open(body)),
        '1' => Some(EnginePacket::Close),
        '2' => Some(EnginePacket::Ping(body)),
        '3' => Some(EnginePacket::Pong(body)),
        '4' => Some(EnginePacket::Message(body)),
        '5' => Some(EnginePacket::Upgrade),
        '6' => Some(EnginePacket::Noop),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketPacketKind {
    Connect,
    Disconnect,
    Event,
    Ack,
    ConnectError,
    BinaryEvent,
    BinaryAck,
}

/// Socket.IO packet carried inside an Engine.IO message.
#[derive(Debug, Clone, PartialEq)]
pub struct SocketPacket {
    pub kind: SocketPacketKind,
    pub namespace: String,
    pub data: Option<Value>,
}

impl SocketPacket {
    /// Event name and first argument of an `EVENT` packet.
    pub fn into_event(self) -> Option<(String, Value)> {
        if self.kind != SocketPacketKind::Event {
            return None;
        }
        let Value::Array(mut args) = self.data? else {
            return None;
        };
        if args.is_empty() {
            return None;
        }
        let name = match args.remove(0) {
            Value::String(name) => name,
            _ => return None,
        };
        let data = if args.is_empty() {
            Value::Null
        } else {
            args.remove(0)
        };
        Some((name, data))
    }
}

/// Parse `<type>[<attachments>-][<nsp>,][<ack id>][<json>]`.
pub fn parse_socket_packet(text: &str) -> Result<SocketPacket, String> {
    let mut rest = text;
    let kind = match rest.chars().next() {
        Some('0') => SocketPacketKind::Connect,
        Some('1') => SocketPacketKind::Disconnect,
        Some('2') => SocketPacketKind::Event,
        Some('3') => SocketPacketKind::Ack,
        Some('4') => SocketPacketKind::ConnectError,
        Some('5') => SocketPacketKind::BinaryEvent,
        Some('6') => SocketPacketKind::BinaryAck,
        _ => return Err(format!("unknown socket.io packet: {text:?}")),
    };
    rest = &rest[1..];

    if matches!(kind, SocketPacketKind::BinaryEvent | SocketPacketKind::BinaryAck) {
        if let Some(dash) = rest.find('-') {
            rest = &rest[dash + 1..];
        }
    }

    let mut namespace = "/".to_string();
    if rest.starts_with('/') {
        let end = rest.find(',').unwrap_or(rest.len());
        namespace = rest[..end].to_string();
        rest = rest.get(end + 1..).unwrap_or("");
    }

    let ack_len = rest.chars().take_while(char::is_ascii_digit).count();
    rest = &rest[ack_len..];

    let data = if rest.is_empty() {
        None
    } else {
        Some(serde_json::from_str(rest).map_err(|e| format!("invalid packet data: {e}"))?)
    };

    Ok(SocketPacket {
        kind,
        namespace,
        data,
    })
}

pub fn connect_packet(namespace: &str) -> String {
    if namespace == "/" {
        "40".to_string()
    } else {
        format!("40{namespace},")
    }
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// Drive one shared connection, fanning events out on `tx`. Returns `Ok` once
/// every subscriber has gone away, otherwise the reason the socket ended.
pub async fn run_connection(
    url: &str,
    endpoint: &Endpoint,
    tx: &broadcast::Sender<HubEvent>,
) -> Result<(), SourceError> {
    info!(url = %url, endpoint = %endpoint.ws_url, "connecting to pub/sub source");
    let (ws, _response) = tokio_tungstenite::connect_async(endpoint.ws_url.as_str())
        .await
        .map_err(|e| SourceError::connection(url, e))?;
    let (mut write, mut read) = ws.split();

    while let Some(frame) = read.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => return Err(SourceError::connection(url, "closed by peer")),
            Ok(_) => continue,
            Err(e) => return Err(SourceError::connection(url, e)),
        };

        let reply = match parse_engine_packet(&text) {
            Some(EnginePacket::Open(_)) => Some(connect_packet(&endpoint.namespace)),
            Some(EnginePacket::Ping(probe)) => Some(format!("3{probe}")),
            Some(EnginePacket::Close) => {
                return Err(SourceError::connection(url, "server closed the session"))
            }
            Some(EnginePacket::Message(body)) => {
                handle_socket_packet(url, endpoint, &body, tx)?;
                if tx.receiver_count() == 0 {
                    return Ok(());
                }
                None
            }
            Some(_) => None,
            None => {
                debug!(url = %url, "ignoring unknown engine packet");
                None
            }
        };

        if let Some(reply) = reply {
            write
                .send(Message::Text(reply))
                .await
                .map_err(|e| SourceError::connection(url, e))?;
        }
    }

    Err(SourceError::connection(url, "connection dropped"))
}

fn handle_socket_packet(
    url: &str,
    endpoint: &Endpoint,
    body: &str,
    tx: &broadcast::Sender<HubEvent>,
) -> Result<(), SourceError> {
    let packet = match parse_socket_packet(body) {
        Ok(p) => p,
        Err(e) => {
            warn!(url = %url, "dropping socket.io packet: {e}");
            return Ok(());
        }
    };
    if packet.namespace != endpoint.namespace {
        return Ok(());
    }

    match packet.kind {
        SocketPacketKind::Connect => {
            info!(url = %url, namespace = %endpoint.namespace, "pub/sub namespace joined");
        }
        SocketPacketKind::ConnectError => {
            let reason = packet.data.map(|d| d.to_string()).unwrap_or_default();
            return Err(SourceError::connection(url, format!("namespace refused: {reason}")));
        }
        SocketPacketKind::Disconnect => {
            return Err(SourceError::connection(url, "namespace disconnected by server"));
        }
        SocketPacketKind::Event => {
            if let Some((event, data)) = packet.into_event() {
                // An error here only means no subscriber is listening right now.
                let _ = tx.send(HubEvent::Message { event, data });
            }
        }
        _ => {}
    }
    Ok(())
}
