//! `pspfeed watch <url>`: stream a source's updates to stdout as JSON lines.

use crate::state::AppState;
use clap::Args;
use pf_core::source::ConnectionDescriptor;
use pf_core::update::{LogObserver, UpdatePayload, UpdateSink};
use pf_source::build_adapter;
use std::io::Write;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Connection string (`ws://`, `wss://`, `sio://`, `http://`, `https://`).
    pub url: String,

    #[arg(long, help = "Message sent once when a stream socket opens")]
    pub send: Option<String>,

    #[arg(long, help = "Pub/sub channel to subscribe to")]
    pub channel: Option<String>,

    #[arg(long, help = "Narrow HTTP responses to this top-level field")]
    pub field: Option<String>,

    #[arg(
        long,
        value_name = "MS",
        help = "Re-issue HTTP requests on this period"
    )]
    pub repeat: Option<u64>,

    #[arg(long = "records", help = "Treat each message as one record")]
    pub record_mode: bool,
}

/// Writes every update as one JSON line.
pub struct JsonLinesSink<W> {
    out: Mutex<W>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    fn write(&self, update: &UpdatePayload) -> anyhow::Result<()> {
        let mut out = self
            .out
            .lock()
            .map_err(|e| anyhow::anyhow!("output poisoned: {e}"))?;
        serde_json::to_writer(&mut *out, update)?;
        out.write_all(b"\n")?;
        out.flush()?;
        Ok(())
    }
}

impl<W: Write + Send> UpdateSink for JsonLinesSink<W> {
    fn apply(&self, update: UpdatePayload) {
        if let Err(e) = self.write(&update) {
            warn!("failed to write update: {e}");
        }
    }
}

pub async fn run(state: &AppState, args: WatchArgs) -> anyhow::Result<()> {
    let mut descriptor = ConnectionDescriptor::parse(&args.url)?;
    if let Some(ms) = args.repeat {
        descriptor = descriptor.with_repeat(ms);
    }

    let options = pf_source::AdapterOptions {
        send: args.send,
        channel: args.channel,
        field: args.field,
        record_mode: args.record_mode,
        ..state.adapter_options()
    };
    let mut adapter = build_adapter(&descriptor, options, &state.hub)?;
    info!(url = %descriptor.url, kind = %descriptor.kind, "watching source");

    let sink = Arc::new(JsonLinesSink::new(std::io::stdout()));
    let handle = adapter.start(sink, Arc::new(LogObserver))?;

    tokio::select! {
        _ = handle.join() => info!(url = %descriptor.url, "source finished"),
        result = tokio::signal::ctrl_c() => {
            result?;
            info!(url = %descriptor.url, "interrupted");
        }
    }
    Ok(())
}
