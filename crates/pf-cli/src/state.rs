//! State shared by all commands.

use crate::config::Config;
use pf_export::{DirectoryTarget, Exporter, SystemClipboard, ViewHost};
use pf_source::pubsub::PubSubHub;
use pf_source::AdapterOptions;
use std::path::PathBuf;
use std::sync::Arc;

pub struct AppState {
    pub config: Config,

    /// Shared Socket.IO connections for every pub/sub adapter.
    pub hub: PubSubHub,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let hub = PubSubHub::with_path(config.socketio_path.clone());
        Self { config, hub }
    }

    /// Adapter options with the configured defaults filled in.
    pub fn adapter_options(&self) -> AdapterOptions {
        AdapterOptions {
            envelope_field: Some(self.config.envelope_field.clone()),
            timeout: Some(self.config.http_timeout()),
            ..AdapterOptions::default()
        }
    }

    /// Exporter writing downloads to `out`, else the configured or user
    /// download directory.
    pub fn exporter(
        &self,
        host: Arc<dyn ViewHost>,
        out: Option<PathBuf>,
    ) -> anyhow::Result<Exporter> {
        let files = match out.or_else(|| self.config.export_dir.clone()) {
            Some(dir) => DirectoryTarget::new(dir),
            None => DirectoryTarget::downloads()?,
        };
        Ok(
            Exporter::new(host, Arc::new(SystemClipboard), Arc::new(files))
                .with_schedule(self.config.backoff()),
        )
    }
}
