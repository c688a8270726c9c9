//! Layered configuration: defaults, then a JSON file, then `PSPFEED_*` env vars.

use anyhow::{bail, Context};
use figment::providers::{Env, Format, Json, Serialized};
use figment::Figment;
use pf_export::BackoffSchedule;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "pspfeed.json";
pub const ENV_PREFIX: &str = "PSPFEED_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Default tracing filter; `RUST_LOG` wins when set.
    pub log_level: String,
    pub http_timeout_secs: u64,
    /// Key unwrapped from each pub/sub message.
    pub envelope_field: String,
    /// Engine.IO endpoint path on pub/sub servers.
    pub socketio_path: String,
    pub backoff_base_ms: u64,
    pub backoff_ceiling_ms: u64,
    /// Where downloads go. Defaults to the user's download directory.
    pub export_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            http_timeout_secs: 30,
            envelope_field: pf_source::DEFAULT_ENVELOPE_FIELD.to_string(),
            socketio_path: "socket.io".to_string(),
            backoff_base_ms: pf_export::backoff::DEFAULT_BASE_MS,
            backoff_ceiling_ms: pf_export::backoff::DEFAULT_CEILING_MS,
            export_dir: None,
        }
    }
}

impl Config {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn backoff(&self) -> BackoffSchedule {
        BackoffSchedule::new(self.backoff_base_ms, self.backoff_ceiling_ms)
    }
}

/// Providers in precedence order. `file` is optional; a missing file adds nothing.
pub fn figment(file: &Path) -> Figment {
    Figment::from(Serialized::defaults(Config::default()))
        .merge(Json::file(file))
        .merge(Env::prefixed(ENV_PREFIX))
}

/// Load configuration. An explicit `path` must exist; otherwise
/// `pspfeed.json` in the working directory is used when present.
pub fn load(path: Option<&Path>) -> anyhow::Result<Config> {
    let file = match path {
        Some(p) if !p.exists() => bail!("config file not found: {}", p.display()),
        Some(p) => p.to_path_buf(),
        None => PathBuf::from(DEFAULT_CONFIG_FILE),
    };
    figment(&file)
        .extract()
        .with_context(|| format!("invalid configuration ({})", file.display()))
}
