//! `pspfeed export <input>`: copy or download a snapshot of rows or an image.

use crate::state::AppState;
use anyhow::Context;
use clap::{Args, ValueEnum};
use pf_core::artifact::ViewMode;
use pf_export::{ExportAction, ExportError, SnapshotHost};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ActionArg {
    Copy,
    Download,
}

impl From<ActionArg> for ExportAction {
    fn from(arg: ActionArg) -> Self {
        match arg {
            ActionArg::Copy => ExportAction::Copy,
            ActionArg::Download => ExportAction::Download,
        }
    }
}

#[derive(Debug, Args)]
pub struct ExportArgs {
    /// JSON array of rows for the grid view, or an image file for chart views.
    pub input: PathBuf,

    #[arg(
        long,
        default_value = "hypergrid",
        help = "View plugin name; only `hypergrid` exports CSV"
    )]
    pub view: String,

    #[arg(long, value_enum, help = "What to do with the artifact")]
    pub action: ActionArg,

    #[arg(long, value_name = "DIR", help = "Download directory override")]
    pub out: Option<PathBuf>,
}

/// Build a static host for `input` according to the view mode.
pub fn load_host(input: &Path, mode: ViewMode) -> anyhow::Result<SnapshotHost> {
    let bytes =
        std::fs::read(input).with_context(|| format!("failed to read {}", input.display()))?;
    match mode {
        ViewMode::Tabular => {
            let rows: Vec<Value> = serde_json::from_slice(&bytes)
                .with_context(|| format!("{} is not a JSON array", input.display()))?;
            Ok(SnapshotHost::tabular(rows))
        }
        ViewMode::Visual => Ok(SnapshotHost::from_image(bytes)?),
    }
}

pub async fn run(state: &AppState, args: ExportArgs) -> anyhow::Result<()> {
    let mode = ViewMode::from_view_attribute(&args.view);
    let host = load_host(&args.input, mode)?;
    let exporter = state.exporter(Arc::new(host), args.out)?;

    let ticket = exporter.trigger(args.action.into());
    match ticket.wait().await {
        Ok(report) => {
            match &report.saved_to {
                Some(path) => println!("{}", path.display()),
                None => info!(id = %report.id, "copied {} to clipboard", report.artifact.file_name()),
            }
            Ok(())
        }
        Err(e @ ExportError::Timeout { .. }) => Err(e.into()),
        Err(e) => Err(anyhow::Error::new(e).context("export failed")),
    }
}
