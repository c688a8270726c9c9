//! pspfeed: watch live data sources and export snapshots from the command line.

mod commands;
mod config;
mod state;

use clap::{Parser, Subcommand};
use commands::export::ExportArgs;
use commands::watch::WatchArgs;
use state::AppState;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "pspfeed",
    version,
    about = "Feed live data sources into a view and export what it shows"
)]
struct Cli {
    #[arg(
        long,
        global = true,
        value_name = "PATH",
        help = "JSON config file (default: ./pspfeed.json when present)"
    )]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print which kind of source a connection string names.
    Classify { url: String },
    /// Print every update from a source as one JSON line.
    Watch(WatchArgs),
    /// Copy or download a snapshot of rows or an image.
    Export(ExportArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = config::load(cli.config.as_deref())?;
    init_tracing(&config.log_level);

    let state = AppState::new(config);
    match cli.command {
        Command::Classify { url } => commands::classify::run(&url, &mut std::io::stdout()),
        Command::Watch(args) => commands::watch::run(&state, args).await,
        Command::Export(args) => commands::export::run(&state, args).await,
    }
}

/// Logs go to stderr so stdout stays machine-readable.
fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_watch_flags() {
        let cli = Cli::parse_from([
            "pspfeed",
            "watch",
            "http://host/data",
            "--field",
            "rows",
            "--repeat",
            "500",
            "--records",
        ]);
        let Command::Watch(args) = cli.command else {
            panic!("expected watch");
        };
        assert_eq!(args.field.as_deref(), Some("rows"));
        assert_eq!(args.repeat, Some(500));
        assert!(args.record_mode);
    }

    #[test]
    fn parses_export_with_global_config() {
        let cli = Cli::parse_from([
            "pspfeed",
            "export",
            "rows.json",
            "--action",
            "download",
            "--config",
            "alt.json",
        ]);
        assert_eq!(cli.config, Some(PathBuf::from("alt.json")));
        let Command::Export(args) = cli.command else {
            panic!("expected export");
        };
        assert_eq!(args.view, "hypergrid");
        assert_eq!(args.action, commands::export::ActionArg::Download);
    }
}
