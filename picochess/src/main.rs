//! Picochess command-line front-end.
//!
//! Bridges a DGT-board chess engine to the terminal:
//!
//! 1. **Default mode / `connect`**: starts the engine in DGT mode on the
//!    configured serial device, prints every engine line, and forwards typed
//!    lines to the engine. Ctrl-D or Ctrl-C disconnects.
//! 2. **`web`**: serves the current game as a PGN download.
//!
//! Runtime tunables are read from the environment (see [`config`]); flags
//! override them.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use engine_bridge::{BridgeController, LaunchProfile, PrivilegeMode};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;
mod terminal;

/// Top-level CLI arguments.
#[derive(Parser)]
#[command(name = "picochess", about = "Bridge a DGT board chess engine to the terminal")]
struct Cli {
    /// Optional subcommand. When omitted, runs `connect` with defaults.
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the engine and stream its output.
    Connect(ConnectArgs),
    /// Serve the current game as a PGN download.
    Web {
        /// Listen address (default `0.0.0.0:8888`).
        #[arg(long)]
        addr: Option<SocketAddr>,
        /// PGN file to serve.
        #[arg(long)]
        pgn: Option<PathBuf>,
    },
}

#[derive(Args, Default)]
struct ConnectArgs {
    /// Serial device of the DGT board.
    #[arg(short, long)]
    device: Option<String>,
    /// Start the engine through `su` and stop it by name.
    #[arg(long)]
    elevated: bool,
    /// Engine executable, overriding platform detection.
    #[arg(long)]
    engine: Option<PathBuf>,
}

/// Install the tracing subscriber.
///
/// Logs go to a daily rolling file when `PICOCHESS_LOG_DIR` is set, otherwise
/// to stderr so they never mix with engine output on stdout. The returned guard
/// must live until exit to flush the file writer.
fn init_tracing() -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match config::get_log_dir() {
        Some(log_dir) => {
            std::fs::create_dir_all(&log_dir)
                .with_context(|| format!("failed to create log directory {}", log_dir.display()))?;
            let file_appender = tracing_appender::rolling::daily(&log_dir, "picochess");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            tracing_subscriber::registry()
                .with(
                    fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(false)
                        .with_target(true)
                        .with_line_number(true),
                )
                .with(filter)
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(std::io::stderr))
                .with(filter)
                .init();
            Ok(None)
        }
    }
}

async fn handle_connect(args: ConnectArgs) -> anyhow::Result<()> {
    let device = args.device.unwrap_or_else(config::get_device);
    let mode = if args.elevated {
        PrivilegeMode::Elevated
    } else {
        PrivilegeMode::Direct
    };

    let mut profile = LaunchProfile::default();
    if let Some(engine) = args.engine.or_else(config::get_engine_path) {
        profile = profile.with_engine_path(engine);
    }

    let sink = Arc::new(terminal::TerminalSink::new());
    let mut controller = BridgeController::new(profile, config::bridge_config(), sink);

    terminal::run_session(&mut controller, &device, mode)
        .await
        .context("engine session failed")
}

async fn handle_web(addr: Option<SocketAddr>, pgn: Option<PathBuf>) -> anyhow::Result<()> {
    let addr = addr.unwrap_or_else(config::get_web_addr);
    let pgn = pgn.unwrap_or_else(config::get_pgn_path);

    tracing::info!("Serving {} on http://{}", pgn.display(), addr);
    picochess_web::serve(addr, pgn)
        .await
        .context("web server failed")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _guard = init_tracing()?;

    let cli = Cli::parse();
    tracing::info!("Starting Picochess...");

    match cli.command {
        Some(Commands::Connect(args)) => handle_connect(args).await,
        Some(Commands::Web { addr, pgn }) => handle_web(addr, pgn).await,
        None => handle_connect(ConnectArgs::default()).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_connect_flags() {
        let cli = Cli::try_parse_from([
            "picochess",
            "connect",
            "--device",
            "/dev/ttyACM0",
            "--elevated",
            "--engine",
            "/opt/sf",
        ])
        .unwrap();

        match cli.command {
            Some(Commands::Connect(args)) => {
                assert_eq!(args.device.as_deref(), Some("/dev/ttyACM0"));
                assert!(args.elevated);
                assert_eq!(args.engine, Some(PathBuf::from("/opt/sf")));
            }
            _ => panic!("expected connect subcommand"),
        }
    }

    #[test]
    fn test_parse_web_flags() {
        let cli =
            Cli::try_parse_from(["picochess", "web", "--addr", "127.0.0.1:9000"]).unwrap();

        match cli.command {
            Some(Commands::Web { addr, pgn }) => {
                assert_eq!(addr, Some("127.0.0.1:9000".parse().unwrap()));
                assert!(pgn.is_none());
            }
            _ => panic!("expected web subcommand"),
        }
    }

    #[test]
    fn test_no_subcommand_defaults_to_connect() {
        let cli = Cli::try_parse_from(["picochess"]).unwrap();
        assert!(cli.command.is_none());
    }
}
