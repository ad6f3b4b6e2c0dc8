//! respkv server binary.
//!
//! Parses the command line, sets up logging, binds the listener and serves
//! until Ctrl+C.

use clap::Parser;
use respkv::config::{ErrorReplyStyle, ServerConfig, UnknownCommandPolicy};
use respkv::protocol::frame::DEFAULT_MAX_BUFFER;
use respkv::Server;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// A minimal RESP key-value server (PING, ECHO, SET [PX], GET)
#[derive(Parser, Debug)]
#[command(name = "respkv", version, about, long_about = None)]
struct Cli {
    /// Host to bind to
    #[arg(short = 'H', long, default_value = respkv::DEFAULT_HOST)]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = respkv::DEFAULT_PORT)]
    port: u16,

    /// Reply for unrecognized commands
    #[arg(long, value_enum, default_value_t = UnknownCommandPolicy::Pong)]
    unknown_command: UnknownCommandPolicy,

    /// Encoding of argument errors: `simple` (+ERR) or `error` (-ERR)
    #[arg(long, value_enum, default_value_t = ErrorReplyStyle::Simple)]
    error_replies: ErrorReplyStyle,

    /// Per-connection cap on buffered request bytes. A bulk string declared
    /// longer than this is refused as soon as its header arrives
    #[arg(long, default_value_t = DEFAULT_MAX_BUFFER)]
    max_buffer_bytes: usize,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl From<Cli> for ServerConfig {
    fn from(cli: Cli) -> Self {
        Self {
            host: cli.host,
            port: cli.port,
            unknown_command: cli.unknown_command,
            error_replies: cli.error_replies,
            max_buffer_bytes: cli.max_buffer_bytes,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .with_target(false)
        .init();

    let config = ServerConfig::from(cli);

    let server = Server::bind(config.clone()).await?;
    info!(
        version = respkv::VERSION,
        unknown_command = ?config.unknown_command,
        error_replies = ?config.error_replies,
        "Listening on {}",
        server.local_addr()?
    );

    server.run(shutdown_signal()).await;

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        // Without a signal handler, run until killed
        error!("Failed to install Ctrl+C handler: {}", e);
        std::future::pending::<()>().await;
    }
}
