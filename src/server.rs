//! TCP acceptance shell.
//!
//! Binds the listener, spawns one supervised task per client and stops
//! them all on shutdown. Every session task lives in a [`JoinSet`], so no
//! connection outlives [`Server::run`].

use crate::commands::CommandHandler;
use crate::config::ServerConfig;
use crate::connection::{handle_connection, ConnectionStats};
use crate::storage::StorageEngine;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info, warn};

/// Pause after a failed `accept`, so a persistent error such as running out
/// of file descriptors does not spin the loop.
pub const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// A bound server, ready to accept connections.
#[derive(Debug)]
pub struct Server {
    listener: TcpListener,
    config: ServerConfig,
    storage: Arc<StorageEngine>,
    stats: Arc<ConnectionStats>,
}

impl Server {
    /// Binds to `config.bind_address()` with a fresh, empty store.
    pub async fn bind(config: ServerConfig) -> io::Result<Self> {
        let listener = TcpListener::bind(config.bind_address()).await?;
        Ok(Self::from_listener(listener, config))
    }

    /// Wraps an already bound listener.
    pub fn from_listener(listener: TcpListener, config: ServerConfig) -> Self {
        Self {
            listener,
            config,
            storage: Arc::new(StorageEngine::new()),
            stats: Arc::new(ConnectionStats::new()),
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn storage(&self) -> &Arc<StorageEngine> {
        &self.storage
    }

    pub fn stats(&self) -> &Arc<ConnectionStats> {
        &self.stats
    }

    /// Accepts connections until `shutdown` resolves, then aborts and joins
    /// every open session.
    pub async fn run<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let Server {
            listener,
            config,
            storage,
            stats,
        } = self;

        let mut sessions = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        if let Err(e) = stream.set_nodelay(true) {
                            warn!(client = %addr, error = %e, "Failed to set TCP_NODELAY");
                        }
                        let handler = CommandHandler::with_config(Arc::clone(&storage), &config);
                        sessions.spawn(handle_connection(
                            stream,
                            addr,
                            handler,
                            Arc::clone(&stats),
                            config.max_buffer_bytes,
                        ));
                    }
                    Err(e) => accept_failed(&e).await,
                },
                Some(joined) = sessions.join_next(), if !sessions.is_empty() => {
                    if let Err(e) = joined {
                        if e.is_panic() {
                            error!(error = %e, "Connection task panicked");
                        }
                    }
                }
                _ = &mut shutdown => {
                    info!("Shutdown signal received, stopping server...");
                    break;
                }
            }
        }

        let open = sessions.len();
        sessions.shutdown().await;
        debug!(sessions = open, "Connection tasks stopped");

        info!(
            connections = stats.connections_accepted.load(Ordering::Relaxed),
            commands = stats.commands_processed.load(Ordering::Relaxed),
            keys = storage.len(),
            "Server stopped"
        );
    }
}

async fn accept_failed(e: &io::Error) {
    error!(error = %e, "Failed to accept connection");
    sleep(ACCEPT_BACKOFF).await;
}
