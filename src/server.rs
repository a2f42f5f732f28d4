//! TCP Server
//!
//! Owns the listener and the shared processor, spawns one task per client
//! and stops them all when the shutdown future resolves.

use crate::commands::{CommandProcessor, ProcessHost};
use crate::config::Config;
use crate::connection::{handle_connection, ConnectionStats, SharedProcessor};
use crate::persistence::FileSnapshot;
use crate::storage::Store;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

pub struct Server {
    listener: TcpListener,
    processor: SharedProcessor,
    stats: Arc<ConnectionStats>,
}

impl Server {
    /// Binds the listener and prepares the store.
    ///
    /// With `load_on_startup` set, an existing snapshot file is restored
    /// first. A snapshot that cannot be read is logged and the server starts
    /// empty; only a bind failure is returned.
    pub async fn bind(config: &Config) -> io::Result<Self> {
        let listener = TcpListener::bind(config.bind_address()).await?;
        let stats = Arc::new(ConnectionStats::new());

        let mut processor = CommandProcessor::new(
            Store::new(),
            FileSnapshot::new(&config.snapshot_path),
            ProcessHost::new(Arc::clone(&stats)),
        );

        if config.load_on_startup {
            match processor.load_snapshot() {
                Ok(Some(_)) => {}
                Ok(None) => debug!(path = %config.snapshot_path.display(), "No snapshot to load"),
                Err(e) => warn!(error = %e, "Could not load snapshot, starting empty"),
            }
        }

        Ok(Self {
            listener,
            processor: Arc::new(Mutex::new(processor)),
            stats,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn stats(&self) -> Arc<ConnectionStats> {
        Arc::clone(&self.stats)
    }

    pub fn processor(&self) -> SharedProcessor {
        Arc::clone(&self.processor)
    }

    /// Accepts clients until `shutdown` resolves, then waits for every
    /// connection task to finish.
    pub async fn run(self, shutdown: impl Future<Output = ()>) {
        let (notify_tx, notify_rx) = watch::channel(false);
        let mut connections = JoinSet::new();
        tokio::pin!(shutdown);

        info!(addr = ?self.listener.local_addr().ok(), "Ready to accept connections");

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        connections.spawn(handle_connection(
                            stream,
                            addr,
                            Arc::clone(&self.processor),
                            Arc::clone(&self.stats),
                            notify_rx.clone(),
                        ));
                    }
                    Err(e) => error!(error = %e, "Failed to accept connection"),
                },
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }

        info!(
            active = connections.len(),
            "Shutting down, closing client connections"
        );
        // Receivers outlive the send, so this cannot fail while tasks run.
        let _ = notify_tx.send(true);
        while connections.join_next().await.is_some() {}

        info!("Server shutdown complete");
    }
}
