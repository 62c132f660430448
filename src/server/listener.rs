//! TCP listener and bounded worker pool
//!
//! Every accepted socket gets its own task, but only `worker_count` of them
//! serve at once: the rest wait for a semaphore permit and are never
//! dropped. The registry and session store are built before binding and are
//! shared read-only with every worker.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::connection::{self, ConnectionContext, DEFAULT_MAX_LINE_BYTES};
use crate::config::Args;
use crate::registry::CommandRegistry;
use crate::session::SessionStore;
use crate::shutdown::ShutdownSignal;
use crate::types::Result;

/// Configuration for the listener
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    pub listen: SocketAddr,
    /// Connections served concurrently
    pub worker_count: usize,
    pub max_line_bytes: usize,
    /// Upper bound on draining in-flight connections at shutdown
    pub shutdown_grace: Duration,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 8888)),
            worker_count: 20,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

impl From<&Args> for ListenerConfig {
    fn from(args: &Args) -> Self {
        Self {
            listen: args.listen,
            worker_count: args.worker_count,
            max_line_bytes: args.max_line_bytes,
            shutdown_grace: args.shutdown_grace(),
        }
    }
}

/// Advisory connection counters
#[derive(Debug, Default)]
pub struct ListenerStats {
    accepted: AtomicU64,
    active: AtomicUsize,
    queued: AtomicUsize,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListenerStatsSnapshot {
    pub accepted: u64,
    pub active: usize,
    pub queued: usize,
}

impl ListenerStats {
    pub fn snapshot(&self) -> ListenerStatsSnapshot {
        ListenerStatsSnapshot {
            accepted: self.accepted.load(Ordering::Relaxed),
            active: self.active.load(Ordering::Relaxed),
            queued: self.queued.load(Ordering::Relaxed),
        }
    }
}

pub struct Listener {
    listener: TcpListener,
    config: ListenerConfig,
    ctx: ConnectionContext,
    stats: Arc<ListenerStats>,
}

impl Listener {
    /// Bind the listening socket; the registry must already be complete
    pub async fn bind(
        config: ListenerConfig,
        registry: Arc<CommandRegistry>,
        sessions: Arc<SessionStore>,
    ) -> Result<Self> {
        let listener = TcpListener::bind(config.listen).await?;
        let ctx = ConnectionContext::new(registry, sessions)
            .with_max_line_bytes(config.max_line_bytes);

        Ok(Self {
            listener,
            config,
            ctx,
            stats: Arc::new(ListenerStats::default()),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn stats(&self) -> Arc<ListenerStats> {
        Arc::clone(&self.stats)
    }

    /// Accept until `shutdown` fires, then drain in-flight connections
    pub async fn run(self, mut shutdown: ShutdownSignal) -> Result<()> {
        let Self {
            listener,
            config,
            ctx,
            stats,
        } = self;
        let permits = Arc::new(Semaphore::new(config.worker_count));
        let mut workers = JoinSet::new();

        info!(
            "Listening on {} ({} workers)",
            listener.local_addr()?,
            config.worker_count
        );

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        stats.accepted.fetch_add(1, Ordering::Relaxed);
                        stats.queued.fetch_add(1, Ordering::Relaxed);
                        debug!(%peer, "Accepted connection");

                        let permits = Arc::clone(&permits);
                        let ctx = ctx.clone();
                        let stats = Arc::clone(&stats);
                        let mut signal = shutdown.clone();
                        workers.spawn(async move {
                            let permit = tokio::select! {
                                permit = permits.acquire_owned() => permit,
                                _ = signal.recv() => {
                                    stats.queued.fetch_sub(1, Ordering::Relaxed);
                                    return;
                                }
                            };
                            stats.queued.fetch_sub(1, Ordering::Relaxed);
                            // Only fails once the semaphore is closed
                            let Ok(_permit) = permit else { return };

                            stats.active.fetch_add(1, Ordering::Relaxed);
                            let peer = peer.to_string();
                            connection::serve(stream, &peer, &ctx, signal).await;
                            stats.active.fetch_sub(1, Ordering::Relaxed);
                        });
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        // back off on fd exhaustion
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                },
                Some(joined) = workers.join_next(), if !workers.is_empty() => {
                    if let Err(e) = joined {
                        error!("Connection task failed: {}", e);
                    }
                }
            }
        }

        drop(listener);
        info!("Listener stopped, draining {} connections", workers.len());

        let drain = async {
            while let Some(joined) = workers.join_next().await {
                if let Err(e) = joined {
                    error!("Connection task failed: {}", e);
                }
            }
        };
        if tokio::time::timeout(config.shutdown_grace, drain).await.is_err() {
            warn!(
                "Shutdown grace of {:?} elapsed, aborting remaining connections",
                config.shutdown_grace
            );
            workers.abort_all();
        }

        info!("Listener shut down");
        Ok(())
    }
}
