//! WebSocket transport bridge
//!
//! Small hyper HTTP/1 server for browser clients:
//! - `GET <path>` with an upgrade handshake opens a relay to the TCP listener
//! - `GET /health` reports liveness and pool counters as JSON
//!
//! Uses hyper http1 with TokioIo, and hyper-tungstenite for the upgrade.

pub mod relay;

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::config::Args;
use crate::server::ListenerStats;
use crate::session::SessionStore;
use crate::shutdown::ShutdownSignal;
use crate::types::{Result, SwitchboardError};

pub use relay::run_relay;

/// Fixed upgrade path
pub const BRIDGE_PATH: &str = "/tcp-bridge";

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub listen: SocketAddr,
    /// TCP endpoint each browser connection is paired with
    pub upstream: SocketAddr,
}

impl From<&Args> for BridgeConfig {
    fn from(args: &Args) -> Self {
        Self {
            listen: args.bridge_listen,
            upstream: args.bridge_upstream(),
        }
    }
}

/// Shared state for bridge requests
pub struct BridgeState {
    pub config: BridgeConfig,
    pub sessions: Arc<SessionStore>,
    pub listener_stats: Arc<ListenerStats>,
    pub registered_commands: usize,
    started: Instant,
}

impl BridgeState {
    pub fn new(
        config: BridgeConfig,
        sessions: Arc<SessionStore>,
        listener_stats: Arc<ListenerStats>,
        registered_commands: usize,
    ) -> Self {
        Self {
            config,
            sessions,
            listener_stats,
            registered_commands,
            started: Instant::now(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub healthy: bool,
    pub version: &'static str,
    pub commit: &'static str,
    pub built_at: &'static str,
    /// Seconds since the bridge started
    pub uptime: u64,
    pub active_sessions: usize,
    pub active_connections: usize,
    pub queued_connections: usize,
    pub registered_commands: usize,
}

pub struct Bridge {
    listener: TcpListener,
    state: Arc<BridgeState>,
}

impl Bridge {
    pub async fn bind(state: BridgeState) -> Result<Self> {
        let listener = TcpListener::bind(state.config.listen).await?;
        Ok(Self {
            listener,
            state: Arc::new(state),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve HTTP until `shutdown` fires; open relays finish on their own
    pub async fn run(self, mut shutdown: ShutdownSignal) -> Result<()> {
        info!(
            "Bridge listening on {} (ws path {}, upstream {})",
            self.listener.local_addr()?,
            BRIDGE_PATH,
            self.state.config.upstream
        );

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        let state = Arc::clone(&self.state);
                        tokio::spawn(async move {
                            let io = TokioIo::new(stream);
                            let service = service_fn(move |req| {
                                let state = Arc::clone(&state);
                                async move { handle_request(state, addr, req).await }
                            });

                            if let Err(err) = http1::Builder::new()
                                .serve_connection(io, service)
                                .with_upgrades()
                                .await
                            {
                                let err = SwitchboardError::from(err);
                                debug!("Error serving bridge connection from {}: {}", addr, err);
                            }
                        });
                    }
                    Err(e) => {
                        error!("Failed to accept bridge connection: {}", e);
                    }
                },
            }
        }

        info!("Bridge stopped");
        Ok(())
    }
}

async fn handle_request(
    state: Arc<BridgeState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> std::result::Result<Response<Full<Bytes>>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    debug!("[{}] {} {}", addr, method, path);

    let response = match (method, path.as_str()) {
        (Method::GET, "/health") => health_response(&state),
        (Method::GET, BRIDGE_PATH) => {
            if hyper_tungstenite::is_upgrade_request(&req) {
                handle_upgrade(state, addr, req)
            } else {
                text_response(StatusCode::BAD_REQUEST, "Bridge endpoint requires WebSocket upgrade")
            }
        }
        _ => text_response(StatusCode::NOT_FOUND, "Not found"),
    };
    Ok(response)
}

fn handle_upgrade(
    state: Arc<BridgeState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> Response<Full<Bytes>> {
    match hyper_tungstenite::upgrade(req, None) {
        Ok((response, websocket)) => {
            let upstream = state.config.upstream;
            info!("Bridge upgrade from {}", addr);

            tokio::spawn(async move {
                match websocket.await {
                    Ok(ws) => match relay::run_relay(ws, upstream).await {
                        Ok(()) => {}
                        Err(e) if e.is_transport() => {
                            debug!("Bridge relay for {} dropped: {}", addr, e);
                        }
                        Err(e) => warn!("Bridge relay for {} ended with error: {}", addr, e),
                    },
                    Err(e) => {
                        error!("WebSocket upgrade failed: {}", SwitchboardError::from(e));
                    }
                }
            });

            let (parts, _) = response.into_parts();
            Response::from_parts(parts, Full::new(Bytes::new()))
        }
        Err(e) => {
            warn!("WebSocket upgrade error: {:?}", e);
            text_response(StatusCode::BAD_REQUEST, &format!("WebSocket upgrade failed: {e}"))
        }
    }
}

fn health_response(state: &BridgeState) -> Response<Full<Bytes>> {
    let pool = state.listener_stats.snapshot();
    let health = HealthResponse {
        healthy: true,
        version: env!("CARGO_PKG_VERSION"),
        commit: env!("GIT_COMMIT_SHORT"),
        built_at: env!("BUILD_TIMESTAMP"),
        uptime: state.started.elapsed().as_secs(),
        active_sessions: state.sessions.active_count(),
        active_connections: pool.active,
        queued_connections: pool.queued,
        registered_commands: state.registered_commands,
    };
    let body = serde_json::to_string(&health).unwrap_or_else(|_| "{}".to_string());

    let mut response = Response::new(Full::new(Bytes::from(body)));
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

fn text_response(status: StatusCode, body: &str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body.to_string())));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    response
}
