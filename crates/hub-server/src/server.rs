//! TCP listener and top-level server wiring.
//!
//! This module:
//! - Listens on the configured address/port.
//! - Enforces `max_clients` before the WebSocket handshake.
//! - Upgrades connections on `ws_path`, checking the `Origin` header. A
//!   socket that does not finish the upgrade within `handshake_timeout_ms`
//!   is dropped and gives its slot back.
//! - Spawns one task per connection running a `Client` against the hub.
//!
//! The hub loop and the client pumps live in `hub_loop` and `client`.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio::time;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::{header, StatusCode};
use tracing::{debug, error, info, warn};

use crate::client::Client;
use crate::config::Config;
use crate::connection::split_websocket;
use crate::handler::{MessageHandler, Relay};
use crate::hub::Hub;

pub struct Server {
    listener: TcpListener,
    config: Arc<Config>,
    hub: Hub,
    hub_task: JoinHandle<()>,
    limiter: Option<Arc<Semaphore>>,
}

impl Server {
    /// Bind the listener and start the hub loop.
    pub async fn bind(config: Config, handler: Arc<dyn MessageHandler>) -> io::Result<Self> {
        let listener = TcpListener::bind(config.socket_addr_string()).await?;
        let (hub, hub_task) = Hub::spawn(config.hub_config(), handler);
        let limiter = (config.max_clients > 0).then(|| Arc::new(Semaphore::new(config.max_clients)));

        Ok(Server {
            listener,
            config: Arc::new(config),
            hub,
            hub_task,
            limiter,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn hub(&self) -> &Hub {
        &self.hub
    }

    /// Accept connections until `shutdown` resolves, then shut the hub down.
    pub async fn run_until<F>(self, shutdown: F) -> io::Result<()>
    where
        F: Future<Output = ()>,
    {
        let Server {
            listener,
            config,
            hub,
            hub_task,
            limiter,
        } = self;

        if config.allowed_origins.is_empty() {
            warn!("no allowed_origins configured; accepting upgrades from any origin");
        }
        info!(
            addr = %listener.local_addr()?,
            path = %config.ws_path,
            max_clients = config.max_clients,
            "hub listening"
        );

        tokio::select! {
            _ = shutdown => info!("shutdown signal received"),
            _ = accept_loop(&listener, &config, &hub, limiter) => {}
        }
        drop(listener);

        match hub.shutdown(config.shutdown_timeout()).await {
            Ok(removed) => debug!(clients = removed, "clients released"),
            Err(e) => warn!(error = %e, "hub already stopped"),
        }
        if let Err(e) = hub_task.await {
            error!(error = %e, "hub loop aborted");
        }
        Ok(())
    }
}

/// Run the server with the default [`Relay`] handler until the process ends.
pub async fn run(config: Config) -> io::Result<()> {
    Server::bind(config, Arc::new(Relay))
        .await?
        .run_until(std::future::pending())
        .await
}

async fn accept_loop(
    listener: &TcpListener,
    config: &Arc<Config>,
    hub: &Hub,
    limiter: Option<Arc<Semaphore>>,
) {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                error!(error = %e, "failed to accept connection");
                continue;
            }
        };

        let permit = match &limiter {
            Some(limiter) => match limiter.clone().try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    warn!(peer = %peer, max_clients = config.max_clients, "connection rejected: limit reached");
                    continue;
                }
            },
            None => None,
        };

        if let Err(e) = stream.set_nodelay(true) {
            debug!(peer = %peer, error = %e, "failed to set TCP_NODELAY");
        }

        tokio::spawn(handle_connection(stream, peer, config.clone(), hub.clone(), permit));
    }
}

/// Upgrade one socket and run its client to completion.
///
/// The permit is held for the lifetime of the connection.
async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    config: Arc<Config>,
    hub: Hub,
    _permit: Option<OwnedSemaphorePermit>,
) {
    let check = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        check_upgrade(&config.ws_path, &config.allowed_origins, req)?;
        Ok(resp)
    };

    let ws = match time::timeout(config.handshake_timeout(), accept_hdr_async(stream, check)).await {
        Ok(Ok(ws)) => ws,
        Ok(Err(e)) => {
            debug!(peer = %peer, error = %e, "websocket handshake failed");
            return;
        }
        Err(_) => {
            debug!(peer = %peer, timeout = ?config.handshake_timeout(), "websocket handshake timed out");
            return;
        }
    };

    let (reader, writer) = split_websocket(ws);
    let client = Client::new(reader, writer, Some(peer), &config.client_config());
    let id = client.id();
    let reason = client.run(hub).await;
    debug!(client = %id, peer = %peer, reason = %reason, "connection finished");
}

fn check_upgrade(ws_path: &str, allowed_origins: &[String], req: &Request) -> Result<(), ErrorResponse> {
    if req.uri().path() != ws_path {
        debug!(path = %req.uri().path(), "upgrade on unknown path");
        return Err(reject(StatusCode::NOT_FOUND, "not found"));
    }

    // A header that is not valid ASCII never matches the allow-list.
    let origin = req
        .headers()
        .get(header::ORIGIN)
        .map(|value| value.to_str().unwrap_or_default());
    if !origin_allowed(allowed_origins, origin) {
        warn!(origin = ?origin, "upgrade refused: origin not allowed");
        return Err(reject(StatusCode::FORBIDDEN, "origin not allowed"));
    }
    Ok(())
}

fn reject(status: StatusCode, body: &str) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(body.to_string()));
    *response.status_mut() = status;
    response
}

/// Origin policy for the upgrade handshake.
///
/// An empty allow-list accepts everything. Otherwise a present origin must
/// match an entry, ignoring ASCII case; requests without an `Origin` header
/// are accepted.
pub fn origin_allowed(allowed: &[String], origin: Option<&str>) -> bool {
    if allowed.is_empty() {
        return true;
    }
    match origin {
        None => true,
        Some(origin) => allowed.iter().any(|a| a.eq_ignore_ascii_case(origin)),
    }
}
