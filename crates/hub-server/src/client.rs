//! Per-connection client.
//!
//! A [`Client`] owns one connection and runs two pumps on it:
//! - the read pump forwards every inbound data frame to the hub's message
//!   handler,
//! - the write pump drains the client's bounded outbound queue onto the
//!   connection.
//!
//! [`Client::run`] supervises both. The hub only ever sees the
//! [`ClientHandle`]: identity, queue sender and lifecycle state.

use std::fmt::Display;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use futures::{Sink, SinkExt, Stream, StreamExt};
use hub_core::{ClientId, ClientInfo, ClientState, StateCell};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinError;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};

use crate::connection::Frame;
use crate::handler;
use crate::hub::Hub;
use crate::types::{DisconnectReason, OutboundRx, OutboundTx};

/// Settings for the pumps of one client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub outbound_capacity: usize,
    pub idle_timeout: Option<Duration>,
    pub heartbeat_interval: Option<Duration>,
    pub close_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            outbound_capacity: 256,
            idle_timeout: None,
            heartbeat_interval: None,
            close_timeout: Duration::from_secs(2),
        }
    }
}

/// The hub's entry for one client.
///
/// Holds the only sender of the client's outbound queue; dropping the
/// handle closes the queue.
#[derive(Debug)]
pub struct ClientHandle {
    info: ClientInfo,
    outbound: OutboundTx,
    state: StateCell,
}

impl ClientHandle {
    /// A handle in the `Active` state plus the receiving end of its queue.
    pub fn channel(info: ClientInfo, capacity: usize) -> (Self, OutboundRx) {
        let (outbound, rx) = mpsc::channel(capacity.max(1));
        let handle = ClientHandle {
            info,
            outbound,
            state: StateCell::new(),
        };
        (handle, rx)
    }

    pub fn id(&self) -> ClientId {
        self.info.id
    }

    pub fn info(&self) -> &ClientInfo {
        &self.info
    }

    pub fn state(&self) -> &StateCell {
        &self.state
    }

    /// Non-blocking enqueue.
    pub fn try_enqueue(&self, payload: Bytes) -> Result<(), TrySendError<Bytes>> {
        self.outbound.try_send(payload)
    }
}

/// One connected peer.
pub struct Client<R, W> {
    info: ClientInfo,
    state: StateCell,
    handle: ClientHandle,
    outbound_rx: OutboundRx,
    reader: R,
    writer: W,
    config: ClientConfig,
}

impl<R, W, E> Client<R, W>
where
    R: Stream<Item = Result<Frame, E>> + Unpin + Send + 'static,
    E: Display + Send + 'static,
    W: Sink<Frame> + Unpin + Send + 'static,
    W::Error: Display + Send,
{
    /// New client with a fresh id and color.
    pub fn new(reader: R, writer: W, peer_addr: Option<SocketAddr>, config: &ClientConfig) -> Self {
        Self::with_identity(ClientInfo::generate(peer_addr), reader, writer, config)
    }

    pub fn with_identity(info: ClientInfo, reader: R, writer: W, config: &ClientConfig) -> Self {
        let (handle, outbound_rx) = ClientHandle::channel(info.clone(), config.outbound_capacity);
        let state = handle.state().clone();
        Client {
            info,
            state,
            handle,
            outbound_rx,
            reader,
            writer,
            config: config.clone(),
        }
    }

    pub fn id(&self) -> ClientId {
        self.info.id
    }

    pub fn info(&self) -> &ClientInfo {
        &self.info
    }

    /// Shared lifecycle state; stays valid after `run` consumes the client.
    pub fn state(&self) -> StateCell {
        self.state.clone()
    }

    /// Register with the hub, pump until the connection ends, then close it.
    ///
    /// The connection's sink is closed only after both pumps have exited,
    /// and the state is `Closed` when this returns.
    pub async fn run(self, hub: Hub) -> DisconnectReason {
        let Client {
            info,
            state,
            handle,
            outbound_rx,
            reader,
            mut writer,
            config,
        } = self;
        let id = info.id;

        if let Err(err) = hub.register(handle).await {
            warn!(client = %id, error = %err, "registration refused");
            state.advance(ClientState::Closing);
            if let Err(e) = writer.send(Frame::Close).await {
                debug!(client = %id, error = %e, "failed to send close frame");
            }
            if let Err(e) = writer.close().await {
                debug!(client = %id, error = %e, "failed to close connection");
            }
            state.advance(ClientState::Closed);
            return DisconnectReason::Rejected(err.to_string());
        }

        hub.metrics().inc_opened();
        info!(client = %id, peer = ?info.peer_addr, color = %info.color, "client connected");

        let mut write_task = tokio::spawn(write_pump(
            id,
            writer,
            outbound_rx,
            config.heartbeat_interval,
        ));
        let mut read_task = tokio::spawn(read_pump(
            hub.clone(),
            info.clone(),
            reader,
            config.idle_timeout,
        ));

        let (reason, writer) = tokio::select! {
            read = &mut read_task => {
                let reason = read.unwrap_or_else(|e| DisconnectReason::Transport(joined("read", id, e)));
                release(&hub, id).await;

                // The write pump exits once the hub has dropped our queue.
                let writer = match time::timeout(config.close_timeout, &mut write_task).await {
                    Ok(Ok((writer, _))) => Some(writer),
                    Ok(Err(e)) => {
                        joined("write", id, e);
                        None
                    }
                    Err(_) => {
                        warn!(client = %id, "write pump did not drain in time");
                        write_task.abort();
                        if let Err(e) = (&mut write_task).await {
                            joined("write", id, e);
                        }
                        None
                    }
                };
                (reason, writer)
            }
            write = &mut write_task => {
                let (writer, exit) = match write {
                    Ok((writer, exit)) => (Some(writer), exit),
                    Err(e) => (None, WriteExit::Failed(joined("write", id, e))),
                };
                let mut reason = match exit {
                    WriteExit::QueueClosed => DisconnectReason::Evicted,
                    WriteExit::Failed(e) => {
                        release(&hub, id).await;
                        DisconnectReason::WriteFailed(e)
                    }
                };

                // Give the peer a chance to answer the close frame.
                if time::timeout(config.close_timeout, &mut read_task).await.is_err() {
                    debug!(client = %id, "peer did not close in time");
                    read_task.abort();
                    // The read pump must have released the stream before the
                    // sink is closed.
                    if let Err(e) = (&mut read_task).await {
                        joined("read", id, e);
                    }
                    if reason == DisconnectReason::Evicted {
                        reason = DisconnectReason::CloseTimeout;
                    }
                }
                (reason, writer)
            }
        };

        state.advance(ClientState::Closing);
        if let Some(mut writer) = writer {
            if let Err(e) = writer.close().await {
                debug!(client = %id, error = %e, "error closing connection");
            }
        }
        hub.metrics().inc_closed();
        state.advance(ClientState::Closed);

        info!(client = %id, reason = %reason, "client disconnected");
        reason
    }
}

/// Ask the hub to drop this client.
async fn release(hub: &Hub, id: ClientId) {
    match hub.unregister(id).await {
        Ok(true) => {}
        Ok(false) => trace!(client = %id, "already removed"),
        Err(e) => debug!(client = %id, error = %e, "unregister skipped"),
    }
}

/// Describe a pump task that did not return normally. Panics are logged
/// at `error`; cancellation after an abort is expected.
fn joined(pump: &str, id: ClientId, err: JoinError) -> String {
    if err.is_panic() {
        error!(client = %id, pump, error = %err, "pump panicked");
        format!("{pump} pump panicked")
    } else {
        trace!(client = %id, pump, "pump cancelled");
        format!("{pump} pump cancelled")
    }
}

enum WriteExit {
    /// The hub closed the queue; a close frame was written.
    QueueClosed,
    Failed(String),
}

async fn write_pump<W>(
    id: ClientId,
    mut sink: W,
    mut rx: OutboundRx,
    heartbeat: Option<Duration>,
) -> (W, WriteExit)
where
    W: Sink<Frame> + Unpin,
    W::Error: Display,
{
    let mut ticker = heartbeat.map(|period| {
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    });

    loop {
        let frame = tokio::select! {
            next = rx.recv() => match next {
                Some(payload) => Frame::Data(payload),
                None => break,
            },
            _ = tick(&mut ticker) => Frame::Heartbeat,
        };
        let is_data = matches!(frame, Frame::Data(_));

        if let Err(e) = sink.send(frame).await {
            warn!(client = %id, error = %e, "write failed");
            return (sink, WriteExit::Failed(e.to_string()));
        }

        if is_data {
            if let Some(ticker) = ticker.as_mut() {
                ticker.reset();
            }
        }
    }

    trace!(client = %id, "outbound queue closed; sending close frame");
    if let Err(e) = sink.send(Frame::Close).await {
        debug!(client = %id, error = %e, "failed to send close frame");
    }
    (sink, WriteExit::QueueClosed)
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

async fn read_pump<R, E>(
    hub: Hub,
    from: ClientInfo,
    mut stream: R,
    idle_timeout: Option<Duration>,
) -> DisconnectReason
where
    R: Stream<Item = Result<Frame, E>> + Unpin,
    E: Display,
{
    loop {
        let next = match idle_timeout {
            Some(window) => match time::timeout(window, stream.next()).await {
                Ok(next) => next,
                Err(_) => {
                    info!(client = %from.id, ?window, "idle timeout");
                    return DisconnectReason::IdleTimeout;
                }
            },
            None => stream.next().await,
        };

        match next {
            Some(Ok(Frame::Data(payload))) => handler::dispatch(&hub, &from, &payload).await,
            Some(Ok(Frame::Heartbeat)) => trace!(client = %from.id, "heartbeat"),
            Some(Ok(Frame::Close)) | None => return DisconnectReason::PeerClosed,
            Some(Err(e)) => {
                debug!(client = %from.id, error = %e, "read failed");
                return DisconnectReason::Transport(e.to_string());
            }
        }
    }
}
