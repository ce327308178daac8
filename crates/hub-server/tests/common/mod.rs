// crates/hub-server/tests/common/mod.rs
#![allow(dead_code)]

use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures::Sink;
use hub_server::{Client, ClientConfig, DisconnectReason, Frame, Hub};
use hub_core::{ClientId, StateCell};
use serde_json::Value;
use tokio::task::JoinHandle;

/// What the client did to its connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Sent(Frame),
    Closed,
}

/// Sink half of an in-memory connection; records every frame and the close.
pub struct RecordingSink {
    log: Arc<Mutex<Vec<Event>>>,
    fail_writes: bool,
}

impl Sink<Frame> for RecordingSink {
    type Error = String;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn start_send(self: Pin<&mut Self>, item: Frame) -> Result<(), Self::Error> {
        if self.fail_writes {
            return Err("broken pipe".to_string());
        }
        self.log.lock().unwrap().push(Event::Sent(item));
        Ok(())
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.log.lock().unwrap().push(Event::Closed);
        Poll::Ready(Ok(()))
    }
}

pub type MockReader = UnboundedReceiver<Result<Frame, String>>;

/// The remote end of an in-memory connection.
pub struct Peer {
    inbound: UnboundedSender<Result<Frame, String>>,
    log: Arc<Mutex<Vec<Event>>>,
}

impl Peer {
    pub fn send_text(&self, text: &str) {
        self.push(Ok(Frame::Data(Bytes::from(text.to_owned()))));
    }

    pub fn send_json(&self, value: Value) {
        self.send_text(&value.to_string());
    }

    pub fn close(&self) {
        self.push(Ok(Frame::Close));
    }

    pub fn fail(&self, reason: &str) {
        self.push(Err(reason.to_string()));
    }

    fn push(&self, item: Result<Frame, String>) {
        // The read pump may already be gone; that is fine for tests.
        let _ = self.inbound.unbounded_send(item);
    }

    pub fn events(&self) -> Vec<Event> {
        self.log.lock().unwrap().clone()
    }

    /// Data frames written to this peer, parsed as JSON.
    pub fn received(&self) -> Vec<Value> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Sent(Frame::Data(bytes)) => serde_json::from_slice(&bytes).ok(),
                _ => None,
            })
            .collect()
    }

    pub fn received_kind(&self, kind: &str) -> Vec<Value> {
        self.received()
            .into_iter()
            .filter(|v| v["kind"] == kind)
            .collect()
    }

    pub async fn wait_for<F>(&self, what: &str, pred: F)
    where
        F: Fn(&[Event]) -> bool,
    {
        for _ in 0..400 {
            if pred(&self.events()) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("timed out waiting for {what}; events: {:?}", self.events());
    }
}

pub fn connection(fail_writes: bool) -> (MockReader, RecordingSink, Peer) {
    let (inbound, reader) = unbounded();
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = RecordingSink {
        log: log.clone(),
        fail_writes,
    };
    (reader, sink, Peer { inbound, log })
}

/// A client running against `hub` on an in-memory connection.
pub struct Running {
    pub id: ClientId,
    pub state: StateCell,
    pub peer: Peer,
    pub task: JoinHandle<DisconnectReason>,
}

impl Running {
    pub async fn finished(self) -> (DisconnectReason, Peer) {
        let reason = tokio::time::timeout(Duration::from_secs(2), self.task)
            .await
            .expect("client did not finish")
            .expect("client task panicked");
        (reason, self.peer)
    }
}

pub fn spawn_client(hub: &Hub, config: &ClientConfig) -> Running {
    spawn_client_with(hub, config, false)
}

pub fn spawn_client_with(hub: &Hub, config: &ClientConfig, fail_writes: bool) -> Running {
    let (reader, writer, peer) = connection(fail_writes);
    let client = Client::new(reader, writer, None, config);
    let id = client.id();
    let state = client.state();
    let task = tokio::spawn(client.run(hub.clone()));
    Running {
        id,
        state,
        peer,
        task,
    }
}

pub fn quick_close() -> ClientConfig {
    ClientConfig {
        close_timeout: Duration::from_millis(50),
        ..ClientConfig::default()
    }
}

pub async fn wait_for_count(hub: &Hub, n: usize) {
    for _ in 0..400 {
        if hub.client_count().await.unwrap() == n {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!(
        "hub never reached {n} clients (has {})",
        hub.client_count().await.unwrap()
    );
}

/// Wait until every future frame already in flight has landed.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(30)).await;
}
