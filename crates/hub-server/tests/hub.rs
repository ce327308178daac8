//! Registry and fan-out behaviour, driven through raw client handles.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use hub_core::{ClientId, ClientInfo, ClientState};
use hub_protocol::Inbound;
use hub_server::types::OutboundRx;
use hub_server::{ClientHandle, Hub, HubConfig, HubError, MessageHandler, SendOutcome};
use serde::ser::Error as _;
use serde::Serialize;
use serde_json::json;
use tokio::sync::mpsc::error::TryRecvError;

fn handle(capacity: usize) -> (ClientHandle, OutboundRx) {
    ClientHandle::channel(ClientInfo::generate(None), capacity)
}

/// Register `n` fresh handles; returns ids and receivers in order.
async fn register_many(hub: &Hub, n: usize, capacity: usize) -> Vec<(ClientId, OutboundRx)> {
    let mut out = Vec::new();
    for _ in 0..n {
        let (h, rx) = handle(capacity);
        let id = h.id();
        hub.register(h).await.unwrap();
        out.push((id, rx));
    }
    out
}

fn drain(rx: &mut OutboundRx) -> Vec<Bytes> {
    let mut frames = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        frames.push(frame);
    }
    frames
}

struct Unencodable;

impl Serialize for Unencodable {
    fn serialize<S: serde::Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
        Err(S::Error::custom("nope"))
    }
}

#[derive(Default)]
struct CountingHooks {
    connected: AtomicUsize,
    disconnected: AtomicUsize,
}

#[async_trait]
impl MessageHandler for CountingHooks {
    fn on_connect(&self, _client: &ClientInfo) {
        self.connected.fetch_add(1, Ordering::SeqCst);
    }

    fn on_disconnect(&self, _client: &ClientInfo) {
        self.disconnected.fetch_add(1, Ordering::SeqCst);
    }

    async fn on_message(&self, _hub: &Hub, _from: &ClientInfo, _message: Inbound) {}
}

#[tokio::test]
async fn registering_n_clients_then_a_duplicate() {
    let (hub, _task) = Hub::with_relay(HubConfig::default());
    let clients = register_many(&hub, 5, 8).await;
    assert_eq!(hub.client_count().await.unwrap(), 5);

    let existing = hub.clients().await.unwrap()[2].clone();
    let (dup, mut dup_rx) = ClientHandle::channel(existing.clone(), 8);

    match hub.register(dup).await {
        Err(HubError::DuplicateClient(id)) => assert_eq!(id, existing.id),
        other => panic!("expected duplicate rejection, got {other:?}"),
    }
    assert_eq!(hub.client_count().await.unwrap(), 5);
    assert_eq!(hub.metrics().snapshot().duplicate_registrations, 1);

    // The rejected handle was dropped, so its queue is closed.
    assert!(dup_rx.recv().await.is_none());

    // The original entry still receives.
    let delivery = hub.broadcast_bytes(Bytes::from_static(b"{}"), None).await.unwrap();
    assert!(delivery.delivered.contains(&clients[2].0));
}

#[tokio::test]
async fn inactive_handle_is_refused() {
    let (hub, _task) = Hub::with_relay(HubConfig::default());
    let (h, _rx) = handle(4);
    let id = h.id();
    h.state().advance(ClientState::Closing);

    assert!(matches!(hub.register(h).await, Err(HubError::NotActive(got)) if got == id));
    assert_eq!(hub.client_count().await.unwrap(), 0);
}

#[tokio::test]
async fn unregister_removes_only_that_client_and_keeps_order() {
    let (hub, _task) = Hub::with_relay(HubConfig::default());
    let mut clients = register_many(&hub, 4, 8).await;
    let ids: Vec<ClientId> = clients.iter().map(|(id, _)| *id).collect();

    assert!(hub.unregister(ids[1]).await.unwrap());

    let left: Vec<ClientId> = hub.clients().await.unwrap().iter().map(|c| c.id).collect();
    assert_eq!(left, vec![ids[0], ids[2], ids[3]]);

    // Its queue is closed.
    assert!(clients[1].1.recv().await.is_none());

    // Unknown and repeated ids are no-ops.
    assert!(!hub.unregister(ClientId::new()).await.unwrap());
    assert!(!hub.unregister(ids[1]).await.unwrap());
    assert_eq!(hub.client_count().await.unwrap(), 3);
    assert_eq!(hub.metrics().snapshot().unknown_unregistrations, 2);
}

#[tokio::test]
async fn broadcast_skips_only_the_excluded_client() {
    let (hub, _task) = Hub::with_relay(HubConfig::default());
    let mut clients = register_many(&hub, 4, 8).await;
    let sender = clients[0].0;

    let delivery = hub
        .broadcast(&json!({ "kind": "ping" }), Some(sender))
        .await
        .unwrap();
    assert_eq!(delivery.delivered_count(), 3);
    assert!(delivery.is_complete());
    assert!(!delivery.delivered.contains(&sender));

    assert!(drain(&mut clients[0].1).is_empty());
    for (_, rx) in clients.iter_mut().skip(1) {
        let frames = drain(rx);
        assert_eq!(frames, vec![Bytes::from_static(br#"{"kind":"ping"}"#)]);
    }

    let delivery = hub.broadcast(&json!({ "kind": "ping" }), None).await.unwrap();
    assert_eq!(delivery.delivered_count(), 4);
}

#[tokio::test]
async fn full_queue_drops_newest_for_that_client_only() {
    let (hub, _task) = Hub::with_relay(HubConfig::default());
    let (slow, mut slow_rx) = handle(1);
    let slow_id = slow.id();
    hub.register(slow).await.unwrap();
    let mut fast = register_many(&hub, 2, 8).await;

    let first = hub.broadcast(&json!({ "n": 1 }), None).await.unwrap();
    assert!(first.is_complete());

    let second = hub.broadcast(&json!({ "n": 2 }), None).await.unwrap();
    assert_eq!(second.dropped, vec![slow_id]);
    assert_eq!(second.delivered_count(), 2);

    assert_eq!(drain(&mut slow_rx), vec![Bytes::from_static(br#"{"n":1}"#)]);
    for (_, rx) in fast.iter_mut() {
        assert_eq!(drain(rx).len(), 2);
    }

    let snap = hub.metrics().snapshot();
    assert_eq!(snap.messages_dropped, 1);
    assert_eq!(snap.messages_delivered, 5);
}

#[tokio::test]
async fn encode_failure_reaches_no_queue() {
    let (hub, _task) = Hub::with_relay(HubConfig::default());
    let mut clients = register_many(&hub, 3, 8).await;

    let err = hub.broadcast(&Unencodable, None).await.unwrap_err();
    assert!(matches!(err, HubError::Encode(_)));

    let err = hub.send(&Unencodable, clients[0].0).await.unwrap_err();
    assert!(matches!(err, HubError::Encode(_)));

    for (_, rx) in clients.iter_mut() {
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }
    assert_eq!(hub.metrics().snapshot().encode_failures, 2);
}

#[tokio::test]
async fn unicast_outcomes() {
    let (hub, _task) = Hub::with_relay(HubConfig::default());
    let (h, mut rx) = handle(1);
    let id = h.id();
    hub.register(h).await.unwrap();

    assert_eq!(hub.send(&json!({ "to": "you" }), id).await.unwrap(), SendOutcome::Delivered);
    assert_eq!(hub.send(&json!({ "to": "you" }), id).await.unwrap(), SendOutcome::Dropped);
    assert_eq!(
        hub.send_bytes(Bytes::from_static(b"{}"), ClientId::new()).await.unwrap(),
        SendOutcome::NotConnected
    );

    assert_eq!(drain(&mut rx).len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn unregister_during_broadcasts_never_delivers_after_removal() {
    let (hub, _task) = Hub::with_relay(HubConfig::default());
    let mut clients = register_many(&hub, 4, 1024).await;
    let (victim, mut victim_rx) = clients.remove(1);

    let rounds = 200;
    let broadcaster = {
        let hub = hub.clone();
        tokio::spawn(async move {
            let mut reports = Vec::with_capacity(rounds);
            for n in 0..rounds {
                reports.push(hub.broadcast(&json!({ "n": n }), None).await.unwrap());
                tokio::task::yield_now().await;
            }
            reports
        })
    };

    tokio::time::sleep(Duration::from_millis(1)).await;
    assert!(hub.unregister(victim).await.unwrap());
    let reports = broadcaster.await.unwrap();

    // Once the victim is gone it never shows up again.
    let cut = reports
        .iter()
        .position(|r| !r.delivered.contains(&victim))
        .unwrap_or(reports.len());
    for report in &reports[cut..] {
        assert!(!report.delivered.contains(&victim));
        assert!(!report.dropped.contains(&victim));
    }

    // It received exactly what was reported, then its queue closed.
    let mut received = 0;
    while victim_rx.recv().await.is_some() {
        received += 1;
    }
    assert_eq!(received, cut);

    for (_, rx) in clients.iter_mut() {
        assert_eq!(drain(rx).len(), rounds);
    }
}

#[tokio::test]
async fn shutdown_removes_everyone_and_closes_the_hub() {
    let hooks = Arc::new(CountingHooks::default());
    let (hub, task) = Hub::spawn(HubConfig::default(), hooks.clone());
    let mut clients = Vec::new();
    let mut states = Vec::new();
    for _ in 0..3 {
        let (h, rx) = handle(4);
        states.push(h.state().clone());
        hub.register(h).await.unwrap();
        clients.push(rx);
    }
    assert_eq!(hooks.connected.load(Ordering::SeqCst), 3);

    // Nobody drives these handles to `Closed`, so the wait runs out.
    let removed = hub.shutdown(Duration::from_millis(50)).await.unwrap();
    assert_eq!(removed, 3);
    assert_eq!(hooks.disconnected.load(Ordering::SeqCst), 3);

    for state in &states {
        assert_eq!(state.get(), ClientState::Closing);
    }
    for rx in clients.iter_mut() {
        assert!(rx.recv().await.is_none());
    }

    task.await.unwrap();
    assert!(matches!(hub.client_count().await, Err(HubError::Closed)));
    assert!(matches!(
        hub.broadcast(&json!({}), None).await,
        Err(HubError::Closed)
    ));
}

#[tokio::test]
async fn shutdown_returns_as_soon_as_clients_close() {
    let (hub, _task) = Hub::with_relay(HubConfig::default());
    let (h, mut rx) = handle(4);
    let state = h.state().clone();
    hub.register(h).await.unwrap();

    // Play the client: close once the queue is closed.
    tokio::spawn(async move {
        while rx.recv().await.is_some() {}
        state.advance(ClientState::Closed);
    });

    let started = tokio::time::Instant::now();
    assert_eq!(hub.shutdown(Duration::from_secs(5)).await.unwrap(), 1);
    assert!(started.elapsed() < Duration::from_secs(1));
}
