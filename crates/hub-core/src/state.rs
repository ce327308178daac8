//! Client lifecycle state.
//!
//! `Active --(read error | unregister)--> Closing --(both pumps exited)--> Closed`
//!
//! The state only moves forward. It is shared between the client task and
//! its registry entry through a [`StateCell`], which also lets anyone wait
//! for a client to reach `Closed`.

use std::sync::Arc;

use tokio::sync::watch;

/// Lifecycle phase of a client.
///
/// Ordered: a transition is valid only towards a greater value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ClientState {
    /// Pumps running, present in the registry.
    Active,
    /// Unregister initiated; queue draining or discarded.
    Closing,
    /// Connection released, queue disposed. Terminal.
    Closed,
}

/// Shared, forward-only lifecycle cell.
#[derive(Debug, Clone)]
pub struct StateCell {
    tx: Arc<watch::Sender<ClientState>>,
}

impl StateCell {
    /// New cell in the `Active` state.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ClientState::Active);
        Self { tx: Arc::new(tx) }
    }

    /// Current state.
    pub fn get(&self) -> ClientState {
        *self.tx.borrow()
    }

    pub fn is_active(&self) -> bool {
        self.get() == ClientState::Active
    }

    /// Move to `next` if that is forward. Returns `true` if the state changed.
    pub fn advance(&self, next: ClientState) -> bool {
        self.tx.send_if_modified(|current| {
            if next > *current {
                *current = next;
                true
            } else {
                false
            }
        })
    }

    /// Watch the state from elsewhere.
    pub fn subscribe(&self) -> watch::Receiver<ClientState> {
        self.tx.subscribe()
    }

    /// Resolve once the client is `Closed`.
    pub async fn closed(&self) {
        wait_closed(self.subscribe()).await
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve once the watched client is `Closed`.
///
/// Also resolves if the owning cell is gone, since nobody can move it
/// any further.
pub async fn wait_closed(mut rx: watch::Receiver<ClientState>) {
    let _ = rx.wait_for(|s| *s == ClientState::Closed).await;
}
