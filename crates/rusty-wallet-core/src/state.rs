use std::sync::Arc;

use tokio::sync::watch;

use crate::domain::ConnectionState;

/// Observable holder for [`ConnectionState`].
///
/// Observers get a `watch::Receiver` and are woken only when a write actually
/// changes the state.
#[derive(Debug, Clone)]
pub struct StateStore {
    tx: Arc<watch::Sender<ConnectionState>>,
}

impl Default for StateStore {
    fn default() -> Self {
        let (tx, _rx) = watch::channel(ConnectionState::default());
        Self { tx: Arc::new(tx) }
    }
}

impl StateStore {
    pub fn snapshot(&self) -> ConnectionState {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.tx.subscribe()
    }

    /// Returns whether the state changed.
    pub(crate) fn update(&self, f: impl FnOnce(&mut ConnectionState)) -> bool {
        self.tx.send_if_modified(|state| {
            let before = state.clone();
            f(state);
            *state != before
        })
    }
}
