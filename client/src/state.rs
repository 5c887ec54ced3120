use std::sync::{Arc, Mutex};

/// Lifecycle of a client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

/// Connection state shared between the facade and the session task.
#[derive(Debug, Clone)]
pub(crate) struct StateCell {
    inner: Arc<Mutex<ConnectionState>>,
}

impl StateCell {
    pub(crate) fn new() -> Self {
        StateCell {
            inner: Arc::new(Mutex::new(ConnectionState::Disconnected)),
        }
    }

    pub(crate) fn get(&self) -> ConnectionState {
        *self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn set(&self, state: ConnectionState) {
        *self.inner.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }

    /// Moves to `to` only if currently in `from`.
    pub(crate) fn transition(&self, from: ConnectionState, to: ConnectionState) -> bool {
        let mut state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if *state == from {
            *state = to;
            true
        } else {
            false
        }
    }
}
