//! Host event bus
//!
//! Everything observers may care about (load progress, terminal load
//! outcomes, hot reloads and forwarded game events) is published on a
//! [`tokio::sync::broadcast`] channel. Publishing never blocks and never
//! fails; with no subscribers the event is dropped.

use cabinet_shared::{ReloadKind, Version};
use tokio::sync::broadcast;

use crate::error::{ErrorKind, HostError};
use crate::module::GameEvent;

const DEFAULT_CAPACITY: usize = 256;

/// Event published by the host.
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    /// A load of `id` started.
    GameLoading { id: String },
    /// Terminal success of a `load_game` call.
    GameLoaded { id: String, version: Version },
    /// A failure. `kind` is `GameLoadingFailed` for terminal load failures.
    Error { kind: ErrorKind, message: String },
    /// Lazy initialization finished with `count` registered manifests.
    ManifestsLoaded { count: usize },
    /// Caches for `id` were invalidated by a change notification.
    HotReload { id: String, kind: ReloadKind },
    /// An event raised by the active game.
    Game { id: String, event: GameEvent },
}

impl HostEvent {
    pub fn load_failed(error: &HostError) -> Self {
        HostEvent::Error {
            kind: ErrorKind::GameLoadingFailed,
            message: error.to_string(),
        }
    }

    pub fn error(error: &HostError) -> Self {
        HostEvent::Error {
            kind: error.kind(),
            message: error.to_string(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            HostEvent::GameLoaded { .. }
                | HostEvent::Error {
                    kind: ErrorKind::GameLoadingFailed,
                    ..
                }
        )
    }
}

/// Cloneable publisher handle.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<HostEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, event: HostEvent) {
        tracing::trace!("Publishing {:?}", event);
        // Err only means nobody is listening
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HostEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Drain every event currently buffered in `rx`.
pub fn drain(rx: &mut broadcast::Receiver<HostEvent>) -> Vec<HostEvent> {
    let mut events = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => events.push(event),
            Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                tracing::warn!("Event subscriber lagged, {} events skipped", skipped);
            }
            Err(_) => break,
        }
    }
    events
}
