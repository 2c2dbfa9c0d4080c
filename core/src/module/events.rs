//! Listener bookkeeping for game events.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use cabinet_shared::GameEventKind;
use parking_lot::Mutex;
use serde_json::Value;

/// Event emitted by a running game.
#[derive(Debug, Clone, PartialEq)]
pub struct GameEvent {
    pub kind: GameEventKind,
    pub payload: Value,
}

/// Callback registered with [`GameModule::on`](super::GameModule::on).
pub type EventListener = Arc<dyn Fn(&GameEvent) + Send + Sync>;

/// Handle returned on registration, used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Listener table a module can embed to implement `on`/`off`.
#[derive(Default)]
pub struct EventListeners {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(ListenerId, GameEventKind, EventListener)>>,
}

impl EventListeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, kind: GameEventKind, listener: EventListener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push((id, kind, listener));
        id
    }

    pub fn unregister(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(listener_id, _, _)| *listener_id != id);
        listeners.len() != before
    }

    /// Deliver an event to every listener registered for its kind.
    pub fn emit(&self, kind: GameEventKind, payload: Value) {
        // Snapshot first so listeners may register/unregister re-entrantly
        let targets: Vec<EventListener> = self
            .listeners
            .lock()
            .iter()
            .filter(|(_, k, _)| *k == kind)
            .map(|(_, _, l)| Arc::clone(l))
            .collect();

        let event = GameEvent { kind, payload };
        for listener in targets {
            listener(&event);
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
