use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::Mutex;
use serde_json::Value;

use super::{SaveStore, SnapshotHistory, StateSnapshot};
use crate::error::HostResult;

/// Per-game undo/redo histories, optionally backed by a [`SaveStore`].
///
/// Histories are isolated by game id; nothing one game does moves another
/// game's cursor.
pub struct StateManager {
    histories: Mutex<HashMap<String, SnapshotHistory>>,
    max_history: usize,
    store: Option<Arc<SaveStore>>,
}

impl StateManager {
    pub fn new(max_history: usize) -> Self {
        Self {
            histories: Mutex::new(HashMap::new()),
            max_history,
            store: None,
        }
    }

    pub fn with_store(max_history: usize, store: Arc<SaveStore>) -> Self {
        Self {
            store: Some(store),
            ..Self::new(max_history)
        }
    }

    pub fn store(&self) -> Option<&Arc<SaveStore>> {
        self.store.as_ref()
    }

    /// Push a snapshot for `id`. It becomes current and the redo tail is
    /// discarded.
    pub fn set_state(&self, id: &str, value: Value) {
        self.push(id, StateSnapshot::new(value));
    }

    fn push(&self, id: &str, snapshot: StateSnapshot) {
        let mut histories = self.histories.lock();
        histories
            .entry(id.to_string())
            .or_insert_with(|| SnapshotHistory::new(self.max_history))
            .push(snapshot);
        tracing::trace!("Pushed state for {}", id);
    }

    pub fn get_state(&self, id: &str) -> Option<StateSnapshot> {
        self.histories.lock().get(id)?.current().cloned()
    }

    /// Step back. `None` (and no movement) at the oldest snapshot.
    pub fn undo(&self, id: &str) -> Option<StateSnapshot> {
        self.histories.lock().get_mut(id)?.undo().cloned()
    }

    /// Step forward. `None` (and no movement) at the newest snapshot.
    pub fn redo(&self, id: &str) -> Option<StateSnapshot> {
        self.histories.lock().get_mut(id)?.redo().cloned()
    }

    pub fn can_undo(&self, id: &str) -> bool {
        self.histories.lock().get(id).is_some_and(|h| h.can_undo())
    }

    pub fn can_redo(&self, id: &str) -> bool {
        self.histories.lock().get(id).is_some_and(|h| h.can_redo())
    }

    /// Top of the stack, regardless of the cursor.
    pub fn latest(&self, id: &str) -> Option<StateSnapshot> {
        self.histories.lock().get(id)?.latest().cloned()
    }

    pub fn clear(&self, id: &str) -> bool {
        self.histories.lock().remove(id).is_some()
    }

    /// Ids with a history, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.histories.lock().keys().cloned().collect();
        ids.sort_unstable();
        ids
    }

    /// Write the top-of-stack snapshot for `id` to the save store.
    ///
    /// Returns false when there is nothing to write or no store.
    pub async fn persist(&self, id: &str) -> HostResult<bool> {
        let (Some(store), Some(snapshot)) = (self.store.as_ref(), self.latest(id)) else {
            return Ok(false);
        };
        store.write(id, &snapshot).await?;
        Ok(true)
    }

    /// Load the stored snapshot for `id` and push it onto the history.
    pub async fn restore_from_disk(&self, id: &str) -> HostResult<Option<StateSnapshot>> {
        let Some(store) = self.store.as_ref() else {
            return Ok(None);
        };
        let Some(snapshot) = store.read(id).await? else {
            return Ok(None);
        };
        tracing::info!("Restored saved state for {}", id);
        self.push(id, snapshot.clone());
        Ok(Some(snapshot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    // ============================================================================
    // Undo / redo
    // ============================================================================

    #[test]
    fn test_undo_then_redo_returns_latest() {
        let states = StateManager::new(50);
        let a = json!({ "balance": 1000 });
        let s = json!({ "balance": 990 });
        states.set_state("dice", a.clone());
        states.set_state("dice", s.clone());

        assert_eq!(states.undo("dice").unwrap().value, a);
        assert_eq!(states.redo("dice").unwrap().value, s);
        assert_eq!(states.get_state("dice").unwrap().value, s);
    }

    #[test]
    fn test_single_push_cannot_move() {
        let states = StateManager::new(50);
        let s = json!({ "balance": 990 });
        states.set_state("dice", s.clone());

        assert!(states.undo("dice").is_none());
        assert!(states.redo("dice").is_none());
        assert_eq!(states.get_state("dice").unwrap().value, s);
    }

    #[test]
    fn test_can_undo_after_second_push() {
        let states = StateManager::new(50);
        assert!(!states.can_undo("dice"));
        states.set_state("dice", json!(1));
        assert!(!states.can_undo("dice"));
        states.set_state("dice", json!(2));
        assert!(states.can_undo("dice"));
        assert!(!states.can_redo("dice"));

        states.undo("dice");
        assert!(states.can_redo("dice"));
        assert!(!states.can_undo("dice"));
    }

    #[test]
    fn test_histories_are_isolated() {
        let states = StateManager::new(50);
        states.set_state("dice", json!(1));
        states.set_state("dice", json!(2));
        states.set_state("card", json!("a"));

        states.undo("dice");
        assert_eq!(states.get_state("card").unwrap().value, json!("a"));
        assert_eq!(states.ids(), vec!["card", "dice"]);

        assert!(states.clear("dice"));
        assert!(states.get_state("dice").is_none());
        assert!(states.undo("unknown").is_none());
    }

    #[test]
    fn test_latest_is_top_of_stack() {
        let states = StateManager::new(50);
        states.set_state("dice", json!(1));
        states.set_state("dice", json!(2));
        states.undo("dice");
        assert_eq!(states.latest("dice").unwrap().value, json!(2));
    }

    // ============================================================================
    // Persistence
    // ============================================================================

    #[tokio::test]
    async fn test_persist_and_restore() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(SaveStore::new(dir.path()));

        let states = StateManager::with_store(50, Arc::clone(&store));
        states.set_state("dice", json!({ "balance": 900 }));
        assert!(states.persist("dice").await.unwrap());
        assert!(!states.persist("card").await.unwrap());

        let fresh = StateManager::with_store(50, store);
        let restored = fresh.restore_from_disk("dice").await.unwrap().unwrap();
        assert_eq!(restored.value, json!({ "balance": 900 }));
        assert_eq!(fresh.get_state("dice").unwrap().value, json!({ "balance": 900 }));
        assert!(fresh.restore_from_disk("card").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_persist_without_store() {
        let states = StateManager::new(50);
        states.set_state("dice", json!(1));
        assert!(!states.persist("dice").await.unwrap());
    }
}
