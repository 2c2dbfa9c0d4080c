//! Periodic background save of the active game's latest snapshot.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::StateManager;

/// Handle to a running autosave task. Dropping it stops the task.
pub struct Autosave {
    handle: JoinHandle<()>,
}

impl Autosave {
    /// Spawn the autosave loop.
    ///
    /// Every `period` the id returned by `active` (if any) has its
    /// top-of-stack snapshot written to the save store, unless it is
    /// unchanged since the last write.
    pub fn spawn<F>(states: Arc<StateManager>, period: Duration, active: F) -> Self
    where
        F: Fn() -> Option<String> + Send + Sync + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick completes immediately
            ticker.tick().await;

            let mut last_saved: Option<(String, Value)> = None;
            loop {
                ticker.tick().await;

                let Some(id) = active() else { continue };
                let Some(snapshot) = states.latest(&id) else {
                    continue;
                };
                if last_saved
                    .as_ref()
                    .is_some_and(|(saved_id, value)| *saved_id == id && *value == snapshot.value)
                {
                    continue;
                }

                match states.persist(&id).await {
                    Ok(true) => {
                        tracing::debug!("Autosaved {}", id);
                        last_saved = Some((id, snapshot.value));
                    }
                    Ok(false) => {}
                    Err(e) => tracing::warn!("Autosave of {} failed: {}", id, e),
                }
            }
        });

        Self { handle }
    }

    pub fn stop(&self) {
        self.handle.abort();
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for Autosave {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
