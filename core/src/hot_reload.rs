//! Hot reload
//!
//! Turns change notifications into cache invalidation and, for the active
//! game, a forced reload that keeps its state. File changes are debounced
//! per game so an editor saving several files at once costs one reload.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use cabinet_shared::{MANIFEST_FILE_NAME, ReloadEvent, ReloadKind};
use hashbrown::HashMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::events::HostEvent;
use crate::runtime::{LoadOptions, Orchestrator};

struct Pending {
    generation: u64,
    task: JoinHandle<()>,
}

/// Applies [`ReloadEvent`]s to the registry and orchestrator.
pub struct HotReloadCoordinator {
    orchestrator: Arc<Orchestrator>,
    debounce: Duration,
    pending: Mutex<HashMap<String, Pending>>,
    generation: Mutex<u64>,
}

impl HotReloadCoordinator {
    pub fn new(orchestrator: Arc<Orchestrator>, debounce: Duration) -> Arc<Self> {
        Arc::new(Self {
            orchestrator,
            debounce,
            pending: Mutex::new(HashMap::new()),
            generation: Mutex::new(0),
        })
    }

    /// Consume `events` until the sender side closes.
    pub fn spawn(self: &Arc<Self>, mut events: mpsc::Receiver<ReloadEvent>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                this.handle(event).await;
            }
            this.cancel_pending();
            tracing::debug!("Reload channel closed");
        })
    }

    pub async fn handle(self: &Arc<Self>, event: ReloadEvent) {
        tracing::debug!("Reload event {:?} for {}", event.kind, event.target);
        match event.kind {
            ReloadKind::ManifestChanged => self.apply(&event.target, event.kind, true).await,
            ReloadKind::GameReloading => self.apply(&event.target, event.kind, false).await,
            ReloadKind::FileChanged => {
                let path = Path::new(&event.target);
                let Some(id) = self.orchestrator.registry().resolve_path(path) else {
                    tracing::debug!("Ignoring change to {}: no game owns it", event.target);
                    return;
                };
                let is_manifest = path
                    .file_name()
                    .is_some_and(|name| name == MANIFEST_FILE_NAME);
                self.schedule(id, is_manifest);
            }
        }
    }

    /// (Re)start the debounce timer for `id`.
    fn schedule(self: &Arc<Self>, id: String, refresh_manifest: bool) {
        let generation = {
            let mut counter = self.generation.lock();
            *counter += 1;
            *counter
        };

        // Insert under the lock the task takes, so even a zero debounce
        // cannot finish before its entry exists
        let mut pending = self.pending.lock();
        let this = Arc::clone(self);
        let task_id = id.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(this.debounce).await;
            {
                // Past this point a newer event must not abort the reload
                let mut pending = this.pending.lock();
                if pending
                    .get(&task_id)
                    .is_some_and(|p| p.generation == generation)
                {
                    pending.remove(&task_id);
                }
            }
            this.apply(&task_id, ReloadKind::FileChanged, refresh_manifest)
                .await;
        });

        if let Some(previous) = pending.insert(id, Pending { generation, task }) {
            tracing::trace!("Debounce restarted");
            previous.task.abort();
        }
    }

    async fn apply(&self, id: &str, kind: ReloadKind, refresh_manifest: bool) {
        let orchestrator = &self.orchestrator;
        if refresh_manifest && let Err(e) = orchestrator.registry().refresh(id).await {
            tracing::warn!("Could not refresh manifest for {}: {}", id, e);
        }
        orchestrator.invalidate_module(id);

        if orchestrator.active_game_id().as_deref() == Some(id) {
            tracing::info!("Reloading active game {}", id);
            if let Err(e) = orchestrator.load_game(id, LoadOptions::forced()).await {
                tracing::warn!("Hot reload of {} failed: {}", id, e);
            }
        } else {
            orchestrator.purge(id).await;
        }

        orchestrator.events().publish(HostEvent::HotReload {
            id: id.to_string(),
            kind,
        });
    }

    /// Number of debounced reloads waiting to fire.
    pub fn pending(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn cancel_pending(&self) {
        for (_, pending) in self.pending.lock().drain() {
            pending.task.abort();
        }
    }
}

impl Drop for HotReloadCoordinator {
    fn drop(&mut self) {
        self.cancel_pending();
    }
}
