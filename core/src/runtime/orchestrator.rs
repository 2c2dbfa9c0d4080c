//! Game loading and switching
//!
//! The [`Orchestrator`] owns the single active [`GameInstance`] and the
//! per-id instance cache. All writes to either happen here; everything else
//! reads through [`Orchestrator::active_game`].
//!
//! A `load_game` call runs start to finish under an in-flight latch. A second
//! call arriving while the latch is held is rejected, not queued. Any failure
//! inside a load goes through one round of recovery before it is reported,
//! and every accepted call publishes exactly one terminal event. A rejected
//! call publishes a non-terminal `concurrency_rejection` error instead.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use cabinet_shared::GameManifest;
use hashbrown::HashMap;
use parking_lot::{Mutex, RwLock};
use tokio::sync::OnceCell;

use super::instance::{GameInstance, LifecycleState};
use super::services::{BettingService, GameSummary, HeadlessSurface, HostSurface, LocalBetting};
use crate::config::OrchestratorConfig;
use crate::error::{HostError, HostResult};
use crate::events::{EventBus, HostEvent};
use crate::library::GameRegistry;
use crate::module::{
    ActionResult, Conformance, GameAction, InitConfig, ModuleCache, ModuleKey, ModuleSource,
};
use crate::state::{StateManager, StateSnapshot};

/// Options for [`Orchestrator::load_game`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOptions {
    /// Rebuild the instance even if one is active or cached.
    pub force_reload: bool,
    /// Save the outgoing game's state and restore the incoming game's.
    pub preserve_state: bool,
}

impl LoadOptions {
    pub fn forced() -> Self {
        Self {
            force_reload: true,
            ..Self::default()
        }
    }

    pub fn fresh() -> Self {
        Self {
            preserve_state: false,
            ..Self::default()
        }
    }
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            force_reload: false,
            preserve_state: true,
        }
    }
}

/// Held for the duration of a load.
///
/// The latch stores the owning load's generation, 0 when free. Dropping a
/// guard only frees the latch if it still owns it, so a load orphaned by
/// [`Orchestrator::reset_in_flight`] cannot release its successor's latch.
struct InFlight<'a> {
    latch: &'a AtomicU64,
    generation: u64,
}

impl<'a> InFlight<'a> {
    fn acquire(latch: &'a AtomicU64, generations: &AtomicU64) -> Option<Self> {
        let generation = generations.fetch_add(1, Ordering::Relaxed) + 1;
        latch
            .compare_exchange(0, generation, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { latch, generation })
    }

    /// False once the latch was force-cleared or handed to another load.
    fn is_current(&self) -> bool {
        self.latch.load(Ordering::Acquire) == self.generation
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let _ = self.latch.compare_exchange(
            self.generation,
            0,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }
}

/// Loads, switches and drives the active game.
pub struct Orchestrator {
    registry: Arc<GameRegistry>,
    modules: ModuleCache,
    states: Arc<StateManager>,
    events: EventBus,
    betting: Arc<dyn BettingService>,
    surface: Arc<dyn HostSurface>,
    config: OrchestratorConfig,
    manifest_paths: Vec<PathBuf>,
    initialized: OnceCell<usize>,
    in_flight: AtomicU64,
    generations: AtomicU64,
    active: RwLock<Option<Arc<GameInstance>>>,
    instances: Mutex<HashMap<String, Arc<GameInstance>>>,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<GameRegistry>,
        source: Arc<dyn ModuleSource>,
        states: Arc<StateManager>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            registry,
            modules: ModuleCache::new(source),
            states,
            events: EventBus::new(),
            betting: Arc::new(LocalBetting::default()),
            surface: Arc::new(HeadlessSurface::default()),
            config,
            manifest_paths: Vec::new(),
            initialized: OnceCell::new(),
            in_flight: AtomicU64::new(0),
            generations: AtomicU64::new(0),
            active: RwLock::new(None),
            instances: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn with_betting(mut self, betting: Arc<dyn BettingService>) -> Self {
        self.betting = betting;
        self
    }

    pub fn with_surface(mut self, surface: Arc<dyn HostSurface>) -> Self {
        self.surface = surface;
        self
    }

    /// Manifest files registered on first use.
    pub fn with_manifest_paths(mut self, paths: Vec<PathBuf>) -> Self {
        self.manifest_paths = paths;
        self
    }

    pub fn registry(&self) -> &Arc<GameRegistry> {
        &self.registry
    }

    pub fn states(&self) -> &Arc<StateManager> {
        &self.states
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn surface(&self) -> &Arc<dyn HostSurface> {
        &self.surface
    }

    fn lifecycle_timeout(&self) -> Duration {
        self.config.lifecycle_timeout()
    }

    // ------------------------------------------------------------------
    // Initialization
    // ------------------------------------------------------------------

    /// Register the configured manifests. Runs once; concurrent callers wait
    /// for the same run. Returns the number of registered games.
    pub async fn initialize(&self) -> usize {
        *self
            .initialized
            .get_or_init(|| async {
                let loaded = self
                    .registry
                    .register_from_paths(&self.manifest_paths, false)
                    .await;
                let count = self.registry.len();
                tracing::info!(
                    "Loaded {} manifest(s), {} game(s) registered",
                    loaded.len(),
                    count
                );
                self.events.publish(HostEvent::ManifestsLoaded { count });
                count
            })
            .await
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.initialized()
    }

    // ------------------------------------------------------------------
    // Loading
    // ------------------------------------------------------------------

    /// Make `id` the active game.
    pub async fn load_game(&self, id: &str, options: LoadOptions) -> HostResult<Arc<GameInstance>> {
        let Some(latch) = InFlight::acquire(&self.in_flight, &self.generations) else {
            tracing::warn!("Rejecting load of {}: another load is in flight", id);
            let error = HostError::ConcurrencyRejection {
                requested: id.to_string(),
            };
            // Not terminal: the call was never accepted
            self.events.publish(HostEvent::error(&error));
            return Err(error);
        };

        self.initialize().await;
        self.events.publish(HostEvent::GameLoading { id: id.to_string() });
        let previous = self.active_game_id();

        let result = match self.load_once(&latch, id, options).await {
            Ok(instance) => Ok(instance),
            Err(error) => self.recover(&latch, id, previous, error).await,
        };

        match &result {
            Ok(instance) => {
                tracing::info!("Loaded {} {}", instance.id(), instance.manifest().version);
                self.events.publish(HostEvent::GameLoaded {
                    id: instance.id().to_string(),
                    version: instance.manifest().version.clone(),
                });
            }
            Err(error) => {
                tracing::error!("Failed to load {}: {}", id, error);
                self.events.publish(HostEvent::load_failed(error));
            }
        }
        result
    }

    fn resolve_manifest(&self, id: &str) -> HostResult<Arc<GameManifest>> {
        if let Some(manifest) = self.registry.lookup(id) {
            return Ok(manifest);
        }
        if self.config.synthesize_fallback_manifest {
            tracing::warn!("No manifest registered for {}, using a fallback", id);
            return Ok(Arc::new(GameManifest::fallback(id)));
        }
        Err(HostError::load(id, "no manifest registered"))
    }

    async fn load_once(
        &self,
        latch: &InFlight<'_>,
        id: &str,
        options: LoadOptions,
    ) -> HostResult<Arc<GameInstance>> {
        if !latch.is_current() {
            return Err(HostError::load(id, "superseded by a newer load"));
        }
        let manifest = self.resolve_manifest(id)?;

        if !options.force_reload
            && let Some(active) = self.active_game()
            && active.id() == id
        {
            tracing::debug!("{} is already active", id);
            return Ok(active);
        }

        self.teardown_active(options.preserve_state).await;

        let instance = self
            .instance_for(id, &manifest, options.force_reload)
            .await?;
        if let Err(e) = self.activate(&instance, options.preserve_state).await {
            self.discard(&instance).await;
            return Err(e);
        }
        if !latch.is_current() {
            tracing::warn!("Load of {} was superseded, discarding it", id);
            self.discard(&instance).await;
            return Err(HostError::load(id, "superseded by a newer load"));
        }

        *self.active.write() = Some(Arc::clone(&instance));
        self.surface.refresh_summary(&GameSummary {
            id: instance.id().to_string(),
            name: instance.manifest().name.clone(),
            version: instance.manifest().version.clone(),
            state: instance.state(),
        });
        Ok(instance)
    }

    /// Try another registered game (preferring the one that was active), or
    /// a forced reload of `id` when there is no other game.
    async fn recover(
        &self,
        latch: &InFlight<'_>,
        id: &str,
        previous: Option<String>,
        error: HostError,
    ) -> HostResult<Arc<GameInstance>> {
        if !latch.is_current() {
            tracing::warn!("Not recovering superseded load of {}", id);
            return Err(error);
        }
        tracing::warn!("Loading {} failed ({}), attempting recovery", id, error);

        let alternate = previous
            .filter(|prev| prev != id && self.registry.contains(prev))
            .or_else(|| self.registry.ids().into_iter().find(|other| other != id));
        let (target, options) = match alternate {
            Some(other) => (other, LoadOptions::fresh()),
            None => (
                id.to_string(),
                LoadOptions {
                    force_reload: true,
                    preserve_state: false,
                },
            ),
        };

        match self.load_once(latch, &target, options).await {
            Ok(instance) => {
                tracing::warn!("Recovered by loading {}; original error: {}", target, error);
                Ok(instance)
            }
            Err(recovery_error) => {
                tracing::warn!("Recovery via {} failed: {}", target, recovery_error);
                Err(error)
            }
        }
    }

    async fn teardown_active(&self, preserve_state: bool) {
        let taken = self.active.write().take();
        let Some(active) = taken else {
            return;
        };

        if preserve_state && !active.state().is_torn_down() {
            let value = active.get_state();
            let unchanged = self
                .states
                .get_state(active.id())
                .is_some_and(|current| current.value == value);
            if !unchanged {
                self.states.set_state(active.id(), value);
            }
        }

        if active.state() == LifecycleState::Running
            && let Err(e) = active.pause()
        {
            tracing::warn!("Ignoring pause failure during teardown: {}", e);
        }
        self.discard(&active).await;
    }

    /// Destroy `instance` (errors swallowed) and evict it from the cache.
    async fn discard(&self, instance: &Arc<GameInstance>) {
        match instance.destroy(self.lifecycle_timeout()).await {
            Ok(true) => tracing::debug!("Destroyed {}", instance.id()),
            Ok(false) => {}
            Err(e) => tracing::warn!("Ignoring destroy failure: {}", e),
        }

        let mut instances = self.instances.lock();
        if instances
            .get(instance.id())
            .is_some_and(|cached| Arc::ptr_eq(cached, instance))
        {
            instances.remove(instance.id());
        }
    }

    async fn instance_for(
        &self,
        id: &str,
        manifest: &Arc<GameManifest>,
        force_reload: bool,
    ) -> HostResult<Arc<GameInstance>> {
        let cached = self.instances.lock().get(id).cloned();
        if let Some(cached) = cached {
            let reusable = !force_reload
                && cached.state() == LifecycleState::Uninitialized
                && cached.manifest().version == manifest.version;
            if reusable {
                tracing::debug!("Reusing cached instance of {}", id);
                return Ok(cached);
            }
            self.discard(&cached).await;
        }
        self.construct(id, manifest).await
    }

    async fn construct(
        &self,
        id: &str,
        manifest: &Arc<GameManifest>,
    ) -> HostResult<Arc<GameInstance>> {
        let source_path = self.registry.source_path(id);
        let key = ModuleKey::resolve(manifest, source_path.as_deref());
        let factory = self
            .modules
            .get_or_import(&key)
            .await
            .map_err(|e| HostError::load(&key.entry, format!("{e:#}")))?;
        let module = factory
            .create(manifest)
            .map_err(|e| HostError::load(id, format!("{e:#}")))?;
        let module = Conformance::classify(module).into_module(id)?;
        let info = module.info();
        if info.id != id {
            return Err(HostError::load(
                id,
                format!("module at {} reports itself as '{}'", key.entry, info.id),
            ));
        }

        let instance = Arc::new(GameInstance::new(Arc::clone(manifest), module));
        self.instances
            .lock()
            .insert(id.to_string(), Arc::clone(&instance));
        tracing::debug!(
            "Constructed {} ({} {}) from {}",
            id,
            info.name,
            info.version,
            key.resolved.display()
        );
        Ok(instance)
    }

    fn init_config(&self, manifest: &GameManifest) -> InitConfig {
        InitConfig {
            container: self.surface.container(),
            bet_amount: self.betting.current_bet(),
            balance: self.betting.balance(),
            risk_level: self.betting.risk_level(),
            game: manifest.config.clone(),
        }
    }

    async fn activate(&self, instance: &GameInstance, preserve_state: bool) -> HostResult<()> {
        let limit = self.lifecycle_timeout();
        let id = instance.id();

        instance.attach(&self.events);
        let config = self.init_config(instance.manifest());
        instance.initialize(&config, limit).await?;
        instance.start(limit).await?;

        if preserve_state
            && self.states.get_state(id).is_none()
            && let Err(e) = self.states.restore_from_disk(id).await
        {
            tracing::warn!("Could not read saved state for {}: {}", id, e);
        }

        let restored = match self.states.get_state(id) {
            Some(snapshot) if preserve_state => match instance.set_state(&snapshot.value) {
                Ok(()) => {
                    tracing::debug!("Restored state for {}", id);
                    true
                }
                Err(e) => {
                    tracing::warn!("Could not restore state for {}: {}", id, e);
                    false
                }
            },
            _ => false,
        };
        if !restored {
            // Baseline so the first action can be undone
            self.states.set_state(id, instance.get_state());
        }
        Ok(())
    }

    /// Construct `id` into the instance cache without activating it.
    pub async fn preload(&self, id: &str) -> HostResult<Arc<GameInstance>> {
        let Some(_latch) = InFlight::acquire(&self.in_flight, &self.generations) else {
            return Err(HostError::ConcurrencyRejection {
                requested: id.to_string(),
            });
        };
        self.initialize().await;

        let manifest = self.resolve_manifest(id)?;
        let cached = self.instances.lock().get(id).cloned();
        if let Some(cached) = cached
            && !cached.state().is_torn_down()
        {
            return Ok(cached);
        }
        self.construct(id, &manifest).await
    }

    // ------------------------------------------------------------------
    // Active game
    // ------------------------------------------------------------------

    pub fn active_game(&self) -> Option<Arc<GameInstance>> {
        self.active.read().clone()
    }

    pub fn active_game_id(&self) -> Option<String> {
        self.active.read().as_ref().map(|i| i.id().to_string())
    }

    fn require_active(&self) -> HostResult<Arc<GameInstance>> {
        self.active_game().ok_or(HostError::NoActiveGame)
    }

    /// Route an action to the active game. A successful action pushes the
    /// resulting state onto the game's history.
    pub async fn perform_action(&self, action: GameAction) -> HostResult<ActionResult> {
        let active = self.require_active()?;
        let result = active
            .perform_action(action, self.lifecycle_timeout())
            .await?;
        if result.success {
            self.states.set_state(active.id(), active.get_state());
        }
        Ok(result)
    }

    pub fn pause(&self) -> HostResult<()> {
        self.require_active()?.pause()
    }

    pub fn resume(&self) -> HostResult<()> {
        self.require_active()?.resume()
    }

    pub fn resize(&self, width: u32, height: u32) -> HostResult<()> {
        self.require_active()?.resize(width, height);
        Ok(())
    }

    pub fn supports_feature(&self, feature: &str) -> bool {
        self.active_game()
            .is_some_and(|active| active.supports_feature(feature))
    }

    /// Capture the active game's state into its history and the save store.
    pub async fn save_state(&self) -> HostResult<StateSnapshot> {
        let active = self.require_active()?;
        self.states.set_state(active.id(), active.get_state());
        self.states.persist(active.id()).await?;
        self.states
            .latest(active.id())
            .ok_or_else(|| HostError::Storage(format!("no history for {}", active.id())))
    }

    /// Step the active game back one snapshot.
    pub fn undo(&self) -> HostResult<Option<StateSnapshot>> {
        let active = self.require_active()?;
        let Some(snapshot) = self.states.undo(active.id()) else {
            return Ok(None);
        };
        active.set_state(&snapshot.value)?;
        Ok(Some(snapshot))
    }

    /// Step the active game forward one snapshot.
    pub fn redo(&self) -> HostResult<Option<StateSnapshot>> {
        let active = self.require_active()?;
        let Some(snapshot) = self.states.redo(active.id()) else {
            return Ok(None);
        };
        active.set_state(&snapshot.value)?;
        Ok(Some(snapshot))
    }

    // ------------------------------------------------------------------
    // Cache control
    // ------------------------------------------------------------------

    /// Ids with a cached instance, sorted.
    pub fn cached_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.instances.lock().keys().cloned().collect();
        ids.sort_unstable();
        ids
    }

    pub fn cached_instance(&self, id: &str) -> Option<Arc<GameInstance>> {
        self.instances.lock().get(id).cloned()
    }

    /// Drop the imported module behind `id`'s entry reference.
    pub fn invalidate_module(&self, id: &str) -> bool {
        let Some(manifest) = self.registry.lookup(id) else {
            return false;
        };
        let key = ModuleKey::resolve(&manifest, self.registry.source_path(id).as_deref());
        self.modules.invalidate(&key.resolved)
    }

    /// Whether the module behind `id`'s entry reference is imported.
    pub fn is_module_cached(&self, id: &str) -> bool {
        let Some(manifest) = self.registry.lookup(id) else {
            return false;
        };
        let key = ModuleKey::resolve(&manifest, self.registry.source_path(id).as_deref());
        self.modules.contains(&key.resolved)
    }

    /// Destroy and evict `id`'s cached instance unless it is the active one.
    pub async fn purge(&self, id: &str) -> bool {
        let cached = self.instances.lock().get(id).cloned();
        let Some(cached) = cached else {
            return false;
        };
        if self
            .active_game()
            .is_some_and(|active| Arc::ptr_eq(&active, &cached))
        {
            return false;
        }
        self.discard(&cached).await;
        true
    }

    /// Purge both the module and the cached instance for `id`.
    pub async fn invalidate(&self, id: &str) -> bool {
        let module = self.invalidate_module(id);
        let instance = self.purge(id).await;
        module || instance
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.load(Ordering::Acquire) != 0
    }

    /// Force-clear the in-flight latch.
    ///
    /// Only for the watchdog's last resort: a load stuck past every timeout
    /// must not block the final attempt. The stuck load is orphaned: it can
    /// no longer activate a game, recover, or release the latch.
    pub fn reset_in_flight(&self) {
        if self.in_flight.swap(0, Ordering::AcqRel) != 0 {
            tracing::warn!("In-flight load latch was force-cleared");
        }
    }

    /// Save the active game's state, then destroy every instance.
    pub async fn shutdown(&self) {
        let active_id = self.active_game_id();
        self.teardown_active(true).await;
        if let Some(id) = active_id
            && let Err(e) = self.states.persist(&id).await
        {
            tracing::warn!("Could not save {} on shutdown: {}", id, e);
        }

        let cached: Vec<Arc<GameInstance>> = self.instances.lock().values().cloned().collect();
        for instance in cached {
            self.discard(&instance).await;
        }
        tracing::info!("Orchestrator shut down");
    }
}
