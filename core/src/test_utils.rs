//! Shared test utilities for unit tests

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use cabinet_shared::{GameEventKind, GameManifest, MANIFEST_FILE_NAME, Version};
use hashbrown::HashMap;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tempfile::TempDir;

use crate::config::OrchestratorConfig;
use crate::library::{FsManifestLoader, GameRegistry};
use crate::module::{
    ActionResult, Capabilities, EventListener, EventListeners, GameAction, GameInfo, GameModule,
    InitConfig, ListenerId, ModuleFactory, ModuleKey, ModuleSource, RiskLevel,
};
use crate::runtime::{HeadlessSurface, Orchestrator};
use crate::state::{SaveStore, StateManager};

// ============================================================================
// Fixtures
// ============================================================================

pub fn test_manifest(id: &str, version: &str) -> GameManifest {
    let version = Version::parse(version).unwrap_or_default();
    GameManifest::new(id, version, id)
}

/// Write `<dir>/manifest.json` for `id` and return its path.
pub fn write_manifest(dir: &Path, id: &str, version: &str) -> PathBuf {
    std::fs::create_dir_all(dir).unwrap();
    let path = dir.join(MANIFEST_FILE_NAME);
    let manifest = json!({
        "id": id,
        "version": version,
        "name": id,
        "main": id,
        "config": { "minBet": 1, "maxBet": 100, "defaultBet": 10 },
    });
    std::fs::write(&path, serde_json::to_string_pretty(&manifest).unwrap()).unwrap();
    path
}

pub fn test_init_config() -> InitConfig {
    InitConfig {
        container: "test-container".to_string(),
        bet_amount: 10.0,
        balance: 1000.0,
        risk_level: RiskLevel::Medium,
        game: Default::default(),
    }
}

// ============================================================================
// Test Game
// ============================================================================

/// Scriptable game module.
///
/// State is `{"spins": n, "balance": b}`; the `"spin"` action bumps the
/// counter and takes the bet from the balance.
pub struct TestGame {
    id: String,
    reported_id: Mutex<Option<String>>,
    state: Mutex<Value>,
    listeners: EventListeners,
    exports: Mutex<Capabilities>,
    bet: Mutex<f64>,
    fail_initialize: AtomicBool,
    fail_start: AtomicBool,
    fail_destroy: AtomicBool,
    hang_on_start: AtomicBool,
    initialize_count: AtomicUsize,
    destroy_count: AtomicUsize,
}

impl TestGame {
    pub fn new(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            reported_id: Mutex::new(None),
            state: Mutex::new(json!({ "spins": 0, "balance": 1000.0 })),
            listeners: EventListeners::new(),
            exports: Mutex::new(Capabilities::REQUIRED),
            bet: Mutex::new(10.0),
            fail_initialize: AtomicBool::new(false),
            fail_start: AtomicBool::new(false),
            fail_destroy: AtomicBool::new(false),
            hang_on_start: AtomicBool::new(false),
            initialize_count: AtomicUsize::new(0),
            destroy_count: AtomicUsize::new(0),
        })
    }

    pub fn set_exports(&self, exports: Capabilities) {
        *self.exports.lock() = exports;
    }

    /// Make `info()` report a different id.
    pub fn report_id(&self, id: &str) {
        *self.reported_id.lock() = Some(id.to_string());
    }

    pub fn fail_initialize(&self, fail: bool) {
        self.fail_initialize.store(fail, Ordering::SeqCst);
    }

    pub fn fail_start(&self, fail: bool) {
        self.fail_start.store(fail, Ordering::SeqCst);
    }

    pub fn fail_destroy(&self, fail: bool) {
        self.fail_destroy.store(fail, Ordering::SeqCst);
    }

    pub fn hang_on_start(&self, hang: bool) {
        self.hang_on_start.store(hang, Ordering::SeqCst);
    }

    pub fn initialize_count(&self) -> usize {
        self.initialize_count.load(Ordering::SeqCst)
    }

    pub fn destroy_count(&self) -> usize {
        self.destroy_count.load(Ordering::SeqCst)
    }

    pub fn spins(&self) -> u64 {
        self.state.lock()["spins"].as_u64().unwrap_or(0)
    }

    pub fn emit(&self, kind: GameEventKind, payload: Value) {
        self.listeners.emit(kind, payload);
    }
}

#[async_trait]
impl GameModule for TestGame {
    async fn initialize(&self, config: &InitConfig) -> anyhow::Result<()> {
        self.initialize_count.fetch_add(1, Ordering::SeqCst);
        if self.fail_initialize.load(Ordering::SeqCst) {
            anyhow::bail!("initialize failed");
        }
        *self.bet.lock() = config.bet_amount;
        self.state.lock()["balance"] = json!(config.balance);
        self.emit(GameEventKind::Initialized, Value::Null);
        Ok(())
    }

    async fn start(&self) -> anyhow::Result<()> {
        if self.hang_on_start.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.fail_start.load(Ordering::SeqCst) {
            anyhow::bail!("start failed");
        }
        self.emit(GameEventKind::Started, Value::Null);
        Ok(())
    }

    fn pause(&self) {
        self.emit(GameEventKind::Paused, Value::Null);
    }

    fn resume(&self) {
        self.emit(GameEventKind::Resumed, Value::Null);
    }

    async fn destroy(&self) -> anyhow::Result<()> {
        self.destroy_count.fetch_add(1, Ordering::SeqCst);
        if self.fail_destroy.load(Ordering::SeqCst) {
            anyhow::bail!("destroy failed");
        }
        self.emit(GameEventKind::Destroyed, Value::Null);
        Ok(())
    }

    async fn perform_action(&self, action: GameAction) -> anyhow::Result<ActionResult> {
        match action.kind.as_str() {
            "spin" => {
                let bet = *self.bet.lock();
                let state = {
                    let mut state = self.state.lock();
                    let spins = state["spins"].as_u64().unwrap_or(0) + 1;
                    let balance = state["balance"].as_f64().unwrap_or(0.0) - bet;
                    *state = json!({ "spins": spins, "balance": balance });
                    state.clone()
                };
                self.emit(GameEventKind::SpinEnd, state.clone());
                Ok(ActionResult::ok(state))
            }
            "explode" => anyhow::bail!("action exploded"),
            other => Ok(ActionResult::rejected(format!("unknown action {other}"))),
        }
    }

    fn resize(&self, width: u32, height: u32) {
        self.emit(GameEventKind::Resize, json!({ "width": width, "height": height }));
    }

    fn get_state(&self) -> Value {
        self.state.lock().clone()
    }

    fn set_state(&self, snapshot: &Value) -> anyhow::Result<()> {
        if !snapshot.get("spins").is_some_and(Value::is_u64) {
            anyhow::bail!("snapshot has no spin counter");
        }
        *self.state.lock() = snapshot.clone();
        self.emit(GameEventKind::StateRestored, snapshot.clone());
        Ok(())
    }

    fn info(&self) -> GameInfo {
        GameInfo {
            id: self.reported_id.lock().clone().unwrap_or_else(|| self.id.clone()),
            name: self.id.clone(),
            version: Version::new(1, 0, 0),
        }
    }

    fn supports_feature(&self, feature: &str) -> bool {
        feature == "autoplay"
    }

    fn on(&self, event: GameEventKind, listener: EventListener) -> ListenerId {
        self.listeners.register(event, listener)
    }

    fn off(&self, id: ListenerId) -> bool {
        self.listeners.unregister(id)
    }

    fn exports(&self) -> Capabilities {
        *self.exports.lock()
    }
}

// ============================================================================
// Counting Module Source
// ============================================================================

type CreateHook = Arc<dyn Fn(&TestGame) + Send + Sync>;

#[derive(Default)]
struct SourceLog {
    imports: AtomicUsize,
    created: Mutex<HashMap<String, Vec<Arc<TestGame>>>>,
    hooks: Mutex<HashMap<String, CreateHook>>,
}

/// Module source serving [`TestGame`]s and recording every import and
/// construction.
pub struct CountingSource {
    games: Vec<String>,
    log: Arc<SourceLog>,
}

impl CountingSource {
    pub fn with_games(ids: &[&str]) -> Self {
        Self {
            games: ids.iter().map(|id| id.to_string()).collect(),
            log: Arc::default(),
        }
    }

    /// Run `hook` on every game constructed for `id` from now on.
    pub fn on_create(&self, id: &str, hook: impl Fn(&TestGame) + Send + Sync + 'static) {
        self.log.hooks.lock().insert(id.to_string(), Arc::new(hook));
    }

    pub fn imports(&self) -> usize {
        self.log.imports.load(Ordering::SeqCst)
    }

    /// Number of modules constructed for `id`.
    pub fn created(&self, id: &str) -> usize {
        self.log.created.lock().get(id).map_or(0, Vec::len)
    }

    /// The `index`-th module constructed for `id`.
    pub fn game(&self, id: &str, index: usize) -> Arc<TestGame> {
        Arc::clone(&self.log.created.lock()[id][index])
    }
}

#[async_trait]
impl ModuleSource for CountingSource {
    async fn import(&self, key: &ModuleKey) -> anyhow::Result<Arc<dyn ModuleFactory>> {
        if !self.games.iter().any(|id| id == key.stem()) {
            anyhow::bail!("no test game for '{}'", key.entry);
        }
        self.log.imports.fetch_add(1, Ordering::SeqCst);

        let log = Arc::clone(&self.log);
        let factory: Arc<dyn ModuleFactory> = Arc::new(
            move |manifest: &GameManifest| -> anyhow::Result<Arc<dyn GameModule>> {
                let game = TestGame::new(&manifest.id);
                let hook = log.hooks.lock().get(&manifest.id).cloned();
                if let Some(hook) = hook {
                    hook(&game);
                }
                log.created
                    .lock()
                    .entry(manifest.id.clone())
                    .or_default()
                    .push(Arc::clone(&game));
                Ok(game)
            },
        );
        Ok(factory)
    }
}

// ============================================================================
// Test Host
// ============================================================================

/// An orchestrator wired to a [`CountingSource`] and a headless surface.
pub struct TestHost {
    pub orchestrator: Arc<Orchestrator>,
    pub source: Arc<CountingSource>,
    pub surface: Arc<HeadlessSurface>,
    pub states: Arc<StateManager>,
    dir: Option<TempDir>,
}

impl TestHost {
    /// Games registered in memory, without manifest files or a save store.
    pub fn new(ids: &[&str]) -> Self {
        let registry = Arc::new(GameRegistry::new(Arc::new(FsManifestLoader::default())));
        for id in ids {
            registry.register(test_manifest(id, "1.0.0"), None).unwrap();
        }
        Self::build(ids, registry, Arc::new(StateManager::new(50)), Vec::new(), None)
    }

    /// Games backed by manifest files in a temp dir, registered on first use,
    /// with a save store next to them.
    pub fn with_manifest_dir(ids: &[&str]) -> Self {
        let dir = TempDir::new().unwrap();
        let paths = ids
            .iter()
            .map(|id| write_manifest(&dir.path().join(id), id, "1.0.0"))
            .collect();
        let registry = Arc::new(GameRegistry::new(Arc::new(FsManifestLoader::default())));
        let store = Arc::new(SaveStore::new(dir.path().join("saves")));
        let states = Arc::new(StateManager::with_store(50, store));
        Self::build(ids, registry, states, paths, Some(dir))
    }

    fn build(
        ids: &[&str],
        registry: Arc<GameRegistry>,
        states: Arc<StateManager>,
        manifest_paths: Vec<PathBuf>,
        dir: Option<TempDir>,
    ) -> Self {
        let source = Arc::new(CountingSource::with_games(ids));
        let surface = Arc::new(HeadlessSurface::new("test-container"));
        let orchestrator = Orchestrator::new(
            registry,
            source.clone(),
            Arc::clone(&states),
            OrchestratorConfig::default(),
        )
        .with_surface(surface.clone())
        .with_manifest_paths(manifest_paths);

        Self {
            orchestrator: Arc::new(orchestrator),
            source,
            surface,
            states,
            dir,
        }
    }

    /// Rewrite `id`'s manifest file with a new version.
    pub fn rewrite_manifest(&self, id: &str, version: &str) -> PathBuf {
        let dir = self
            .dir
            .as_ref()
            .expect("host was built without a manifest dir");
        write_manifest(&dir.path().join(id), id, version)
    }

    pub async fn spin(&self) -> ActionResult {
        self.orchestrator
            .perform_action(GameAction::new("spin", Value::Null))
            .await
            .unwrap()
    }
}
