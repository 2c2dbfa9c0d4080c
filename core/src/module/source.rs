//! Module resolution
//!
//! A manifest's entry reference is turned into a [`ModuleKey`] (the entry
//! plus the path it resolves to), imported once through a [`ModuleSource`]
//! and kept in the [`ModuleCache`] until hot reload invalidates it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use cabinet_shared::GameManifest;
use hashbrown::HashMap;
use parking_lot::Mutex;

use super::GameModule;

/// Creates fresh module objects for one game implementation.
pub trait ModuleFactory: Send + Sync {
    fn create(&self, manifest: &GameManifest) -> anyhow::Result<Arc<dyn GameModule>>;
}

impl<F> ModuleFactory for F
where
    F: Fn(&GameManifest) -> anyhow::Result<Arc<dyn GameModule>> + Send + Sync,
{
    fn create(&self, manifest: &GameManifest) -> anyhow::Result<Arc<dyn GameModule>> {
        self(manifest)
    }
}

/// An entry reference and the path it resolves to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModuleKey {
    /// Entry reference as written in the manifest (`main`).
    pub entry: String,
    /// Entry joined onto the manifest's directory, or the bare entry when
    /// the manifest has no source path.
    pub resolved: PathBuf,
}

impl ModuleKey {
    pub fn resolve(manifest: &GameManifest, source_path: Option<&Path>) -> Self {
        let entry = manifest.entry().to_string();
        let resolved = match source_path.and_then(Path::parent) {
            Some(dir) => dir.join(&entry),
            None => PathBuf::from(&entry),
        };
        Self { entry, resolved }
    }

    /// Entry name without directories or extension (`"lib/dice.js"` → `"dice"`).
    pub fn stem(&self) -> &str {
        Path::new(&self.entry)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.entry)
    }
}

/// Imports module factories for entry references.
#[async_trait]
pub trait ModuleSource: Send + Sync {
    async fn import(&self, key: &ModuleKey) -> anyhow::Result<Arc<dyn ModuleFactory>>;
}

/// Module source backed by factories registered in-process, looked up by
/// entry stem.
pub struct StaticModuleSource {
    factories: HashMap<String, Arc<dyn ModuleFactory>>,
}

impl StaticModuleSource {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a factory under an entry name.
    pub fn register(&mut self, entry: impl Into<String>, factory: Arc<dyn ModuleFactory>) {
        self.factories.insert(entry.into(), factory);
    }

    pub fn with(mut self, entry: impl Into<String>, factory: Arc<dyn ModuleFactory>) -> Self {
        self.register(entry, factory);
        self
    }

    /// Registered entry names, sorted.
    pub fn entries(&self) -> Vec<&str> {
        let mut entries: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        entries.sort_unstable();
        entries
    }
}

impl Default for StaticModuleSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ModuleSource for StaticModuleSource {
    async fn import(&self, key: &ModuleKey) -> anyhow::Result<Arc<dyn ModuleFactory>> {
        self.factories
            .get(&key.entry)
            .or_else(|| self.factories.get(key.stem()))
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no module registered for entry '{}'", key.entry))
    }
}

/// Imported factories keyed by resolved path.
pub struct ModuleCache {
    source: Arc<dyn ModuleSource>,
    factories: Mutex<HashMap<PathBuf, Arc<dyn ModuleFactory>>>,
}

impl ModuleCache {
    pub fn new(source: Arc<dyn ModuleSource>) -> Self {
        Self {
            source,
            factories: Mutex::new(HashMap::new()),
        }
    }

    /// Return the cached factory for `key`, importing it on a miss.
    pub async fn get_or_import(&self, key: &ModuleKey) -> anyhow::Result<Arc<dyn ModuleFactory>> {
        if let Some(factory) = self.factories.lock().get(&key.resolved) {
            return Ok(Arc::clone(factory));
        }

        let factory = self.source.import(key).await?;
        tracing::debug!("Imported module {}", key.resolved.display());
        self.factories
            .lock()
            .insert(key.resolved.clone(), Arc::clone(&factory));
        Ok(factory)
    }

    /// Drop the cached factory for a resolved path. Returns true if one was cached.
    pub fn invalidate(&self, resolved: &Path) -> bool {
        let removed = self.factories.lock().remove(resolved).is_some();
        if removed {
            tracing::debug!("Invalidated module cache entry {}", resolved.display());
        }
        removed
    }

    pub fn contains(&self, resolved: &Path) -> bool {
        self.factories.lock().contains_key(resolved)
    }

    pub fn clear(&self) {
        self.factories.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.factories.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
