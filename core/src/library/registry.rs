//! Versioned manifest store
//!
//! The registry maps game ids to their newest known manifest and the file it
//! came from. A stored manifest is only ever replaced by one with a strictly
//! greater version, except through [`GameRegistry::refresh`] which hot reload
//! uses to pick up edits made in place.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use cabinet_shared::{GameManifest, ManifestError, ManifestQuery};
use hashbrown::HashMap;
use parking_lot::RwLock;

use super::loader::ManifestLoader;
use crate::error::{HostError, HostResult};

#[derive(Clone)]
struct Entry {
    manifest: Arc<GameManifest>,
    source_path: Option<PathBuf>,
}

/// Registered game manifests keyed by id.
pub struct GameRegistry {
    loader: Arc<dyn ManifestLoader>,
    entries: RwLock<HashMap<String, Entry>>,
}

impl GameRegistry {
    pub fn new(loader: Arc<dyn ManifestLoader>) -> Self {
        Self {
            loader,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Insert `manifest`, or replace the stored one if `manifest` is newer.
    ///
    /// Returns whether the store changed.
    pub fn register(
        &self,
        manifest: GameManifest,
        source_path: Option<PathBuf>,
    ) -> HostResult<bool> {
        if manifest.id.trim().is_empty() {
            return Err(ManifestError::MissingId.into());
        }

        let mut entries = self.entries.write();
        if let Some(existing) = entries.get(&manifest.id)
            && manifest.version <= existing.manifest.version
        {
            tracing::debug!(
                "Keeping {} {} (offered {})",
                manifest.id,
                existing.manifest.version,
                manifest.version
            );
            return Ok(false);
        }

        tracing::info!("Registered {} {}", manifest.id, manifest.version);
        entries.insert(
            manifest.id.clone(),
            Entry {
                manifest: Arc::new(manifest),
                source_path,
            },
        );
        Ok(true)
    }

    /// Load and register each path in order. Failures are logged and skipped.
    ///
    /// Returns the manifests that loaded successfully, whether or not they
    /// changed the store.
    pub async fn register_from_paths(
        &self,
        paths: &[PathBuf],
        force_refresh: bool,
    ) -> Vec<Arc<GameManifest>> {
        let mut loaded = Vec::with_capacity(paths.len());
        for path in paths {
            let manifest = match self.loader.load(path, force_refresh).await {
                Ok(manifest) => manifest,
                Err(e) => {
                    tracing::warn!("Skipping manifest {}: {}", path.display(), e);
                    continue;
                }
            };

            let reported = Arc::new(manifest.clone());
            match self.register(manifest, Some(path.clone())) {
                Ok(_) => loaded.push(reported),
                Err(e) => tracing::warn!("Skipping manifest {}: {}", path.display(), e),
            }
        }
        loaded
    }

    pub fn lookup(&self, id: &str) -> Option<Arc<GameManifest>> {
        self.entries
            .read()
            .get(id)
            .map(|entry| Arc::clone(&entry.manifest))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.read().contains_key(id)
    }

    /// Manifests matching `query`, ordered by id.
    pub fn list(&self, query: &ManifestQuery) -> Vec<Arc<GameManifest>> {
        let mut matches: Vec<Arc<GameManifest>> = self
            .entries
            .read()
            .values()
            .filter(|entry| query.matches(&entry.manifest))
            .map(|entry| Arc::clone(&entry.manifest))
            .collect();
        matches.sort_by(|a, b| a.id.cmp(&b.id));
        matches
    }

    /// Registered ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.entries.read().keys().cloned().collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn source_path(&self, id: &str) -> Option<PathBuf> {
        self.entries
            .read()
            .get(id)
            .and_then(|entry| entry.source_path.clone())
    }

    pub fn unregister(&self, id: &str) -> Option<Arc<GameManifest>> {
        let removed = self.entries.write().remove(id);
        if removed.is_some() {
            tracing::info!("Unregistered {}", id);
        }
        removed.map(|entry| entry.manifest)
    }

    /// Re-register every source path whose content changed.
    ///
    /// Returns only the manifests that actually replaced a stored one.
    pub async fn check_for_updates(&self) -> Vec<Arc<GameManifest>> {
        let known: Vec<PathBuf> = self
            .entries
            .read()
            .values()
            .filter_map(|entry| entry.source_path.clone())
            .collect();

        let changed = self.loader.changed_paths(&known).await;
        let mut updated = Vec::new();
        for path in changed {
            let manifest = match self.loader.load(&path, true).await {
                Ok(manifest) => manifest,
                Err(e) => {
                    tracing::warn!("Update check failed for {}: {}", path.display(), e);
                    continue;
                }
            };
            let id = manifest.id.clone();
            match self.register(manifest, Some(path)) {
                Ok(true) => updated.extend(self.lookup(&id)),
                Ok(false) => {}
                Err(e) => tracing::warn!("Update check rejected {}: {}", id, e),
            }
        }

        if !updated.is_empty() {
            tracing::info!("{} game(s) updated", updated.len());
        }
        updated
    }

    /// Reload `id` from its source path and store the result regardless of
    /// version.
    pub async fn refresh(&self, id: &str) -> HostResult<Arc<GameManifest>> {
        let path = self
            .source_path(id)
            .ok_or_else(|| HostError::load(id, "no source path registered"))?;

        let manifest = self.loader.load(&path, true).await?;
        if manifest.id != id {
            return Err(HostError::Configuration(format!(
                "{} now declares id '{}' instead of '{}'",
                path.display(),
                manifest.id,
                id
            )));
        }

        let manifest = Arc::new(manifest);
        self.entries.write().insert(
            id.to_string(),
            Entry {
                manifest: Arc::clone(&manifest),
                source_path: Some(path),
            },
        );
        tracing::info!("Refreshed {} {}", id, manifest.version);
        Ok(manifest)
    }

    /// Map a changed file to the game it belongs to.
    ///
    /// A path inside a registered manifest's directory wins (deepest
    /// directory first); otherwise any path component equal to a registered id.
    pub fn resolve_path(&self, path: &Path) -> Option<String> {
        let entries = self.entries.read();

        let by_dir = entries
            .iter()
            .filter_map(|(id, entry)| {
                let dir = entry.source_path.as_deref()?.parent()?;
                path.starts_with(dir)
                    .then(|| (dir.components().count(), id))
            })
            .max_by_key(|(depth, _)| *depth)
            .map(|(_, id)| id.clone());
        if by_dir.is_some() {
            return by_dir;
        }

        path.components()
            .rev()
            .filter_map(|c| c.as_os_str().to_str())
            .find(|component| entries.contains_key(*component))
            .map(str::to_string)
    }
}
