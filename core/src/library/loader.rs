//! Manifest fetching
//!
//! The [`ManifestLoader`] trait lets the registry stay agnostic of where
//! manifests live. [`FsManifestLoader`] reads `manifest.json` files from disk
//! and remembers the raw text it parsed so it can report which files changed.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use cabinet_shared::GameManifest;
use hashbrown::HashMap;
use parking_lot::Mutex;

use crate::error::{HostError, HostResult};

/// Fetches and parses manifests.
#[async_trait]
pub trait ManifestLoader: Send + Sync {
    /// Load the manifest at `path`. With `force_refresh` any cached copy is
    /// ignored.
    async fn load(&self, path: &Path, force_refresh: bool) -> HostResult<GameManifest>;

    /// Subset of `paths` whose content differs from what was last loaded.
    async fn changed_paths(&self, paths: &[PathBuf]) -> Vec<PathBuf>;
}

struct CachedManifest {
    raw: String,
    manifest: GameManifest,
}

/// Loads manifests from the local filesystem.
#[derive(Default)]
pub struct FsManifestLoader {
    cache: Mutex<HashMap<PathBuf, CachedManifest>>,
}

impl FsManifestLoader {
    pub fn new() -> Self {
        Self::default()
    }

    fn parse(path: &Path, raw: &str) -> HostResult<GameManifest> {
        let manifest: GameManifest =
            serde_json::from_str(raw).map_err(|e| HostError::load(path.display().to_string(), e))?;
        manifest.validate()?;
        Ok(manifest)
    }
}

#[async_trait]
impl ManifestLoader for FsManifestLoader {
    async fn load(&self, path: &Path, force_refresh: bool) -> HostResult<GameManifest> {
        if !force_refresh && let Some(cached) = self.cache.lock().get(path) {
            tracing::trace!("Manifest cache hit: {}", path.display());
            return Ok(cached.manifest.clone());
        }

        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| HostError::load(path.display().to_string(), e))?;
        let manifest = Self::parse(path, &raw)?;

        self.cache.lock().insert(
            path.to_path_buf(),
            CachedManifest {
                raw,
                manifest: manifest.clone(),
            },
        );
        Ok(manifest)
    }

    async fn changed_paths(&self, paths: &[PathBuf]) -> Vec<PathBuf> {
        let mut changed = Vec::new();
        for path in paths {
            // Unreadable files are reported once they come back
            let Ok(raw) = tokio::fs::read_to_string(path).await else {
                continue;
            };
            let differs = self
                .cache
                .lock()
                .get(path)
                .is_none_or(|cached| cached.raw != raw);
            if differs {
                changed.push(path.clone());
            }
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::write_manifest;
    use cabinet_shared::Version;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_load_parses_and_validates() {
        let dir = TempDir::new().unwrap();
        let path = write_manifest(dir.path(), "dice", "1.0.0");

        let loader = FsManifestLoader::new();
        let manifest = loader.load(&path, false).await.unwrap();
        assert_eq!(manifest.id, "dice");
        assert_eq!(manifest.version, Version::new(1, 0, 0));
    }

    #[tokio::test]
    async fn test_load_missing_file_is_load_error() {
        let dir = TempDir::new().unwrap();
        let loader = FsManifestLoader::new();
        let err = loader
            .load(&dir.path().join("nope/manifest.json"), false)
            .await
            .unwrap_err();
        assert!(matches!(err, HostError::Load { .. }));
    }

    #[tokio::test]
    async fn test_manifest_without_id_is_configuration_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("manifest.json");
        std::fs::write(&path, r#"{"name": "Nameless", "version": "1.0.0"}"#).unwrap();

        let err = FsManifestLoader::new().load(&path, false).await.unwrap_err();
        assert!(matches!(err, HostError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_cache_and_force_refresh() {
        let dir = TempDir::new().unwrap();
        let path = write_manifest(dir.path(), "dice", "1.0.0");
        let loader = FsManifestLoader::new();
        loader.load(&path, false).await.unwrap();

        write_manifest(dir.path(), "dice", "1.1.0");
        let cached = loader.load(&path, false).await.unwrap();
        assert_eq!(cached.version, Version::new(1, 0, 0));

        let fresh = loader.load(&path, true).await.unwrap();
        assert_eq!(fresh.version, Version::new(1, 1, 0));
    }

    #[tokio::test]
    async fn test_changed_paths_compares_content() {
        let dir = TempDir::new().unwrap();
        let dice = write_manifest(&dir.path().join("dice"), "dice", "1.0.0");
        let card = write_manifest(&dir.path().join("card"), "card", "1.0.0");
        let loader = FsManifestLoader::new();
        loader.load(&dice, false).await.unwrap();
        loader.load(&card, false).await.unwrap();

        let paths = vec![dice.clone(), card.clone()];
        assert!(loader.changed_paths(&paths).await.is_empty());

        write_manifest(&dir.path().join("dice"), "dice", "1.1.0");
        assert_eq!(loader.changed_paths(&paths).await, vec![dice]);
    }
}
