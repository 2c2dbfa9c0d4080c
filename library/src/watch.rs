//! Games directory discovery and change watching.

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use cabinet_shared::{MANIFEST_FILE_NAME, ReloadEvent};
use hashbrown::HashSet;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use notify_debouncer_mini::{
    DebounceEventResult, DebouncedEvent, DebouncedEventKind, Debouncer, new_debouncer,
};
use tokio::sync::mpsc;
use walkdir::WalkDir;

/// Batches the raw events of a single save. Per-game debouncing happens in
/// the hot reload coordinator.
const BATCH_WINDOW: Duration = Duration::from_millis(100);

/// Directories whose contents never belong to a game build.
const EXCLUDED_DIRS: &[&str] = &[".git", "node_modules", "target"];

/// Every `manifest.json` below `root`, sorted.
pub fn discover_manifests(root: &Path) -> Vec<PathBuf> {
    let mut manifests: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file() && entry.file_name() == MANIFEST_FILE_NAME)
        .map(|entry| entry.into_path())
        .collect();
    manifests.sort();
    manifests
}

fn is_excluded(path: &Path) -> bool {
    path.components().any(|component| {
        matches!(component, Component::Normal(name)
            if name.to_str().is_some_and(|name| EXCLUDED_DIRS.contains(&name)))
    })
}

/// Paths worth reporting from one debounced batch, deduplicated and sorted.
fn changed_paths(batch: Vec<DebouncedEvent>) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    let mut paths: Vec<PathBuf> = batch
        .into_iter()
        .filter(|event| matches!(event.kind, DebouncedEventKind::Any))
        .map(|event| event.path)
        .filter(|path| !is_excluded(path))
        .filter(|path| seen.insert(path.clone()))
        .collect();
    paths.sort();
    paths
}

/// Watches a games directory recursively and forwards every changed file as
/// a [`ReloadEvent`]. Watching stops when this is dropped.
pub struct FileWatcher {
    root: PathBuf,
    _debouncer: Debouncer<RecommendedWatcher>,
}

impl FileWatcher {
    pub fn new(root: impl Into<PathBuf>, events: mpsc::Sender<ReloadEvent>) -> Result<Self> {
        let root = root.into();
        // Runs on the debouncer's own thread, so blocking sends are fine
        let mut debouncer = new_debouncer(BATCH_WINDOW, move |result: DebounceEventResult| {
            match result {
                Ok(batch) => {
                    for path in changed_paths(batch) {
                        tracing::debug!("Changed: {}", path.display());
                        let event = ReloadEvent::file_changed(path.to_string_lossy());
                        if events.blocking_send(event).is_err() {
                            return;
                        }
                    }
                }
                Err(e) => tracing::warn!("File watch error: {}", e),
            }
        })
        .context("Failed to create file watcher")?;

        debouncer
            .watcher()
            .watch(&root, RecursiveMode::Recursive)
            .with_context(|| format!("Failed to watch directory: {}", root.display()))?;

        Ok(Self {
            root,
            _debouncer: debouncer,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}
