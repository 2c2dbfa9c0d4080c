//! Configuration management (`config.toml`)
//!
//! Handles loading, saving, and providing defaults for host settings.
//! Settings are stored in TOML format in the platform-specific config directory.
//! Durations are written in milliseconds.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Host configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct HostConfig {
    /// Manifest discovery
    #[serde(default)]
    pub registry: RegistryConfig,
    /// Game loading
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    /// Undo history and autosave
    #[serde(default)]
    pub state: StateConfig,
    /// Development file watching
    #[serde(default)]
    pub hot_reload: HotReloadConfig,
    /// Bootstrap supervision
    #[serde(default)]
    pub watchdog: WatchdogConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Manifest files loaded on first use, in addition to any discovered
    /// under the games directory.
    #[serde(default)]
    pub manifest_paths: Vec<PathBuf>,
    /// Game loaded when nothing else is requested (default: "dice")
    #[serde(default = "default_game")]
    pub default_game: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Budget for each initialize/start/destroy/action call (default: 10000)
    #[serde(default = "default_lifecycle_timeout_ms")]
    pub lifecycle_timeout_ms: u64,
    /// Build a stand-in manifest for unknown ids (default: true)
    #[serde(default = "default_true")]
    pub synthesize_fallback_manifest: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateConfig {
    /// Snapshots kept per game (default: 50)
    #[serde(default = "default_max_history")]
    pub max_history: usize,
    /// Autosave period (default: 30000)
    #[serde(default = "default_autosave_interval_ms")]
    pub autosave_interval_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HotReloadConfig {
    /// Watch game files for changes (default: false)
    #[serde(default)]
    pub enabled: bool,
    /// Quiet period before a burst of file changes triggers one reload (default: 300)
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchdogConfig {
    /// Time between probes (default: 1000)
    #[serde(default = "default_watchdog_poll_ms")]
    pub poll_interval_ms: u64,
    /// Probes before giving up on the normal path (default: 15)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Unsuccessful probes before a forced load (default: 3)
    #[serde(default = "default_force_after")]
    pub force_after: u32,
    /// Heartbeat gap that counts as a host restart (default: 5000)
    #[serde(default = "default_restart_threshold_ms")]
    pub restart_threshold_ms: u64,
    /// Forced-load cadence after a restart (default: 3000)
    #[serde(default = "default_restart_retry_interval_ms")]
    pub restart_retry_interval_ms: u64,
    /// Forced loads attempted after a restart (default: 5)
    #[serde(default = "default_restart_max_retries")]
    pub restart_max_retries: u32,
    /// Absolute deadline for the final attempt (default: 30000)
    #[serde(default = "default_deadline_ms")]
    pub deadline_ms: u64,
    /// Delay of the single re-check after success (default: 10000)
    #[serde(default = "default_recheck_delay_ms")]
    pub recheck_delay_ms: u64,
}

fn default_game() -> String {
    "dice".to_string()
}
fn default_lifecycle_timeout_ms() -> u64 {
    10_000
}
fn default_max_history() -> usize {
    50
}
fn default_autosave_interval_ms() -> u64 {
    30_000
}
fn default_debounce_ms() -> u64 {
    300
}
fn default_watchdog_poll_ms() -> u64 {
    1_000
}
fn default_max_attempts() -> u32 {
    15
}
fn default_force_after() -> u32 {
    3
}
fn default_restart_threshold_ms() -> u64 {
    5_000
}
fn default_restart_retry_interval_ms() -> u64 {
    3_000
}
fn default_restart_max_retries() -> u32 {
    5
}
fn default_deadline_ms() -> u64 {
    30_000
}
fn default_recheck_delay_ms() -> u64 {
    10_000
}

fn default_true() -> bool {
    true
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            manifest_paths: Vec::new(),
            default_game: default_game(),
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            lifecycle_timeout_ms: default_lifecycle_timeout_ms(),
            synthesize_fallback_manifest: default_true(),
        }
    }
}

impl OrchestratorConfig {
    pub fn lifecycle_timeout(&self) -> Duration {
        Duration::from_millis(self.lifecycle_timeout_ms)
    }
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            max_history: default_max_history(),
            autosave_interval_ms: default_autosave_interval_ms(),
        }
    }
}

impl StateConfig {
    pub fn autosave_interval(&self) -> Duration {
        Duration::from_millis(self.autosave_interval_ms)
    }
}

impl Default for HotReloadConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl HotReloadConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_watchdog_poll_ms(),
            max_attempts: default_max_attempts(),
            force_after: default_force_after(),
            restart_threshold_ms: default_restart_threshold_ms(),
            restart_retry_interval_ms: default_restart_retry_interval_ms(),
            restart_max_retries: default_restart_max_retries(),
            deadline_ms: default_deadline_ms(),
            recheck_delay_ms: default_recheck_delay_ms(),
        }
    }
}

impl WatchdogConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn restart_threshold(&self) -> Duration {
        Duration::from_millis(self.restart_threshold_ms)
    }

    pub fn restart_retry_interval(&self) -> Duration {
        Duration::from_millis(self.restart_retry_interval_ms)
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }

    pub fn recheck_delay(&self) -> Duration {
        Duration::from_millis(self.recheck_delay_ms)
    }
}

/// Returns the platform-specific configuration directory.
///
/// On Windows: `%APPDATA%\Cabinet\config`
/// On macOS: `~/Library/Application Support/io.cabinet.Cabinet`
/// On Linux: `~/.config/Cabinet`
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("io.cabinet", "", "Cabinet")
        .map(|dirs| dirs.config_dir().to_path_buf())
}

/// Returns the platform-specific data directory.
///
/// Saves live under `saves/`, the watchdog heartbeat in `last_seen`.
pub fn data_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("io.cabinet", "", "Cabinet")
        .map(|dirs| dirs.data_dir().to_path_buf())
}

/// Loads `config.toml` from the config directory.
///
/// Returns default values if the file doesn't exist or cannot be parsed.
pub fn load() -> HostConfig {
    config_dir()
        .map(|dir| load_from(&dir.join("config.toml")))
        .unwrap_or_default()
}

/// Loads a specific config file, falling back to defaults.
pub fn load_from(path: &Path) -> HostConfig {
    let Ok(content) = std::fs::read_to_string(path) else {
        return HostConfig::default();
    };
    match toml::from_str(&content) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!("Ignoring invalid config {}: {}", path.display(), e);
            HostConfig::default()
        }
    }
}

/// Saves the configuration to the config directory, creating it if needed.
pub fn save(config: &HostConfig) -> std::io::Result<()> {
    if let Some(dir) = config_dir() {
        save_to(config, &dir.join("config.toml"))?;
    }
    Ok(())
}

pub fn save_to(config: &HostConfig, path: &Path) -> std::io::Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let content = toml::to_string_pretty(config).map_err(std::io::Error::other)?;
    std::fs::write(path, content)
}
