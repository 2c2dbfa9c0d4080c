//! Cabinet Core - game host orchestration
//!
//! This crate loads, switches and supervises pluggable casino-style games
//! inside a single host.
//!
//! # Architecture
//!
//! - [`GameRegistry`] - manifests by id, newest version wins
//! - [`Orchestrator`] - the single active [`GameInstance`], loading with
//!   recovery and a facade for actions, pause/resume and undo/redo
//! - [`StateManager`] - per-game snapshot history with optional persistence
//! - [`HotReloadCoordinator`] - debounced cache invalidation and reloads
//! - [`BootstrapWatchdog`] - makes sure some game is running after start-up
//!
//! Games implement [`GameModule`] and are resolved from a manifest's entry
//! reference through a [`ModuleSource`].

pub mod config;
pub mod error;
pub mod events;
pub mod hot_reload;
pub mod library;
pub mod module;
pub mod runtime;
pub mod state;
#[cfg(test)]
pub mod test_utils;
pub mod watchdog;

pub use config::HostConfig;
pub use error::{ErrorKind, HostError, HostResult, LifecyclePhase};
pub use events::{EventBus, HostEvent};
pub use hot_reload::HotReloadCoordinator;
pub use library::{FsManifestLoader, GameRegistry, ManifestLoader, SelectorError, resolve_selector};
pub use module::{
    ActionResult, Capabilities, GameAction, GameEvent, GameInfo, GameModule, InitConfig,
    ModuleFactory, ModuleSource, RiskLevel, StaticModuleSource,
};
pub use runtime::{
    BettingService, GameInstance, HeadlessSurface, HostSurface, LifecycleState, LoadOptions,
    LocalBetting, Orchestrator,
};
pub use state::{Autosave, SaveStore, StateManager, StateSnapshot};
pub use watchdog::{BootTarget, BootstrapWatchdog, FileLastSeen, LastSeenStore, WatchdogPhase};
