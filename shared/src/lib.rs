//! Shared types for the Cabinet game host.
//!
//! - [`manifest`] - game manifests and registry queries
//! - [`version`] - component-wise semantic versions
//! - [`events`] - reload notifications and game event names

pub mod events;
pub mod manifest;
pub mod version;

pub use events::{GameEventKind, ReloadEvent, ReloadKind};
pub use manifest::{AssetRef, GameConfig, GameManifest, ManifestError, ManifestQuery};
pub use version::{Version, VersionError};

/// File name of a game manifest inside its game directory.
pub const MANIFEST_FILE_NAME: &str = "manifest.json";
