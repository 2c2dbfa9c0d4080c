//! Game library management
//!
//! Manifest loading, the versioned game registry and selector resolution.

mod loader;
mod registry;
mod resolver;

pub use loader::{FsManifestLoader, ManifestLoader};
pub use registry::GameRegistry;
pub use resolver::{SelectorError, levenshtein_distance, resolve_selector, similar_ids};
