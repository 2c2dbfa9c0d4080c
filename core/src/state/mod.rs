//! Game state history and persistence
//!
//! [`StateManager`] keeps a bounded undo/redo history per game id.
//! [`SaveStore`] writes snapshots to disk and [`Autosave`] does so
//! periodically for whichever game is active.

mod autosave;
mod history;
mod manager;
mod store;

pub use autosave::Autosave;
pub use history::{SnapshotHistory, StateSnapshot};
pub use manager::StateManager;
pub use store::SaveStore;
