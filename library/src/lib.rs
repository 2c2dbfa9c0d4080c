//! Cabinet host
//!
//! Wires the core orchestration crate into a runnable host: the built-in
//! demo games, a polling file watcher feeding hot reload, and a stdin
//! console for driving the active game.

pub mod console;
pub mod games;
pub mod watch;
