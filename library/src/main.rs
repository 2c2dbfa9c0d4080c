//! Cabinet game host
//!
//! ```text
//! cabinet [--games-dir DIR] [--config FILE] [GAME_ID]
//! ```
//!
//! Registers every `manifest.json` under the games directory, loads the
//! requested game (or lets the bootstrap watchdog pick one), then reads
//! console commands from stdin.

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use cabinet_core::config::{self, HostConfig};
use cabinet_core::events::HostEvent;
use cabinet_core::hot_reload::HotReloadCoordinator;
use cabinet_core::library::{FsManifestLoader, GameRegistry, resolve_selector};
use cabinet_core::runtime::{HeadlessSurface, LoadOptions, LocalBetting, Orchestrator};
use cabinet_core::state::{Autosave, SaveStore, StateManager};
use cabinet_core::watchdog::{BootTarget, BootstrapWatchdog, FileLastSeen};
use cabinet_library::console::Console;
use cabinet_library::games::builtin_source;
use cabinet_library::watch::{FileWatcher, discover_manifests};
use tokio::sync::{broadcast, mpsc};

/// Parsed command line.
#[derive(Debug, Default, PartialEq)]
struct Cli {
    games_dir: Option<PathBuf>,
    config: Option<PathBuf>,
    game: Option<String>,
}

fn parse_args(args: &[String]) -> Result<Cli> {
    let mut cli = Cli::default();
    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--games-dir" | "-g" => {
                let dir = iter.next().context("--games-dir needs a directory")?;
                cli.games_dir = Some(PathBuf::from(dir));
            }
            "--config" | "-c" => {
                let file = iter.next().context("--config needs a file")?;
                cli.config = Some(PathBuf::from(file));
            }
            flag if flag.starts_with('-') => bail!("unknown option {flag}"),
            game => {
                if cli.game.is_some() {
                    bail!("only one game may be given");
                }
                cli.game = Some(game.to_string());
            }
        }
    }
    Ok(cli)
}

/// Log host events until the bus closes.
fn spawn_event_log(mut events: broadcast::Receiver<HostEvent>) {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(HostEvent::GameLoading { id }) => tracing::debug!("Loading {}", id),
                Ok(HostEvent::Error { kind, message }) => {
                    tracing::warn!("[{}] {}", kind.as_str(), message)
                }
                Ok(HostEvent::HotReload { id, kind }) => {
                    tracing::info!("Hot reload of {} ({:?})", id, kind)
                }
                Ok(HostEvent::Game { id, event }) => {
                    tracing::trace!("{}: {} {}", id, event.kind.as_str(), event.payload)
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!("Event log skipped {} events", skipped)
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    let cli = parse_args(&args)?;
    let config: HostConfig = match &cli.config {
        Some(path) => config::load_from(path),
        None => config::load(),
    };

    let games_dir = cli.games_dir.clone().unwrap_or_else(|| PathBuf::from("games"));
    let mut manifest_paths = config.registry.manifest_paths.clone();
    manifest_paths.extend(discover_manifests(&games_dir));
    tracing::info!(
        "Found {} manifest(s) under {}",
        manifest_paths.len(),
        games_dir.display()
    );

    let data_dir = config::data_dir().unwrap_or_else(|| PathBuf::from(".cabinet"));
    let store = Arc::new(SaveStore::new(data_dir.join("saves")));
    let states = Arc::new(StateManager::with_store(config.state.max_history, store));
    let registry = Arc::new(GameRegistry::new(Arc::new(FsManifestLoader::default())));
    let betting = Arc::new(LocalBetting::default());
    let surface = Arc::new(HeadlessSurface::default());

    let orchestrator = Arc::new(
        Orchestrator::new(
            registry,
            Arc::new(builtin_source()),
            Arc::clone(&states),
            config.orchestrator.clone(),
        )
        .with_betting(betting.clone())
        .with_surface(surface.clone())
        .with_manifest_paths(manifest_paths),
    );
    spawn_event_log(orchestrator.events().subscribe());

    if orchestrator.initialize().await == 0 {
        tracing::warn!("No games registered; only fallback manifests are available");
    }

    // Explicit game on the command line
    if let Some(query) = &cli.game {
        match resolve_selector(query, &orchestrator.registry().ids()) {
            Ok(id) => {
                surface.select(Some(id.clone()));
                if let Err(e) = orchestrator.load_game(&id, LoadOptions::default()).await {
                    tracing::error!("Could not load {}: {}", id, e);
                }
            }
            Err(e) => {
                eprintln!("{}", e);
                if !e.hints().is_empty() {
                    eprintln!("\nDid you mean:");
                    for hint in e.hints() {
                        eprintln!("  - {}", hint);
                    }
                }
                std::process::exit(1);
            }
        }
    }

    let target: Arc<dyn BootTarget> = orchestrator.clone();
    let watchdog = BootstrapWatchdog::spawn(
        target,
        Arc::new(FileLastSeen::new(data_dir.join("last_seen"))),
        config.watchdog.clone(),
        config.registry.default_game.clone(),
    );

    let autosave = {
        let orchestrator = Arc::clone(&orchestrator);
        Autosave::spawn(
            Arc::clone(&states),
            config.state.autosave_interval(),
            move || orchestrator.active_game_id(),
        )
    };

    let hot_reload = if config.hot_reload.enabled {
        let (tx, rx) = mpsc::channel(64);
        match FileWatcher::new(&games_dir, tx) {
            Ok(watcher) => {
                tracing::info!("Watching {} for changes", watcher.root().display());
                let coordinator =
                    HotReloadCoordinator::new(orchestrator.clone(), config.hot_reload.debounce());
                let consumer = coordinator.spawn(rx);
                Some((coordinator, consumer, watcher))
            }
            Err(e) => {
                tracing::warn!("Hot reload disabled: {:#}", e);
                None
            }
        }
    } else {
        None
    };

    Console::new(orchestrator.clone(), betting).run().await?;

    watchdog.stop();
    autosave.stop();
    if let Some((coordinator, consumer, watcher)) = hot_reload {
        drop(watcher);
        consumer.abort();
        coordinator.cancel_pending();
    }
    orchestrator.shutdown().await;
    Ok(())
}
