//! Line-oriented host console read from stdin.

use std::sync::Arc;

use anyhow::Result;
use cabinet_core::error::{HostError, HostResult};
use cabinet_core::library::resolve_selector;
use cabinet_core::module::GameAction;
use cabinet_core::runtime::{LoadOptions, LocalBetting, Orchestrator};
use cabinet_shared::ManifestQuery;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    List,
    Load(String),
    Reload(String),
    Spin,
    Bet(f64),
    Undo,
    Redo,
    State,
    Save,
    Pause,
    Resume,
    Help,
    Quit,
}

impl Command {
    /// Parse one console line. Returns `Ok(None)` for blank lines.
    pub fn parse(line: &str) -> Result<Option<Self>, String> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Ok(None);
        };
        let arg = words.next();

        let command = match (verb, arg) {
            ("list" | "ls", _) => Command::List,
            ("load", Some(id)) => Command::Load(id.to_string()),
            ("reload", Some(id)) => Command::Reload(id.to_string()),
            ("load" | "reload", None) => return Err(format!("usage: {verb} <game>")),
            ("spin", _) => Command::Spin,
            ("bet", Some(amount)) => Command::Bet(
                amount
                    .parse()
                    .map_err(|_| format!("not an amount: {amount}"))?,
            ),
            ("bet", None) => return Err("usage: bet <amount>".to_string()),
            ("undo", _) => Command::Undo,
            ("redo", _) => Command::Redo,
            ("state", _) => Command::State,
            ("save", _) => Command::Save,
            ("pause", _) => Command::Pause,
            ("resume", _) => Command::Resume,
            ("help" | "?", _) => Command::Help,
            ("quit" | "exit" | "q", _) => Command::Quit,
            (other, _) => return Err(format!("unknown command '{other}', try 'help'")),
        };
        Ok(Some(command))
    }
}

const HELP: &str = "\
commands:
  list             registered games
  load <game>      switch to a game (prefixes work)
  reload <game>    force a fresh instance
  spin             play one round
  bet <amount>     change the bet
  undo / redo      step through the state history
  state            print the active game's state
  save             write the active game's state to disk
  pause / resume
  quit";

/// What the caller should do after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub struct Console {
    orchestrator: Arc<Orchestrator>,
    betting: Arc<LocalBetting>,
}

impl Console {
    pub fn new(orchestrator: Arc<Orchestrator>, betting: Arc<LocalBetting>) -> Self {
        Self {
            orchestrator,
            betting,
        }
    }

    fn resolve(&self, query: &str) -> Option<String> {
        let ids = self.orchestrator.registry().ids();
        match resolve_selector(query, &ids) {
            Ok(id) => Some(id),
            Err(e) => {
                println!("{e}");
                for hint in e.hints() {
                    println!("  - {hint}");
                }
                None
            }
        }
    }

    async fn switch(&self, query: &str, options: LoadOptions) -> HostResult<Option<Value>> {
        let Some(id) = self.resolve(query) else {
            return Ok(None);
        };
        let instance = self.orchestrator.load_game(&id, options).await?;
        Ok(Some(json!({ "active": instance.id() })))
    }

    /// Run one command. Host errors are printed, not returned.
    pub async fn execute(&self, command: Command) -> Flow {
        let orchestrator = &self.orchestrator;
        let outcome: HostResult<Option<Value>> = match command {
            Command::List => {
                let active = orchestrator.active_game_id();
                for manifest in orchestrator.registry().list(&ManifestQuery::default()) {
                    let marker = if active.as_deref() == Some(manifest.id.as_str()) {
                        "*"
                    } else {
                        " "
                    };
                    println!("{marker} {:<12} {:<8} {}", manifest.id, manifest.version, manifest.name);
                }
                Ok(None)
            }
            Command::Load(query) => self.switch(&query, LoadOptions::default()).await,
            Command::Reload(query) => self.switch(&query, LoadOptions::forced()).await,
            Command::Spin => orchestrator
                .perform_action(GameAction::new("spin", Value::Null))
                .await
                .map(|result| Some(json!({ "success": result.success, "data": result.data }))),
            Command::Bet(amount) => {
                self.betting.set_bet(amount);
                if orchestrator.active_game().is_some() {
                    orchestrator
                        .perform_action(GameAction::new("setBet", json!({ "amount": amount })))
                        .await
                        .map(|result| Some(result.data))
                } else {
                    Ok(None)
                }
            }
            Command::Undo => orchestrator
                .undo()
                .map(|snapshot| Some(snapshot.map_or(json!("nothing to undo"), |s| s.value))),
            Command::Redo => orchestrator
                .redo()
                .map(|snapshot| Some(snapshot.map_or(json!("nothing to redo"), |s| s.value))),
            Command::State => match orchestrator.active_game() {
                Some(active) => Ok(Some(active.get_state())),
                None => Err(HostError::NoActiveGame),
            },
            Command::Save => orchestrator
                .save_state()
                .await
                .map(|snapshot| Some(json!({ "saved": snapshot.captured_at }))),
            Command::Pause => orchestrator.pause().map(|()| None),
            Command::Resume => orchestrator.resume().map(|()| None),
            Command::Help => {
                println!("{HELP}");
                Ok(None)
            }
            Command::Quit => return Flow::Quit,
        };

        match outcome {
            Ok(Some(value)) => println!("{value}"),
            Ok(None) => {}
            Err(e) => println!("error: {e}"),
        }
        Flow::Continue
    }

    /// Read commands from stdin until `quit` or end of input.
    pub async fn run(&self) -> Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        println!("type 'help' for commands");
        while let Some(line) = lines.next_line().await? {
            match Command::parse(&line) {
                Ok(Some(command)) => {
                    if self.execute(command).await == Flow::Quit {
                        break;
                    }
                }
                Ok(None) => {}
                Err(message) => println!("{message}"),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::builtin_source;
    use cabinet_core::config::OrchestratorConfig;
    use cabinet_core::library::{FsManifestLoader, GameRegistry};
    use cabinet_core::state::StateManager;
    use cabinet_shared::{GameManifest, Version};

    fn console() -> Console {
        let registry = Arc::new(GameRegistry::new(Arc::new(FsManifestLoader::default())));
        for (id, name) in [("dice", "Dice"), ("card", "High Card")] {
            registry
                .register(GameManifest::new(id, Version::new(1, 0, 0), name), None)
                .unwrap();
        }
        let orchestrator = Orchestrator::new(
            registry,
            Arc::new(builtin_source()),
            Arc::new(StateManager::new(10)),
            OrchestratorConfig::default(),
        );
        Console::new(Arc::new(orchestrator), Arc::new(LocalBetting::default()))
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("list"), Ok(Some(Command::List)));
        assert_eq!(
            Command::parse("  load   dice "),
            Ok(Some(Command::Load("dice".to_string())))
        );
        assert_eq!(Command::parse("bet 2.5"), Ok(Some(Command::Bet(2.5))));
        assert_eq!(Command::parse("q"), Ok(Some(Command::Quit)));
        assert_eq!(Command::parse("   "), Ok(None));
    }

    #[test]
    fn test_parse_errors() {
        assert!(Command::parse("load").is_err());
        assert!(Command::parse("bet lots").is_err());
        assert!(Command::parse("dance").unwrap_err().contains("dance"));
    }

    #[tokio::test]
    async fn test_console_drives_orchestrator() {
        let console = console();
        assert_eq!(console.execute(Command::Load("di".to_string())).await, Flow::Continue);
        assert_eq!(console.orchestrator.active_game_id().as_deref(), Some("dice"));

        console.execute(Command::Spin).await;
        assert!(console.orchestrator.states().can_undo("dice"));
        console.execute(Command::Undo).await;
        assert!(console.orchestrator.states().can_redo("dice"));

        console.execute(Command::Load("card".to_string())).await;
        assert_eq!(console.orchestrator.active_game_id().as_deref(), Some("card"));
        assert_eq!(console.execute(Command::Quit).await, Flow::Quit);
    }

    #[tokio::test]
    async fn test_unknown_game_keeps_active() {
        let console = console();
        console.execute(Command::Load("dice".to_string())).await;
        console.execute(Command::Load("poker".to_string())).await;
        assert_eq!(console.orchestrator.active_game_id().as_deref(), Some("dice"));
    }
}
