//! Built-in demo games
//!
//! Both games are single-bet table games sharing one [`TableGame`] shell;
//! only the round itself differs, expressed through [`Rules`].

mod cards;
mod dice;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Context;
use async_trait::async_trait;
use cabinet_core::module::{
    ActionResult, EventListener, EventListeners, GameAction, GameInfo, GameModule, InitConfig,
    ListenerId, ModuleFactory, StaticModuleSource,
};
use cabinet_shared::{GameConfig, GameEventKind, GameManifest};
use parking_lot::Mutex;
use rand::SeedableRng;
use rand_pcg::Pcg32;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

pub use cards::HighCard;
pub use dice::Dice;

/// Result of one round, before the wallet is settled.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    /// Amount credited back, including the stake. Zero is a loss.
    pub payout: f64,
    /// Game-specific description of what happened.
    pub detail: Value,
}

/// The part that makes a table game a particular game.
pub trait Rules: Default + Send + Sync + 'static {
    /// Game-specific state carried in snapshots.
    type Round: Serialize + DeserializeOwned + Default + Clone + Send + Sync;

    fn play(&self, rng: &mut Pcg32, round: &mut Self::Round, bet: f64) -> Outcome;

    fn features(&self) -> &'static [&'static str] {
        &[]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Table<R> {
    balance: f64,
    bet: f64,
    rounds: u64,
    #[serde(flatten)]
    round: R,
}

#[derive(Debug, Clone, Copy)]
struct Limits {
    min_bet: f64,
    max_bet: f64,
}

impl Limits {
    fn from_config(config: &GameConfig) -> Self {
        let (min_bet, max_bet) = config.bet_limits();
        Self { min_bet, max_bet }
    }
}

/// A [`GameModule`] running one set of [`Rules`].
pub struct TableGame<R: Rules> {
    rules: R,
    info: GameInfo,
    listeners: EventListeners,
    limits: Mutex<Limits>,
    paused: AtomicBool,
    rng: Mutex<Pcg32>,
    table: Mutex<Table<R::Round>>,
}

impl<R: Rules> TableGame<R> {
    pub fn new(manifest: &GameManifest, seed: u64) -> Self {
        Self {
            rules: R::default(),
            info: GameInfo {
                id: manifest.id.clone(),
                name: manifest.name.clone(),
                version: manifest.version.clone(),
            },
            listeners: EventListeners::new(),
            limits: Mutex::new(Limits::from_config(&manifest.config)),
            paused: AtomicBool::new(false),
            rng: Mutex::new(Pcg32::seed_from_u64(seed)),
            table: Mutex::new(Table::default()),
        }
    }

    fn emit(&self, kind: GameEventKind, payload: Value) {
        self.listeners.emit(kind, payload);
    }

    fn set_bet(&self, data: &Value) -> ActionResult {
        let Some(amount) = data.get("amount").and_then(Value::as_f64) else {
            return ActionResult::rejected("setBet needs a numeric amount");
        };
        let limits = *self.limits.lock();
        if amount < limits.min_bet || amount > limits.max_bet {
            return ActionResult::rejected(format!(
                "bet {amount} outside [{}, {}]",
                limits.min_bet, limits.max_bet
            ));
        }
        self.table.lock().bet = amount;
        self.emit(GameEventKind::BetChanged, json!({ "amount": amount }));
        ActionResult::ok(json!({ "bet": amount }))
    }

    fn play_round(&self) -> ActionResult {
        if self.paused.load(Ordering::Acquire) {
            return ActionResult::rejected("game is paused");
        }

        let (outcome, balance) = {
            let mut table = self.table.lock();
            let bet = table.bet;
            if bet > table.balance {
                return ActionResult::rejected("insufficient balance");
            }
            self.emit(GameEventKind::SpinStart, json!({ "bet": bet }));

            table.balance -= bet;
            let outcome = self.rules.play(&mut self.rng.lock(), &mut table.round, bet);
            table.balance += outcome.payout;
            table.rounds += 1;
            (outcome, table.balance)
        };

        let bet = self.table.lock().bet;
        self.emit(GameEventKind::SpinEnd, outcome.detail.clone());
        if outcome.payout > bet {
            self.emit(GameEventKind::Win, json!({ "amount": outcome.payout - bet }));
        } else if outcome.payout < bet {
            self.emit(GameEventKind::Loss, json!({ "amount": bet - outcome.payout }));
        }

        ActionResult::ok(json!({
            "payout": outcome.payout,
            "balance": balance,
            "detail": outcome.detail,
        }))
    }
}

#[async_trait]
impl<R: Rules> GameModule for TableGame<R> {
    async fn initialize(&self, config: &InitConfig) -> anyhow::Result<()> {
        let limits = {
            let mut limits = self.limits.lock();
            if let Some(min) = config.game.min_bet {
                limits.min_bet = min;
            }
            if let Some(max) = config.game.max_bet {
                limits.max_bet = max;
            }
            *limits
        };
        if limits.min_bet > limits.max_bet {
            anyhow::bail!(
                "{} bet limits are inverted: min {} > max {}",
                self.info.id,
                limits.min_bet,
                limits.max_bet
            );
        }
        {
            let mut table = self.table.lock();
            table.balance = config.balance;
            table.bet = config
                .game
                .default_bet
                .unwrap_or(config.bet_amount)
                .max(limits.min_bet)
                .min(limits.max_bet);
        }
        tracing::debug!("{} initialized in {}", self.info.id, config.container);
        self.emit(GameEventKind::Initialized, Value::Null);
        Ok(())
    }

    async fn start(&self) -> anyhow::Result<()> {
        self.emit(GameEventKind::Started, Value::Null);
        Ok(())
    }

    fn pause(&self) {
        self.paused.store(true, Ordering::Release);
        self.emit(GameEventKind::Paused, Value::Null);
    }

    fn resume(&self) {
        self.paused.store(false, Ordering::Release);
        self.emit(GameEventKind::Resumed, Value::Null);
    }

    async fn destroy(&self) -> anyhow::Result<()> {
        self.emit(GameEventKind::Destroyed, Value::Null);
        Ok(())
    }

    async fn perform_action(&self, action: GameAction) -> anyhow::Result<ActionResult> {
        Ok(match action.kind.as_str() {
            "spin" => self.play_round(),
            "setBet" => self.set_bet(&action.data),
            other => ActionResult::rejected(format!("{} has no action '{}'", self.info.id, other)),
        })
    }

    fn resize(&self, width: u32, height: u32) {
        self.emit(GameEventKind::Resize, json!({ "width": width, "height": height }));
    }

    fn get_state(&self) -> Value {
        serde_json::to_value(&*self.table.lock()).unwrap_or_default()
    }

    fn set_state(&self, snapshot: &Value) -> anyhow::Result<()> {
        let table: Table<R::Round> = serde_json::from_value(snapshot.clone())
            .with_context(|| format!("invalid {} snapshot", self.info.id))?;
        *self.table.lock() = table;
        self.emit(GameEventKind::StateRestored, snapshot.clone());
        Ok(())
    }

    fn info(&self) -> GameInfo {
        self.info.clone()
    }

    fn supports_feature(&self, feature: &str) -> bool {
        self.rules.features().contains(&feature)
    }

    fn on(&self, event: GameEventKind, listener: EventListener) -> ListenerId {
        self.listeners.register(event, listener)
    }

    fn off(&self, id: ListenerId) -> bool {
        self.listeners.unregister(id)
    }
}

fn factory<R: Rules>() -> Arc<dyn ModuleFactory> {
    Arc::new(
        |manifest: &GameManifest| -> anyhow::Result<Arc<dyn GameModule>> {
            Ok(Arc::new(TableGame::<R>::new(manifest, rand::random())))
        },
    )
}

/// Module source with every built-in game, keyed by entry name.
pub fn builtin_source() -> StaticModuleSource {
    StaticModuleSource::new()
        .with("dice", factory::<Dice>())
        .with("card", factory::<HighCard>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cabinet_core::module::RiskLevel;
    use cabinet_shared::Version;

    fn init_config() -> InitConfig {
        InitConfig {
            container: "test".to_string(),
            bet_amount: 10.0,
            balance: 100.0,
            risk_level: RiskLevel::Medium,
            game: Default::default(),
        }
    }

    async fn dice() -> TableGame<Dice> {
        let manifest = GameManifest::new("dice", Version::new(1, 0, 0), "Dice");
        let game = TableGame::<Dice>::new(&manifest, 7);
        game.initialize(&init_config()).await.unwrap();
        game.start().await.unwrap();
        game
    }

    fn spin() -> GameAction {
        GameAction::new("spin", Value::Null)
    }

    // ============================================================================
    // Rounds
    // ============================================================================

    #[tokio::test]
    async fn test_spin_settles_wallet() {
        let game = dice().await;
        let result = game.perform_action(spin()).await.unwrap();
        assert!(result.success);

        let state = game.get_state();
        assert_eq!(state["rounds"], 1);
        let payout = result.data["payout"].as_f64().unwrap();
        assert_eq!(state["balance"].as_f64().unwrap(), 100.0 - 10.0 + payout);
    }

    #[tokio::test]
    async fn test_spin_rejected_when_broke_or_paused() {
        let game = dice().await;
        game.set_state(&json!({ "balance": 5.0, "bet": 10.0, "rounds": 3 }))
            .unwrap();
        let result = game.perform_action(spin()).await.unwrap();
        assert!(!result.success);

        game.set_state(&json!({ "balance": 50.0, "bet": 10.0, "rounds": 3 }))
            .unwrap();
        game.pause();
        assert!(!game.perform_action(spin()).await.unwrap().success);
        game.resume();
        assert!(game.perform_action(spin()).await.unwrap().success);
    }

    #[tokio::test]
    async fn test_set_bet_respects_limits() {
        let mut manifest = GameManifest::new("dice", Version::new(1, 0, 0), "Dice");
        manifest.config.min_bet = Some(1.0);
        manifest.config.max_bet = Some(20.0);
        let game = TableGame::<Dice>::new(&manifest, 1);
        game.initialize(&init_config()).await.unwrap();

        let ok = game
            .perform_action(GameAction::new("setBet", json!({ "amount": 15 })))
            .await
            .unwrap();
        assert!(ok.success);
        assert_eq!(game.get_state()["bet"], 15.0);

        let too_big = game
            .perform_action(GameAction::new("setBet", json!({ "amount": 50 })))
            .await
            .unwrap();
        assert!(!too_big.success);
        assert_eq!(game.get_state()["bet"], 15.0);
    }

    #[tokio::test]
    async fn test_manifest_max_below_host_bet_clamps() {
        let mut manifest = GameManifest::new("dice", Version::new(1, 0, 0), "Dice");
        manifest.config.max_bet = Some(0.5);
        assert!(manifest.validate().is_ok());

        let game = TableGame::<Dice>::new(&manifest, 3);
        let mut config = init_config();
        config.game = manifest.config.clone();
        game.initialize(&config).await.unwrap();
        assert_eq!(game.get_state()["bet"], 0.5);
    }

    #[tokio::test]
    async fn test_inverted_limits_fail_initialize() {
        let manifest = GameManifest::new("dice", Version::new(1, 0, 0), "Dice");
        let game = TableGame::<Dice>::new(&manifest, 3);
        let mut config = init_config();
        config.game.min_bet = Some(10.0);
        config.game.max_bet = Some(5.0);

        let err = game.initialize(&config).await.unwrap_err();
        assert!(err.to_string().contains("inverted"));
    }

    // ============================================================================
    // Snapshots
    // ============================================================================

    #[tokio::test]
    async fn test_state_roundtrip_restores_round() {
        let game = dice().await;
        game.perform_action(spin()).await.unwrap();
        let snapshot = game.get_state();

        game.perform_action(spin()).await.unwrap();
        game.set_state(&snapshot).unwrap();
        assert_eq!(game.get_state(), snapshot);
    }

    #[tokio::test]
    async fn test_garbage_snapshot_is_rejected() {
        let game = dice().await;
        let before = game.get_state();
        assert!(game.set_state(&json!("not a table")).is_err());
        assert_eq!(game.get_state(), before);
    }

    #[tokio::test]
    async fn test_builtin_source_knows_both_games() {
        let source = builtin_source();
        assert_eq!(source.entries(), vec!["card", "dice"]);
    }
}
