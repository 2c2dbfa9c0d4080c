//! Collaborators the orchestrator depends on but does not own.

use cabinet_shared::Version;
use parking_lot::Mutex;

use super::LifecycleState;
use crate::module::RiskLevel;

/// Source of the player's current wager settings.
pub trait BettingService: Send + Sync {
    fn current_bet(&self) -> f64;
    fn balance(&self) -> f64;
    fn risk_level(&self) -> RiskLevel;
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Wager {
    bet: f64,
    balance: f64,
    risk: RiskLevel,
}

/// In-process betting settings, adjustable at runtime.
pub struct LocalBetting {
    wager: Mutex<Wager>,
}

impl LocalBetting {
    pub fn new(bet: f64, balance: f64) -> Self {
        Self {
            wager: Mutex::new(Wager {
                bet,
                balance,
                risk: RiskLevel::default(),
            }),
        }
    }

    pub fn set_bet(&self, bet: f64) {
        self.wager.lock().bet = bet;
    }

    pub fn set_balance(&self, balance: f64) {
        self.wager.lock().balance = balance;
    }

    pub fn set_risk_level(&self, risk: RiskLevel) {
        self.wager.lock().risk = risk;
    }
}

impl Default for LocalBetting {
    fn default() -> Self {
        Self::new(10.0, 1000.0)
    }
}

impl BettingService for LocalBetting {
    fn current_bet(&self) -> f64 {
        self.wager.lock().bet
    }

    fn balance(&self) -> f64 {
        self.wager.lock().balance
    }

    fn risk_level(&self) -> RiskLevel {
        self.wager.lock().risk
    }
}

/// What the host shows about the active game.
#[derive(Debug, Clone, PartialEq)]
pub struct GameSummary {
    pub id: String,
    pub name: String,
    pub version: Version,
    pub state: LifecycleState,
}

/// Action offered on the failure panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureAction {
    /// Try loading a game again.
    Retry,
    /// Restart the whole host.
    FullReload,
}

/// Persistent notice shown when no game could be brought up.
#[derive(Debug, Clone, PartialEq)]
pub struct FailurePanel {
    pub message: String,
    pub actions: Vec<FailureAction>,
    pub dismissable: bool,
}

impl FailurePanel {
    pub fn boot_failure(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            actions: vec![FailureAction::Retry, FailureAction::FullReload],
            dismissable: true,
        }
    }
}

/// The surface games render into.
pub trait HostSurface: Send + Sync {
    /// Container reference passed to games on initialize.
    fn container(&self) -> String;

    /// Game currently chosen in the host's selector, if any.
    fn selected_game(&self) -> Option<String>;

    /// Whether the surface can currently display a game.
    fn is_renderable(&self) -> bool;

    fn refresh_summary(&self, summary: &GameSummary);

    fn show_failure(&self, panel: FailurePanel);
}

/// Surface without a display. Records what it was asked to show and logs it.
pub struct HeadlessSurface {
    container: String,
    selected: Mutex<Option<String>>,
    renderable: Mutex<bool>,
    summary: Mutex<Option<GameSummary>>,
    failure: Mutex<Option<FailurePanel>>,
}

impl HeadlessSurface {
    pub fn new(container: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            selected: Mutex::new(None),
            renderable: Mutex::new(true),
            summary: Mutex::new(None),
            failure: Mutex::new(None),
        }
    }

    pub fn select(&self, id: Option<String>) {
        *self.selected.lock() = id;
    }

    pub fn set_renderable(&self, renderable: bool) {
        *self.renderable.lock() = renderable;
    }

    pub fn summary(&self) -> Option<GameSummary> {
        self.summary.lock().clone()
    }

    pub fn failure(&self) -> Option<FailurePanel> {
        self.failure.lock().clone()
    }

    /// Dismiss the failure panel. Returns true if one was shown.
    pub fn dismiss_failure(&self) -> bool {
        self.failure.lock().take().is_some()
    }
}

impl Default for HeadlessSurface {
    fn default() -> Self {
        Self::new("game-container")
    }
}

impl HostSurface for HeadlessSurface {
    fn container(&self) -> String {
        self.container.clone()
    }

    fn selected_game(&self) -> Option<String> {
        self.selected.lock().clone()
    }

    fn is_renderable(&self) -> bool {
        *self.renderable.lock()
    }

    fn refresh_summary(&self, summary: &GameSummary) {
        tracing::info!(
            "Now playing: {} {} ({:?})",
            summary.name,
            summary.version,
            summary.state
        );
        *self.summary.lock() = Some(summary.clone());
    }

    fn show_failure(&self, panel: FailurePanel) {
        tracing::error!("{}", panel.message);
        *self.failure.lock() = Some(panel);
    }
}
