//! Game module contract
//!
//! Every loadable game implements [`GameModule`]. The orchestrator only ever
//! talks to games through this trait; a module is resolved from a manifest's
//! entry reference by a [`ModuleSource`] and checked once for conformance
//! before it can become a [`GameInstance`](crate::runtime::GameInstance).
//!
//! Natively written modules conform automatically. Modules bridged from a
//! dynamic source may expose only part of the surface, which they report
//! through [`GameModule::exports`]; such modules are rejected.

mod events;
mod source;

use std::sync::Arc;

use async_trait::async_trait;
use cabinet_shared::{GameConfig, GameEventKind, Version};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{HostError, HostResult};

pub use events::{EventListener, EventListeners, GameEvent, ListenerId};
pub use source::{ModuleCache, ModuleFactory, ModuleKey, ModuleSource, StaticModuleSource};

bitflags::bitflags! {
    /// Methods a module exposes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Capabilities: u16 {
        const INITIALIZE = 1 << 0;
        const START = 1 << 1;
        const PAUSE = 1 << 2;
        const RESUME = 1 << 3;
        const DESTROY = 1 << 4;
        const PERFORM_ACTION = 1 << 5;
        const RESIZE = 1 << 6;
        const GET_STATE = 1 << 7;
        const SET_STATE = 1 << 8;
        const GET_INFO = 1 << 9;
        const SUPPORTS_FEATURE = 1 << 10;
        const AVAILABLE_EVENTS = 1 << 11;
        const EVENTS = 1 << 12;
    }
}

impl Capabilities {
    /// The full set a module must expose to be loadable.
    pub const REQUIRED: Capabilities = Capabilities::all();
}

/// Risk setting reported by the betting service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    #[default]
    Medium,
    High,
}

/// Configuration handed to [`GameModule::initialize`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitConfig {
    /// Host container the game renders into.
    pub container: String,
    pub bet_amount: f64,
    pub balance: f64,
    pub risk_level: RiskLevel,
    /// The manifest's `config` block.
    pub game: GameConfig,
}

/// Identity a module reports about itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameInfo {
    pub id: String,
    pub name: String,
    pub version: Version,
}

/// A player or host action routed to the active game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameAction {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
}

impl GameAction {
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            data,
        }
    }
}

/// Outcome of [`GameModule::perform_action`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub success: bool,
    #[serde(default)]
    pub data: Value,
}

impl ActionResult {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data,
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            data: Value::String(reason.into()),
        }
    }
}

/// The capability set every loadable game implements.
#[async_trait]
pub trait GameModule: Send + Sync {
    /// Prepare the game. Called once, before [`start`](Self::start).
    async fn initialize(&self, config: &InitConfig) -> anyhow::Result<()>;

    async fn start(&self) -> anyhow::Result<()>;

    fn pause(&self);

    fn resume(&self);

    /// Release everything the game holds. Called at most once.
    async fn destroy(&self) -> anyhow::Result<()>;

    async fn perform_action(&self, action: GameAction) -> anyhow::Result<ActionResult>;

    fn resize(&self, width: u32, height: u32);

    /// Serializable snapshot of the game state.
    fn get_state(&self) -> Value;

    fn set_state(&self, snapshot: &Value) -> anyhow::Result<()>;

    fn info(&self) -> GameInfo;

    fn supports_feature(&self, _feature: &str) -> bool {
        false
    }

    fn available_events(&self) -> Vec<GameEventKind> {
        GameEventKind::ALL.to_vec()
    }

    fn on(&self, event: GameEventKind, listener: EventListener) -> ListenerId;

    fn off(&self, id: ListenerId) -> bool;

    /// Capabilities this module actually provides.
    fn exports(&self) -> Capabilities {
        Capabilities::all()
    }
}

/// Result of checking a freshly created module against the required set.
pub enum Conformance {
    Conforming(Arc<dyn GameModule>),
    NonConforming { missing: Capabilities },
}

impl Conformance {
    pub fn classify(module: Arc<dyn GameModule>) -> Self {
        let missing = Capabilities::REQUIRED.difference(module.exports());
        if missing.is_empty() {
            Conformance::Conforming(module)
        } else {
            Conformance::NonConforming { missing }
        }
    }

    /// Unwrap a conforming module, or fail with a capability error for `id`.
    pub fn into_module(self, id: &str) -> HostResult<Arc<dyn GameModule>> {
        match self {
            Conformance::Conforming(module) => Ok(module),
            Conformance::NonConforming { missing } => Err(HostError::Capability {
                id: id.to_string(),
                missing,
            }),
        }
    }

    pub fn is_conforming(&self) -> bool {
        matches!(self, Conformance::Conforming(_))
    }
}
