//! A constructed game: module, manifest and lifecycle state.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use cabinet_shared::GameManifest;
use parking_lot::Mutex;
use serde_json::Value;
use smallvec::SmallVec;

use crate::error::{HostError, HostResult, LifecyclePhase};
use crate::events::{EventBus, HostEvent};
use crate::module::{ActionResult, GameAction, GameModule, InitConfig, ListenerId};

/// Lifecycle of a [`GameInstance`].
///
/// `Uninitialized → Initializing → Running ⇄ Paused → Destroying → Destroyed`.
/// Only `Running ⇄ Paused` goes both ways.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    Uninitialized,
    Initializing,
    Running,
    Paused,
    Destroying,
    Destroyed,
}

impl LifecycleState {
    pub fn is_live(self) -> bool {
        matches!(self, LifecycleState::Running | LifecycleState::Paused)
    }

    pub fn is_torn_down(self) -> bool {
        matches!(self, LifecycleState::Destroying | LifecycleState::Destroyed)
    }
}

/// A conforming module bound to the manifest it was built from.
pub struct GameInstance {
    manifest: Arc<GameManifest>,
    module: Arc<dyn GameModule>,
    state: Mutex<LifecycleState>,
    forwarders: Mutex<SmallVec<[ListenerId; 16]>>,
}

impl GameInstance {
    /// Wrap a module that already passed the conformance check.
    pub fn new(manifest: Arc<GameManifest>, module: Arc<dyn GameModule>) -> Self {
        Self {
            manifest,
            module,
            state: Mutex::new(LifecycleState::Uninitialized),
            forwarders: Mutex::new(SmallVec::new()),
        }
    }

    pub fn id(&self) -> &str {
        &self.manifest.id
    }

    pub fn manifest(&self) -> &Arc<GameManifest> {
        &self.manifest
    }

    pub fn module(&self) -> &Arc<dyn GameModule> {
        &self.module
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.lock()
    }

    pub fn is_running(&self) -> bool {
        self.state() == LifecycleState::Running
    }

    fn transition(
        &self,
        phase: LifecyclePhase,
        from: &[LifecycleState],
        to: LifecycleState,
    ) -> HostResult<()> {
        let mut state = self.state.lock();
        if !from.contains(&state) {
            return Err(HostError::illegal_transition(self.id(), *state, phase));
        }
        tracing::trace!("{}: {:?} -> {:?}", self.id(), *state, to);
        *state = to;
        Ok(())
    }

    async fn bounded<T>(
        &self,
        phase: LifecyclePhase,
        limit: Duration,
        call: impl Future<Output = anyhow::Result<T>>,
    ) -> HostResult<T> {
        match tokio::time::timeout(limit, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(HostError::lifecycle(self.id(), phase, format!("{e:#}"))),
            Err(_) => Err(HostError::Timeout {
                id: self.id().to_string(),
                phase,
                after: limit,
            }),
        }
    }

    pub async fn initialize(&self, config: &InitConfig, limit: Duration) -> HostResult<()> {
        self.transition(
            LifecyclePhase::Initialize,
            &[LifecycleState::Uninitialized],
            LifecycleState::Initializing,
        )?;
        self.bounded(LifecyclePhase::Initialize, limit, self.module.initialize(config))
            .await
    }

    pub async fn start(&self, limit: Duration) -> HostResult<()> {
        {
            let state = self.state.lock();
            if *state != LifecycleState::Initializing {
                return Err(HostError::illegal_transition(
                    self.id(),
                    *state,
                    LifecyclePhase::Start,
                ));
            }
        }
        self.bounded(LifecyclePhase::Start, limit, self.module.start())
            .await?;
        self.transition(
            LifecyclePhase::Start,
            &[LifecycleState::Initializing],
            LifecycleState::Running,
        )
    }

    pub fn pause(&self) -> HostResult<()> {
        self.transition(
            LifecyclePhase::Pause,
            &[LifecycleState::Running],
            LifecycleState::Paused,
        )?;
        self.module.pause();
        Ok(())
    }

    pub fn resume(&self) -> HostResult<()> {
        self.transition(
            LifecyclePhase::Resume,
            &[LifecycleState::Paused],
            LifecycleState::Running,
        )?;
        self.module.resume();
        Ok(())
    }

    /// Destroy the module. Runs at most once; later calls return `Ok(false)`.
    ///
    /// The instance ends up `Destroyed` even when the module's `destroy`
    /// fails or times out.
    pub async fn destroy(&self, limit: Duration) -> HostResult<bool> {
        {
            let mut state = self.state.lock();
            if state.is_torn_down() {
                return Ok(false);
            }
            *state = LifecycleState::Destroying;
        }
        self.detach();

        let result = self
            .bounded(LifecyclePhase::Destroy, limit, self.module.destroy())
            .await;
        *self.state.lock() = LifecycleState::Destroyed;
        result.map(|()| true)
    }

    pub async fn perform_action(
        &self,
        action: GameAction,
        limit: Duration,
    ) -> HostResult<ActionResult> {
        let state = self.state();
        if state != LifecycleState::Running {
            return Err(HostError::illegal_transition(
                self.id(),
                state,
                LifecyclePhase::Action,
            ));
        }
        self.bounded(LifecyclePhase::Action, limit, self.module.perform_action(action))
            .await
    }

    pub fn get_state(&self) -> Value {
        self.module.get_state()
    }

    pub fn set_state(&self, snapshot: &Value) -> HostResult<()> {
        let state = self.state();
        if state.is_torn_down() {
            return Err(HostError::illegal_transition(
                self.id(),
                state,
                LifecyclePhase::SetState,
            ));
        }
        self.module
            .set_state(snapshot)
            .map_err(|e| HostError::lifecycle(self.id(), LifecyclePhase::SetState, format!("{e:#}")))
    }

    pub fn resize(&self, width: u32, height: u32) {
        if !self.state().is_torn_down() {
            self.module.resize(width, height);
        }
    }

    pub fn supports_feature(&self, feature: &str) -> bool {
        self.module.supports_feature(feature)
    }

    /// Forward every event the module advertises to `bus` as
    /// [`HostEvent::Game`].
    pub fn attach(&self, bus: &EventBus) {
        let mut forwarders = self.forwarders.lock();
        if !forwarders.is_empty() {
            return;
        }
        for kind in self.module.available_events() {
            let bus = bus.clone();
            let id = self.id().to_string();
            let listener_id = self.module.on(
                kind,
                Arc::new(move |event| {
                    bus.publish(HostEvent::Game {
                        id: id.clone(),
                        event: event.clone(),
                    });
                }),
            );
            forwarders.push(listener_id);
        }
    }

    /// Stop forwarding events.
    pub fn detach(&self) {
        let forwarders = std::mem::take(&mut *self.forwarders.lock());
        for listener_id in forwarders {
            self.module.off(listener_id);
        }
    }
}

impl std::fmt::Debug for GameInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameInstance")
            .field("id", &self.manifest.id)
            .field("version", &self.manifest.version)
            .field("state", &self.state())
            .finish()
    }
}
