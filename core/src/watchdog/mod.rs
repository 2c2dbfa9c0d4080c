//! Bootstrap watchdog
//!
//! Makes sure some game ends up running after the host starts, without
//! reporting transient slowness as failure.
//!
//! ```text
//! Idle → Probing ─┬─────────────→ Satisfied ── recheck ──→ (Forcing)
//!                 └→ Forcing → Probing ┘
//!                                   deadline → last attempt → Failed
//! ```
//!
//! Normal starts probe strictly every poll interval and force one load after
//! a few misses. A detected restart (stale heartbeat) probes leniently and
//! forces loads on a slower, bounded cadence. At the absolute deadline the
//! latch is cleared and the default game gets one last try; only if that
//! fails is a failure panel shown.

mod heartbeat;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};

use crate::config::WatchdogConfig;
use crate::error::HostResult;
use crate::library::resolve_selector;
use crate::module::Capabilities;
use crate::runtime::{FailurePanel, LoadOptions, Orchestrator};

pub use heartbeat::{FileLastSeen, LastSeenStore, MemoryLastSeen};

/// How strict a probe is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeMode {
    /// Some instance is active.
    Lenient,
    /// The active instance is running, conforming and the surface can show it.
    Strict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogPhase {
    Idle,
    Probing,
    Forcing,
    Satisfied,
    Failed,
}

/// What the watchdog supervises.
#[async_trait]
pub trait BootTarget: Send + Sync {
    /// Called once before the first probe.
    async fn prepare(&self) {}

    fn probe(&self, mode: ProbeMode) -> bool;

    /// Registered game ids, in preference order.
    fn candidates(&self) -> Vec<String>;

    /// Raw value of the host's game selector.
    fn selected(&self) -> Option<String>;

    async fn force_load(&self, id: &str) -> HostResult<()>;

    fn reset_in_flight(&self);

    fn report_failure(&self, panel: FailurePanel);
}

#[async_trait]
impl BootTarget for Orchestrator {
    async fn prepare(&self) {
        self.initialize().await;
    }

    fn probe(&self, mode: ProbeMode) -> bool {
        let Some(active) = self.active_game() else {
            return false;
        };
        match mode {
            ProbeMode::Lenient => true,
            ProbeMode::Strict => {
                active.is_running()
                    && active.module().exports().contains(Capabilities::REQUIRED)
                    && self.surface().is_renderable()
            }
        }
    }

    fn candidates(&self) -> Vec<String> {
        self.registry().ids()
    }

    fn selected(&self) -> Option<String> {
        self.surface().selected_game()
    }

    async fn force_load(&self, id: &str) -> HostResult<()> {
        self.load_game(id, LoadOptions::forced()).await.map(|_| ())
    }

    fn reset_in_flight(&self) {
        Orchestrator::reset_in_flight(self);
    }

    fn report_failure(&self, panel: FailurePanel) {
        self.surface().show_failure(panel);
    }
}

/// Handle to the running watchdog task. Dropping it stops the watchdog and
/// every timer it owns.
pub struct BootstrapWatchdog {
    phase: watch::Receiver<WatchdogPhase>,
    forced: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl BootstrapWatchdog {
    pub fn spawn(
        target: Arc<dyn BootTarget>,
        heartbeat: Arc<dyn LastSeenStore>,
        config: WatchdogConfig,
        default_game: impl Into<String>,
    ) -> Self {
        let (phase_tx, phase) = watch::channel(WatchdogPhase::Idle);
        let forced = Arc::new(AtomicUsize::new(0));
        let supervisor = Supervisor {
            target,
            heartbeat,
            config,
            default_game: default_game.into(),
            phase: phase_tx,
            forced: Arc::clone(&forced),
        };
        let task = tokio::spawn(supervisor.run());
        Self {
            phase,
            forced,
            task,
        }
    }

    pub fn phase(&self) -> WatchdogPhase {
        *self.phase.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<WatchdogPhase> {
        self.phase.clone()
    }

    /// Forced loads issued so far, including the last attempt.
    pub fn forced_loads(&self) -> usize {
        self.forced.load(Ordering::Relaxed)
    }

    pub fn stop(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for BootstrapWatchdog {
    fn drop(&mut self) {
        self.task.abort();
    }
}

struct Supervisor {
    target: Arc<dyn BootTarget>,
    heartbeat: Arc<dyn LastSeenStore>,
    config: WatchdogConfig,
    default_game: String,
    phase: watch::Sender<WatchdogPhase>,
    forced: Arc<AtomicUsize>,
}

impl Supervisor {
    async fn run(self) {
        self.target.prepare().await;
        let restarted = self.detect_restart();
        let deadline = Instant::now() + self.config.deadline();
        let mode = if restarted {
            ProbeMode::Lenient
        } else {
            ProbeMode::Strict
        };

        self.set_phase(WatchdogPhase::Probing);
        let satisfied = if restarted {
            self.restart_cycle(deadline).await
        } else {
            self.probe_cycle(mode, deadline).await
        };

        let satisfied = satisfied || {
            tokio::time::sleep_until(deadline).await;
            self.touch();
            self.target.probe(mode) || self.last_resort("no game started before the deadline").await
        };
        if !satisfied {
            return;
        }

        self.set_phase(WatchdogPhase::Satisfied);
        tracing::info!("Boot satisfied");
        self.recheck(mode).await;
    }

    fn set_phase(&self, phase: WatchdogPhase) {
        tracing::trace!("Watchdog phase: {:?}", phase);
        self.phase.send_replace(phase);
    }

    fn touch(&self) {
        self.heartbeat.touch(Utc::now());
    }

    fn detect_restart(&self) -> bool {
        let now = Utc::now();
        let threshold = self.config.restart_threshold();
        let restarted = self.heartbeat.last_seen().is_some_and(|last| {
            (now - last)
                .to_std()
                .is_ok_and(|gap| gap > threshold)
        });
        self.heartbeat.touch(now);
        if restarted {
            tracing::info!("Host restart detected, probing leniently");
        }
        restarted
    }

    /// Sleep for `delay`, but never past `deadline`. Returns false if the
    /// deadline was reached.
    async fn wait(&self, delay: Duration, deadline: Instant) -> bool {
        let wake = (Instant::now() + delay).min(deadline);
        tokio::time::sleep_until(wake).await;
        wake < deadline
    }

    /// Selector value resolved against registered ids, else the first
    /// registered id, else the configured default.
    fn pick_game(&self) -> String {
        let candidates = self.target.candidates();
        if let Some(selected) = self.target.selected() {
            match resolve_selector(&selected, &candidates) {
                Ok(id) => return id,
                Err(e) => tracing::debug!("Ignoring selector value: {}", e),
            }
        }
        candidates
            .into_iter()
            .next()
            .unwrap_or_else(|| self.default_game.clone())
    }

    async fn force(&self, id: &str, deadline: Instant) -> bool {
        self.set_phase(WatchdogPhase::Forcing);
        self.forced.fetch_add(1, Ordering::Relaxed);
        tracing::info!("Forcing load of {}", id);

        let outcome = tokio::time::timeout_at(deadline, self.target.force_load(id)).await;
        self.set_phase(WatchdogPhase::Probing);
        match outcome {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                tracing::warn!("Forced load of {} failed: {}", id, e);
                false
            }
            Err(_) => {
                tracing::warn!("Forced load of {} still pending at the deadline", id);
                false
            }
        }
    }

    async fn probe_cycle(&self, mode: ProbeMode, deadline: Instant) -> bool {
        let mut forced = false;
        for attempt in 1..=self.config.max_attempts {
            if !self.wait(self.config.poll_interval(), deadline).await {
                return false;
            }
            self.touch();
            if self.target.probe(mode) {
                tracing::debug!("Probe {} succeeded", attempt);
                return true;
            }
            tracing::trace!("Probe {} failed", attempt);

            if !forced && attempt >= self.config.force_after {
                forced = true;
                let id = self.pick_game();
                if self.force(&id, deadline).await && self.target.probe(mode) {
                    return true;
                }
            }
        }
        false
    }

    async fn restart_cycle(&self, deadline: Instant) -> bool {
        for retry in 1..=self.config.restart_max_retries {
            if !self.wait(self.config.restart_retry_interval(), deadline).await {
                return false;
            }
            self.touch();
            if self.target.probe(ProbeMode::Lenient) {
                return true;
            }

            let id = self.pick_game();
            tracing::debug!(
                "Restart retry {}/{}",
                retry,
                self.config.restart_max_retries
            );
            if self.force(&id, deadline).await && self.target.probe(ProbeMode::Lenient) {
                return true;
            }
        }
        false
    }

    /// Clear the latch, try the default game once more, and show the failure
    /// panel if that fails too.
    async fn last_resort(&self, reason: &str) -> bool {
        tracing::warn!("{}; last attempt with {}", reason, self.default_game);
        self.target.reset_in_flight();

        self.set_phase(WatchdogPhase::Forcing);
        self.forced.fetch_add(1, Ordering::Relaxed);
        let result = self.target.force_load(&self.default_game).await;
        if result.is_ok() && self.target.probe(ProbeMode::Lenient) {
            return true;
        }

        let detail = match result {
            Ok(()) => "the game did not stay active".to_string(),
            Err(e) => e.to_string(),
        };
        self.set_phase(WatchdogPhase::Failed);
        self.target.report_failure(FailurePanel::boot_failure(format!(
            "No game could be started ({detail})"
        )));
        false
    }

    /// One delayed check that the game did not die silently after boot.
    async fn recheck(&self, mode: ProbeMode) {
        tokio::time::sleep(self.config.recheck_delay()).await;
        self.touch();
        if self.target.probe(mode) {
            return;
        }

        tracing::warn!("Active game disappeared after boot");
        let id = self.pick_game();
        let deadline = Instant::now() + self.config.deadline();
        let recovered = (self.force(&id, deadline).await && self.target.probe(ProbeMode::Lenient))
            || self.last_resort("reload after boot failed").await;
        if recovered {
            self.set_phase(WatchdogPhase::Satisfied);
        }
    }
}
