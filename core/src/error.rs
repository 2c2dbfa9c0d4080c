//! Error taxonomy for the game host.

use std::time::Duration;

use cabinet_shared::{ManifestError, VersionError};
use serde::{Deserialize, Serialize};

use crate::module::Capabilities;
use crate::runtime::LifecycleState;

/// Result alias used throughout the crate.
pub type HostResult<T> = Result<T, HostError>;

/// Lifecycle call that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecyclePhase {
    Initialize,
    Start,
    Pause,
    Resume,
    Destroy,
    Action,
    SetState,
}

impl std::fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LifecyclePhase::Initialize => "initialize",
            LifecyclePhase::Start => "start",
            LifecyclePhase::Pause => "pause",
            LifecyclePhase::Resume => "resume",
            LifecyclePhase::Destroy => "destroy",
            LifecyclePhase::Action => "performAction",
            LifecyclePhase::SetState => "setState",
        };
        f.write_str(name)
    }
}

/// Errors produced by the registry, orchestrator and state layers.
#[derive(Debug, Clone, thiserror::Error)]
pub enum HostError {
    /// A manifest or configuration field is malformed.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The module behind a manifest does not expose the full capability set.
    /// Such modules are rejected, never adapted.
    #[error("game '{id}' is missing required capabilities: {missing:?}")]
    Capability { id: String, missing: Capabilities },

    /// Fetching, parsing or importing failed.
    #[error("failed to load '{target}': {reason}")]
    Load { target: String, reason: String },

    /// A lifecycle call failed or the transition was illegal.
    #[error("game '{id}' failed during {phase}: {reason}")]
    Lifecycle {
        id: String,
        phase: LifecyclePhase,
        reason: String,
    },

    /// A lifecycle call exceeded its time budget and was cancelled.
    #[error("game '{id}' timed out during {phase} after {after:?}")]
    Timeout {
        id: String,
        phase: LifecyclePhase,
        after: Duration,
    },

    /// A load was requested while another one was in flight.
    #[error("load of '{requested}' rejected: another load is in flight")]
    ConcurrencyRejection { requested: String },

    /// No game is active for an operation that needs one.
    #[error("no active game")]
    NoActiveGame,

    /// Durable snapshot storage failed.
    #[error("storage error: {0}")]
    Storage(String),
}

impl HostError {
    pub fn load(target: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        HostError::Load {
            target: target.into(),
            reason: reason.to_string(),
        }
    }

    pub fn lifecycle(
        id: impl Into<String>,
        phase: LifecyclePhase,
        reason: impl std::fmt::Display,
    ) -> Self {
        HostError::Lifecycle {
            id: id.into(),
            phase,
            reason: reason.to_string(),
        }
    }

    pub fn illegal_transition(id: &str, from: LifecycleState, phase: LifecyclePhase) -> Self {
        Self::lifecycle(id, phase, format!("illegal transition from {:?}", from))
    }

    /// Stable classification used in emitted error events.
    pub fn kind(&self) -> ErrorKind {
        match self {
            HostError::Configuration(_) => ErrorKind::Configuration,
            HostError::Capability { .. } => ErrorKind::Capability,
            HostError::Load { .. } => ErrorKind::Load,
            HostError::Lifecycle { .. } => ErrorKind::Lifecycle,
            HostError::Timeout { .. } => ErrorKind::Timeout,
            HostError::ConcurrencyRejection { .. } => ErrorKind::ConcurrencyRejection,
            HostError::NoActiveGame => ErrorKind::NoActiveGame,
            HostError::Storage(_) => ErrorKind::Storage,
        }
    }
}

impl From<ManifestError> for HostError {
    fn from(e: ManifestError) -> Self {
        HostError::Configuration(e.to_string())
    }
}

impl From<VersionError> for HostError {
    fn from(e: VersionError) -> Self {
        HostError::Configuration(e.to_string())
    }
}

/// Error classification carried by [`HostEvent::Error`](crate::events::HostEvent::Error).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Terminal failure of a `load_game` call after recovery gave up.
    GameLoadingFailed,
    Configuration,
    Capability,
    Load,
    Lifecycle,
    Timeout,
    ConcurrencyRejection,
    NoActiveGame,
    Storage,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::GameLoadingFailed => "game_loading_failed",
            ErrorKind::Configuration => "configuration",
            ErrorKind::Capability => "capability",
            ErrorKind::Load => "load",
            ErrorKind::Lifecycle => "lifecycle",
            ErrorKind::Timeout => "timeout",
            ErrorKind::ConcurrencyRejection => "concurrency_rejection",
            ErrorKind::NoActiveGame => "no_active_game",
            ErrorKind::Storage => "storage",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_mapping() {
        let err = HostError::load("games/dice/manifest.json", "not found");
        assert_eq!(err.kind(), ErrorKind::Load);

        let err = HostError::Capability {
            id: "dice".to_string(),
            missing: Capabilities::GET_STATE,
        };
        assert_eq!(err.kind(), ErrorKind::Capability);
        assert!(err.to_string().contains("dice"));
    }

    #[test]
    fn test_manifest_error_is_configuration() {
        let err: HostError = ManifestError::MissingId.into();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_error_kind_wire_name() {
        assert_eq!(ErrorKind::GameLoadingFailed.as_str(), "game_loading_failed");
        assert_eq!(
            serde_json::to_string(&ErrorKind::GameLoadingFailed).unwrap(),
            "\"game_loading_failed\""
        );
    }
}
