//! Event types shared between the host and its collaborators.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What kind of change a [`ReloadEvent`] reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReloadKind {
    /// A manifest changed; the target is a game id.
    ManifestChanged,
    /// A game file changed; the target is a path.
    FileChanged,
    /// A game asked to be reloaded; the target is a game id.
    GameReloading,
}

/// Change notification consumed by the hot-reload coordinator. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReloadEvent {
    pub kind: ReloadKind,
    /// Game id or file path, depending on `kind`.
    pub target: String,
    pub timestamp: DateTime<Utc>,
}

impl ReloadEvent {
    pub fn manifest_changed(id: impl Into<String>) -> Self {
        Self::now(ReloadKind::ManifestChanged, id.into())
    }

    pub fn file_changed(path: impl Into<String>) -> Self {
        Self::now(ReloadKind::FileChanged, path.into())
    }

    pub fn game_reloading(id: impl Into<String>) -> Self {
        Self::now(ReloadKind::GameReloading, id.into())
    }

    fn now(kind: ReloadKind, target: String) -> Self {
        Self {
            kind,
            target,
            timestamp: Utc::now(),
        }
    }
}

/// Lifecycle and gameplay events a game may emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GameEventKind {
    Initialized,
    Started,
    Paused,
    Resumed,
    Destroyed,
    SpinStart,
    SpinEnd,
    Win,
    Loss,
    BetChanged,
    RiskLevelChanged,
    Resize,
    StateRestored,
    SettingsUpdated,
}

impl GameEventKind {
    pub const ALL: [GameEventKind; 14] = [
        GameEventKind::Initialized,
        GameEventKind::Started,
        GameEventKind::Paused,
        GameEventKind::Resumed,
        GameEventKind::Destroyed,
        GameEventKind::SpinStart,
        GameEventKind::SpinEnd,
        GameEventKind::Win,
        GameEventKind::Loss,
        GameEventKind::BetChanged,
        GameEventKind::RiskLevelChanged,
        GameEventKind::Resize,
        GameEventKind::StateRestored,
        GameEventKind::SettingsUpdated,
    ];

    /// Wire name of the event, as used by host UIs.
    pub fn as_str(&self) -> &'static str {
        match self {
            GameEventKind::Initialized => "initialized",
            GameEventKind::Started => "started",
            GameEventKind::Paused => "paused",
            GameEventKind::Resumed => "resumed",
            GameEventKind::Destroyed => "destroyed",
            GameEventKind::SpinStart => "spinStart",
            GameEventKind::SpinEnd => "spinEnd",
            GameEventKind::Win => "win",
            GameEventKind::Loss => "loss",
            GameEventKind::BetChanged => "betChanged",
            GameEventKind::RiskLevelChanged => "riskLevelChanged",
            GameEventKind::Resize => "resize",
            GameEventKind::StateRestored => "stateRestored",
            GameEventKind::SettingsUpdated => "settingsUpdated",
        }
    }

    /// Parse a wire name. Returns `None` for unknown events.
    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names_roundtrip() {
        for kind in GameEventKind::ALL {
            assert_eq!(GameEventKind::from_str(kind.as_str()), Some(kind));
        }
        assert_eq!(GameEventKind::from_str("explode"), None);
    }

    #[test]
    fn test_reload_event_constructors() {
        let event = ReloadEvent::file_changed("games/dice/dice.js");
        assert_eq!(event.kind, ReloadKind::FileChanged);
        assert_eq!(event.target, "games/dice/dice.js");

        let json = serde_json::to_value(ReloadEvent::manifest_changed("dice")).unwrap();
        assert_eq!(json["kind"], "manifestChanged");
    }
}
