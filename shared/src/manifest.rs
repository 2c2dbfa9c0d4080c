//! Game manifest types.
//!
//! A manifest is the declarative description of a loadable game, stored as
//! `manifest.json` next to the game's code:
//!
//! ```json
//! {
//!   "id": "dice",
//!   "version": "1.1.0",
//!   "name": "Dice",
//!   "main": "dice",
//!   "assets": [{ "path": "dice.png", "type": "image" }],
//!   "config": { "minBet": 1, "maxBet": 100, "defaultBet": 10 }
//! }
//! ```
//!
//! Fields the host does not understand are kept in `extra` untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::version::Version;

/// Error raised by manifest validation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ManifestError {
    #[error("manifest has no id")]
    MissingId,
    #[error("manifest '{id}' has an empty entry reference")]
    MissingEntry { id: String },
    #[error("manifest '{id}': {field} = {value} is outside [{min}, {max}]")]
    BetOutOfRange {
        id: String,
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
}

/// A single asset declared by a game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetRef {
    /// Path relative to the manifest directory.
    pub path: String,
    /// Optional asset type hint (`"image"`, `"audio"`, ...).
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

/// Per-game configuration block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_bet: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_bet: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_bet: Option<f64>,
    /// Game-specific settings, opaque to the host.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl GameConfig {
    /// `(min, max)` bet, open-ended where the manifest leaves them out.
    pub fn bet_limits(&self) -> (f64, f64) {
        (
            self.min_bet.unwrap_or(0.0),
            self.max_bet.unwrap_or(f64::MAX),
        )
    }
}

/// Declarative description of a loadable game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameManifest {
    /// Unique game identifier. Empty means "missing" and is rejected on
    /// registration.
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub version: Version,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Entry reference resolved into a module at load time.
    #[serde(default)]
    pub main: String,
    #[serde(default)]
    pub assets: Vec<AssetRef>,
    #[serde(default)]
    pub config: GameConfig,
    /// Fields not used by the host.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl GameManifest {
    /// Minimal manifest with the given id, name and entry reference.
    pub fn new(id: impl Into<String>, version: Version, name: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            main: id.clone(),
            id,
            version,
            name: name.into(),
            description: None,
            category: None,
            tags: Vec::new(),
            assets: Vec::new(),
            config: GameConfig::default(),
            extra: Map::new(),
        }
    }

    /// Synthesize a stand-in manifest for an id the registry doesn't know.
    ///
    /// The entry reference is the id itself and the display name is derived
    /// from it (`"lucky-dice"` becomes `"Lucky Dice"`).
    pub fn fallback(id: &str) -> Self {
        let mut manifest = Self::new(id, Version::default(), display_name(id));
        manifest
            .extra
            .insert("synthesized".to_string(), Value::Bool(true));
        manifest
    }

    /// Returns true if this manifest was produced by [`GameManifest::fallback`].
    pub fn is_synthesized(&self) -> bool {
        matches!(self.extra.get("synthesized"), Some(Value::Bool(true)))
    }

    /// Entry reference, defaulting to the id when `main` is empty.
    pub fn entry(&self) -> &str {
        if self.main.is_empty() {
            &self.id
        } else {
            &self.main
        }
    }

    /// Check the fields the host relies on.
    pub fn validate(&self) -> Result<(), ManifestError> {
        if self.id.trim().is_empty() {
            return Err(ManifestError::MissingId);
        }
        if self.entry().trim().is_empty() {
            return Err(ManifestError::MissingEntry {
                id: self.id.clone(),
            });
        }

        let (min, max) = self.config.bet_limits();
        if min > max {
            return Err(ManifestError::BetOutOfRange {
                id: self.id.clone(),
                field: "minBet",
                value: min,
                min: 0.0,
                max,
            });
        }
        if let Some(default_bet) = self.config.default_bet
            && !(min..=max).contains(&default_bet)
        {
            return Err(ManifestError::BetOutOfRange {
                id: self.id.clone(),
                field: "defaultBet",
                value: default_bet,
                min,
                max,
            });
        }
        Ok(())
    }
}

fn display_name(id: &str) -> String {
    id.split(['-', '_', ' '])
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// Filters for listing registered games. All set filters must match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestQuery {
    pub category: Option<String>,
    pub tag: Option<String>,
    /// Case-insensitive substring of the name or description.
    pub text: Option<String>,
}

impl ManifestQuery {
    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn matches(&self, manifest: &GameManifest) -> bool {
        if let Some(category) = &self.category
            && manifest.category.as_deref() != Some(category.as_str())
        {
            return false;
        }

        if let Some(tag) = &self.tag
            && !manifest.tags.iter().any(|t| t == tag)
        {
            return false;
        }

        if let Some(text) = &self.text {
            let needle = text.to_lowercase();
            let in_name = manifest.name.to_lowercase().contains(&needle);
            let in_description = manifest
                .description
                .as_deref()
                .is_some_and(|d| d.to_lowercase().contains(&needle));
            if !in_name && !in_description {
                return false;
            }
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DICE_JSON: &str = r#"{
        "id": "dice",
        "version": "1.1.0",
        "name": "Dice",
        "description": "Roll over or under",
        "category": "classic",
        "tags": ["quick", "solo"],
        "main": "dice",
        "assets": [{ "path": "dice.png", "type": "image" }, { "path": "roll.ogg" }],
        "config": { "minBet": 1, "maxBet": 100, "defaultBet": 10, "sides": 6 },
        "author": "house"
    }"#;

    #[test]
    fn test_parse_full_manifest() {
        let manifest: GameManifest = serde_json::from_str(DICE_JSON).unwrap();
        assert_eq!(manifest.id, "dice");
        assert_eq!(manifest.version, Version::new(1, 1, 0));
        assert_eq!(manifest.assets.len(), 2);
        assert_eq!(manifest.assets[0].kind.as_deref(), Some("image"));
        assert_eq!(manifest.assets[1].kind, None);
        assert_eq!(manifest.config.default_bet, Some(10.0));
        assert_eq!(manifest.config.extra.get("sides"), Some(&Value::from(6)));
        assert_eq!(manifest.extra.get("author"), Some(&Value::from("house")));
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_missing_id_fails_validation() {
        let manifest: GameManifest = serde_json::from_str(r#"{"name": "Nameless"}"#).unwrap();
        assert_eq!(manifest.validate(), Err(ManifestError::MissingId));
    }

    #[test]
    fn test_default_bet_outside_range_fails_validation() {
        let mut manifest = GameManifest::new("dice", Version::new(1, 0, 0), "Dice");
        manifest.config.min_bet = Some(5.0);
        manifest.config.max_bet = Some(50.0);
        manifest.config.default_bet = Some(100.0);
        assert!(matches!(
            manifest.validate(),
            Err(ManifestError::BetOutOfRange { field: "defaultBet", .. })
        ));
    }

    #[test]
    fn test_entry_defaults_to_id() {
        let mut manifest = GameManifest::new("card", Version::new(1, 0, 0), "Card");
        manifest.main.clear();
        assert_eq!(manifest.entry(), "card");
    }

    #[test]
    fn test_fallback_manifest() {
        let manifest = GameManifest::fallback("lucky-wheel_classic");
        assert_eq!(manifest.id, "lucky-wheel_classic");
        assert_eq!(manifest.name, "Lucky Wheel Classic");
        assert_eq!(manifest.entry(), "lucky-wheel_classic");
        assert!(manifest.is_synthesized());
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_query_filters_and_together() {
        let manifest: GameManifest = serde_json::from_str(DICE_JSON).unwrap();

        assert!(ManifestQuery::default().matches(&manifest));
        assert!(ManifestQuery::default().category("classic").matches(&manifest));
        assert!(ManifestQuery::default().tag("solo").matches(&manifest));
        assert!(ManifestQuery::default().text("UNDER").matches(&manifest));
        assert!(
            ManifestQuery::default()
                .category("classic")
                .tag("quick")
                .text("dic")
                .matches(&manifest)
        );
        assert!(
            !ManifestQuery::default()
                .category("classic")
                .tag("multiplayer")
                .matches(&manifest)
        );
        assert!(!ManifestQuery::default().text("poker").matches(&manifest));
    }
}
