//! Semantic versions for game manifests.
//!
//! Only the numeric `major.minor.patch` triple takes part in ordering.
//! Pre-release and build suffixes are kept for display but ignored when
//! comparing, so `1.2.0-beta` and `1.2.0` are considered equal.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Error returned when a version string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VersionError {
    #[error("empty version string")]
    Empty,
    #[error("invalid version component '{component}' in '{input}'")]
    InvalidComponent { input: String, component: String },
    #[error("too many version components in '{0}'")]
    TooManyComponents(String),
}

/// A `major.minor.patch` version.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    /// Pre-release or build suffix, without the separator.
    pub suffix: Option<String>,
}

impl Version {
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            suffix: None,
        }
    }

    /// Parse a version string.
    ///
    /// Accepts an optional leading `v`, and missing minor/patch components
    /// default to zero (`"2"` is `2.0.0`).
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        let trimmed = input.trim();
        let trimmed = trimmed
            .strip_prefix('v')
            .or_else(|| trimmed.strip_prefix('V'))
            .unwrap_or(trimmed);
        if trimmed.is_empty() {
            return Err(VersionError::Empty);
        }

        let (core, suffix) = match trimmed.find(['-', '+']) {
            Some(idx) => (&trimmed[..idx], Some(trimmed[idx + 1..].to_string())),
            None => (trimmed, None),
        };

        let mut parts = [0u64; 3];
        let mut count = 0;
        for component in core.split('.') {
            if count == parts.len() {
                return Err(VersionError::TooManyComponents(input.to_string()));
            }
            parts[count] = component
                .parse()
                .map_err(|_| VersionError::InvalidComponent {
                    input: input.to_string(),
                    component: component.to_string(),
                })?;
            count += 1;
        }

        Ok(Self {
            major: parts[0],
            minor: parts[1],
            patch: parts[2],
            suffix: suffix.filter(|s| !s.is_empty()),
        })
    }

    fn triple(&self) -> (u64, u64, u64) {
        (self.major, self.minor, self.patch)
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.triple() == other.triple()
    }
}

impl Eq for Version {}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.triple().cmp(&other.triple())
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Version {
    type Error = VersionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Version> for String {
    fn from(value: Version) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(suffix) = &self.suffix {
            write!(f, "-{}", suffix)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_version() {
        let v = Version::parse("1.2.3").unwrap();
        assert_eq!((v.major, v.minor, v.patch), (1, 2, 3));
        assert!(v.suffix.is_none());
    }

    #[test]
    fn test_parse_short_and_prefixed() {
        assert_eq!(Version::parse("v2").unwrap(), Version::new(2, 0, 0));
        assert_eq!(Version::parse("1.4").unwrap(), Version::new(1, 4, 0));
    }

    #[test]
    fn test_parse_suffix_ignored_for_ordering() {
        let beta = Version::parse("1.2.0-beta.1").unwrap();
        assert_eq!(beta.suffix.as_deref(), Some("beta.1"));
        assert_eq!(beta, Version::new(1, 2, 0));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(Version::parse(""), Err(VersionError::Empty));
        assert!(matches!(
            Version::parse("1.x.0"),
            Err(VersionError::InvalidComponent { .. })
        ));
        assert!(matches!(
            Version::parse("1.2.3.4"),
            Err(VersionError::TooManyComponents(_))
        ));
    }

    #[test]
    fn test_ordering_is_numeric_per_component() {
        // String comparison would put "1.10.0" before "1.9.0"
        assert!(Version::parse("1.10.0").unwrap() > Version::parse("1.9.0").unwrap());
        assert!(Version::parse("2.0.0").unwrap() > Version::parse("1.99.99").unwrap());
        assert!(Version::parse("1.0.1").unwrap() > Version::parse("1.0.0").unwrap());
    }

    #[test]
    fn test_serde_as_string() {
        let v: Version = serde_json::from_str("\"3.1.4\"").unwrap();
        assert_eq!(v, Version::new(3, 1, 4));
        assert_eq!(serde_json::to_string(&v).unwrap(), "\"3.1.4\"");
        assert!(serde_json::from_str::<Version>("\"nope\"").is_err());
    }
}
