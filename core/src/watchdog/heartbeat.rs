//! Last-seen timestamp used to detect host restarts.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

/// Persists the last time the host was seen alive.
pub trait LastSeenStore: Send + Sync {
    fn last_seen(&self) -> Option<DateTime<Utc>>;
    fn touch(&self, at: DateTime<Utc>);
}

/// RFC 3339 timestamp in a small text file.
pub struct FileLastSeen {
    path: PathBuf,
}

impl FileLastSeen {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl LastSeenStore for FileLastSeen {
    fn last_seen(&self) -> Option<DateTime<Utc>> {
        let content = std::fs::read_to_string(&self.path).ok()?;
        DateTime::parse_from_rfc3339(content.trim())
            .ok()
            .map(|at| at.with_timezone(&Utc))
    }

    fn touch(&self, at: DateTime<Utc>) {
        if let Some(dir) = self.path.parent()
            && let Err(e) = std::fs::create_dir_all(dir)
        {
            tracing::debug!("Cannot create {}: {}", dir.display(), e);
            return;
        }
        if let Err(e) = std::fs::write(&self.path, at.to_rfc3339()) {
            tracing::debug!("Cannot write heartbeat {}: {}", self.path.display(), e);
        }
    }
}

/// Heartbeat kept in memory only.
#[derive(Default)]
pub struct MemoryLastSeen {
    at: Mutex<Option<DateTime<Utc>>>,
}

impl MemoryLastSeen {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seen_at(at: DateTime<Utc>) -> Self {
        Self {
            at: Mutex::new(Some(at)),
        }
    }
}

impl LastSeenStore for MemoryLastSeen {
    fn last_seen(&self) -> Option<DateTime<Utc>> {
        *self.at.lock()
    }

    fn touch(&self, at: DateTime<Utc>) {
        *self.at.lock() = Some(at);
    }
}
