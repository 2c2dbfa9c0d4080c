//! Durable snapshot storage
//!
//! One JSON file per game id under the saves directory. Writes go to a
//! sibling `.tmp` file first and are renamed into place, so a crash never
//! leaves a half-written save behind.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

use super::StateSnapshot;
use crate::error::{HostError, HostResult};

pub struct SaveStore {
    dir: PathBuf,
}

impl SaveStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File a game's snapshot is stored in.
    pub fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(id)))
    }

    pub async fn write(&self, id: &str, snapshot: &StateSnapshot) -> HostResult<()> {
        let path = self.path_for(id);
        let bytes = serde_json::to_vec_pretty(snapshot)
            .map_err(|e| HostError::Storage(format!("encode {}: {}", id, e)))?;

        write_atomic(&path, &bytes)
            .await
            .map_err(|e| HostError::Storage(format!("write {}: {}", path.display(), e)))?;
        tracing::debug!("Saved {} to {}", id, path.display());
        Ok(())
    }

    /// Read a stored snapshot. A missing file is `Ok(None)`.
    pub async fn read(&self, id: &str) -> HostResult<Option<StateSnapshot>> {
        let path = self.path_for(id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(HostError::Storage(format!(
                    "read {}: {}",
                    path.display(),
                    e
                )));
            }
        };

        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| HostError::Storage(format!("decode {}: {}", path.display(), e)))
    }

    /// Delete a stored snapshot. Returns true if one existed.
    pub async fn remove(&self, id: &str) -> HostResult<bool> {
        match tokio::fs::remove_file(self.path_for(id)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(HostError::Storage(e.to_string())),
        }
    }
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let Some(name) = path.file_name() else {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "save path has no file name",
        ));
    };
    let mut tmp_name = OsString::from(name);
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    {
        use tokio::io::AsyncWriteExt;
        let mut file = tokio::fs::File::create(&tmp_path).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
    }

    #[cfg(windows)]
    {
        // Windows rename fails if destination exists.
        if tokio::fs::try_exists(path).await? {
            tokio::fs::remove_file(path).await?;
        }
    }

    tokio::fs::rename(&tmp_path, path).await
}

/// Map an id onto a safe file stem.
fn file_stem(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_then_read() {
        let dir = TempDir::new().unwrap();
        let store = SaveStore::new(dir.path().join("saves"));
        let snapshot = StateSnapshot::new(json!({ "balance": 990, "bet": 10 }));

        store.write("dice", &snapshot).await.unwrap();
        assert!(store.path_for("dice").exists());
        assert!(!dir.path().join("saves/dice.json.tmp").exists());

        let read = store.read("dice").await.unwrap().unwrap();
        assert_eq!(read, snapshot);
    }

    #[tokio::test]
    async fn test_missing_is_none() {
        let dir = TempDir::new().unwrap();
        let store = SaveStore::new(dir.path());
        assert!(store.read("card").await.unwrap().is_none());
        assert!(!store.remove("card").await.unwrap());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_storage_error() {
        let dir = TempDir::new().unwrap();
        let store = SaveStore::new(dir.path());
        std::fs::write(store.path_for("dice"), b"not json").unwrap();
        assert!(matches!(
            store.read("dice").await,
            Err(HostError::Storage(_))
        ));
    }

    #[test]
    fn test_ids_are_sanitized() {
        let store = SaveStore::new("/saves");
        assert_eq!(
            store.path_for("../dice/v2"),
            PathBuf::from("/saves/___dice_v2.json")
        );
    }
}
