use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::warn;

use crate::repository::{KeyValueStore, StorageError, StorageTier};

/// File name used inside the session directory.
pub const SESSION_FILE_NAME: &str = "learnpath-session.json";

/// Session-scoped tier: one JSON object file in a scratch directory.
///
/// By default the directory is the OS temp dir, so entries live until the
/// system cleans it. Every write rewrites the whole file through a sibling
/// temp file and a rename.
#[derive(Debug, Clone)]
pub struct SessionFileStore {
    path: PathBuf,
}

impl SessionFileStore {
    /// Store backed by `dir/learnpath-session.json`.
    #[must_use]
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(SESSION_FILE_NAME),
        }
    }

    /// Store in the OS temp directory.
    #[must_use]
    pub fn in_temp_dir() -> Self {
        Self::in_dir(std::env::temp_dir())
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<BTreeMap<String, String>, StorageError> {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(err) => return Err(err.into()),
        };
        if raw.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&raw).map_err(|e| StorageError::Serialization(e.to_string()))
    }

    async fn write_all(&self, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let raw = serde_json::to_string(entries)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, raw).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for SessionFileStore {
    fn tier(&self) -> StorageTier {
        StorageTier::Session
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.read_all().await?.remove(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        // Only an unparsable file is replaced; I/O errors leave it untouched.
        let mut entries = match self.read_all().await {
            Ok(entries) => entries,
            Err(StorageError::Serialization(err)) => {
                warn!(path = %self.path.display(), error = %err, "replacing corrupt session file");
                BTreeMap::new()
            }
            Err(err) => return Err(err),
        };
        entries.insert(key.to_owned(), value.to_owned());
        self.write_all(&entries).await
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.read_all().await?;
        if entries.remove(key).is_some() {
            self.write_all(&entries).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionFileStore::in_dir(dir.path());
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn values_survive_a_new_handle() {
        let dir = tempfile::tempdir().unwrap();
        SessionFileStore::in_dir(dir.path())
            .set("k", r#"{"a":true}"#)
            .await
            .unwrap();

        let reopened = SessionFileStore::in_dir(dir.path());
        assert_eq!(
            reopened.get("k").await.unwrap().as_deref(),
            Some(r#"{"a":true}"#)
        );
    }

    #[tokio::test]
    async fn corrupt_file_fails_reads_but_not_writes() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionFileStore::in_dir(dir.path());
        std::fs::write(store.path(), "{{{").unwrap();

        assert!(matches!(
            store.get("k").await,
            Err(StorageError::Serialization(_))
        ));
        store.set("k", "v").await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn unreadable_file_fails_writes_without_replacing_it() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionFileStore::in_dir(dir.path());
        // a directory in place of the file makes every read an I/O error
        std::fs::create_dir(store.path()).unwrap();
        std::fs::write(store.path().join("backup"), "keep").unwrap();

        assert!(matches!(store.set("k", "v").await, Err(StorageError::Io(_))));
        assert!(store.path().is_dir());
        assert_eq!(
            std::fs::read_to_string(store.path().join("backup")).unwrap(),
            "keep"
        );
    }

    #[tokio::test]
    async fn remove_keeps_other_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionFileStore::in_dir(dir.path());
        store.set("a", "1").await.unwrap();
        store.set("b", "2").await.unwrap();
        store.remove("a").await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), None);
        assert_eq!(store.get("b").await.unwrap().as_deref(), Some("2"));
    }
}
