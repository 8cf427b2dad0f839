use std::sync::Arc;

use tracing::{debug, info, warn};

use learnpath_core::aggregate::{CompletionStats, completion_stats};
use learnpath_core::model::{LearningPath, ProgressBackup, ProgressExport, ProgressKey, ProgressMap};
use storage::repository::{KeyValueStore, StorageTier};

use crate::Clock;
use crate::error::ProgressError;

/// Storage key of the live progress map.
pub const PROGRESS_STORAGE_KEY: &str = "fullstack-learning-progress";
/// Storage key of the snapshot taken before destructive operations.
pub const BACKUP_STORAGE_KEY: &str = "fullstack-learning-progress-backup";

/// Keys the store reads and writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressSettings {
    pub progress_key: String,
    pub backup_key: String,
}

impl Default for ProgressSettings {
    fn default() -> Self {
        Self {
            progress_key: PROGRESS_STORAGE_KEY.to_owned(),
            backup_key: BACKUP_STORAGE_KEY.to_owned(),
        }
    }
}

/// Snapshot of where and what the store currently holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageReport {
    pub active_tier: StorageTier,
    pub progress_key: String,
    pub backup_key: String,
    pub entries: usize,
    pub completed: usize,
    pub has_backup: bool,
    /// Saved progress was read without errors at startup.
    pub loaded: bool,
}

/// Completion flags plus their persistence.
///
/// Every mutation writes the whole map back under the progress key. A
/// failed write is logged and the in-memory state is kept, so the session
/// carries on even when every durable tier is gone.
pub struct ProgressStore {
    clock: Clock,
    backend: Arc<dyn KeyValueStore>,
    settings: ProgressSettings,
    progress: ProgressMap,
    loaded: bool,
}

impl ProgressStore {
    /// Read persisted progress from `backend`.
    ///
    /// Missing data starts an empty map. Unreadable or malformed data also
    /// starts empty and is left in place untouched until the next write;
    /// [`is_loaded`](Self::is_loaded) then reports `false`.
    pub async fn load(
        clock: Clock,
        backend: Arc<dyn KeyValueStore>,
        settings: ProgressSettings,
    ) -> Self {
        let (progress, loaded) = match backend.get(&settings.progress_key).await {
            Ok(Some(raw)) => match ProgressMap::from_json_str(&raw) {
                Ok(map) => (map, true),
                Err(err) => {
                    warn!(key = %settings.progress_key, error = %err, "ignoring malformed saved progress");
                    (ProgressMap::new(), false)
                }
            },
            Ok(None) => (ProgressMap::new(), true),
            Err(err) => {
                warn!(key = %settings.progress_key, error = %err, "could not read saved progress");
                (ProgressMap::new(), false)
            }
        };
        debug!(entries = progress.len(), tier = %backend.tier(), "progress loaded");

        Self {
            clock,
            backend,
            settings,
            progress,
            loaded,
        }
    }

    /// Whether saved progress was read cleanly at load time, either found
    /// and valid or not saved yet.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    #[must_use]
    pub fn progress(&self) -> &ProgressMap {
        &self.progress
    }

    #[must_use]
    pub fn is_completed(&self, key: &str) -> bool {
        self.progress.is_completed(key)
    }

    /// Flip a flag (absent counts as not completed) and persist.
    ///
    /// Returns the new value.
    pub async fn toggle(&mut self, key: ProgressKey) -> bool {
        let completed = self.progress.toggle(key.clone());
        debug!(%key, completed, "toggled");
        self.persist().await;
        completed
    }

    /// Write an explicit value and persist.
    pub async fn set(&mut self, key: ProgressKey, completed: bool) {
        self.progress.set(key, completed);
        self.persist().await;
    }

    /// Pretty-printed export snapshot stamped with the current time.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Encode` if serialization fails.
    pub fn export(&self) -> Result<String, ProgressError> {
        let snapshot = ProgressExport::new(self.progress.clone(), self.clock.now());
        Ok(serde_json::to_string_pretty(&snapshot)?)
    }

    /// Suggested file name for an export taken today.
    #[must_use]
    pub fn export_file_name(&self) -> String {
        format!("{}-{}.json", PROGRESS_STORAGE_KEY, self.clock.date_stamp())
    }

    /// Replace all progress with the contents of an export.
    ///
    /// The current state is backed up before anything changes. Returns the
    /// number of imported entries.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Snapshot` if `raw` is not a valid export; no
    /// backup is taken and nothing changes. Returns `ProgressError::Storage`
    /// if the backup cannot be written.
    pub async fn import(&mut self, raw: &str) -> Result<usize, ProgressError> {
        let incoming = ProgressExport::parse_progress(raw)?;
        self.create_backup().await?;

        let count = incoming.len();
        self.progress = incoming;
        self.persist().await;
        info!(entries = count, "progress imported");
        Ok(count)
    }

    /// Back up, then clear everything.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError` if the backup cannot be written; progress is
    /// left as it was.
    pub async fn reset(&mut self) -> Result<(), ProgressError> {
        self.create_backup().await?;
        self.progress.clear();
        self.persist().await;
        info!("progress reset");
        Ok(())
    }

    /// Save the current map under the backup key.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError` if encoding fails or no tier accepts the write.
    pub async fn create_backup(&self) -> Result<(), ProgressError> {
        let snapshot = ProgressBackup::new(self.progress.clone(), self.clock.now());
        let raw = serde_json::to_string(&snapshot)?;
        self.backend.set(&self.settings.backup_key, &raw).await?;
        debug!(entries = self.progress.len(), "backup written");
        Ok(())
    }

    /// Replace progress with the last backup.
    ///
    /// Returns the number of restored entries.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::NoBackup` when no backup exists,
    /// `ProgressError::Snapshot` when it is malformed, or
    /// `ProgressError::Storage` when it cannot be read. Progress is left
    /// unchanged in every error case.
    pub async fn restore_from_backup(&mut self) -> Result<usize, ProgressError> {
        let raw = self
            .backend
            .get(&self.settings.backup_key)
            .await?
            .ok_or(ProgressError::NoBackup)?;
        let restored = ProgressBackup::parse_progress(&raw)?;

        let count = restored.len();
        self.progress = restored;
        self.persist().await;
        info!(entries = count, "progress restored from backup");
        Ok(count)
    }

    /// Whether a backup is currently stored. Read failures count as "no".
    pub async fn has_backup(&self) -> bool {
        matches!(self.backend.get(&self.settings.backup_key).await, Ok(Some(_)))
    }

    /// Completion counts against `path`.
    #[must_use]
    pub fn stats(&self, path: &LearningPath) -> CompletionStats {
        completion_stats(path, &self.progress)
    }

    pub async fn diagnostics(&self) -> StorageReport {
        StorageReport {
            active_tier: self.backend.tier(),
            progress_key: self.settings.progress_key.clone(),
            backup_key: self.settings.backup_key.clone(),
            entries: self.progress.len(),
            completed: self.progress.completed_count(),
            has_backup: self.has_backup().await,
            loaded: self.loaded,
        }
    }

    async fn persist(&self) {
        let raw = match self.progress.to_json_string() {
            Ok(raw) => raw,
            Err(err) => {
                warn!(error = %err, "could not encode progress");
                return;
            }
        };
        if let Err(err) = self.backend.set(&self.settings.progress_key, &raw).await {
            warn!(key = %self.settings.progress_key, error = %err, "progress not saved");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use learnpath_core::model::{ChapterId, ModuleId};
    use learnpath_core::time::fixed_clock;
    use storage::repository::{InMemoryStore, StorageError};

    async fn fresh() -> (ProgressStore, InMemoryStore) {
        let backend = InMemoryStore::new();
        let store = ProgressStore::load(
            fixed_clock(),
            Arc::new(backend.clone()),
            ProgressSettings::default(),
        )
        .await;
        (store, backend)
    }

    fn key(raw: &str) -> ProgressKey {
        raw.parse().unwrap()
    }

    #[tokio::test]
    async fn toggle_twice_restores_and_persists() {
        let (mut store, backend) = fresh().await;
        assert!(store.is_loaded());
        assert!(!store.is_completed("m-a"));

        assert!(store.toggle(key("m-a")).await);
        assert!(store.is_completed("m-a"));
        assert_eq!(
            backend.get(PROGRESS_STORAGE_KEY).await.unwrap().as_deref(),
            Some(r#"{"m-a":true}"#)
        );

        assert!(!store.toggle(key("m-a")).await);
        assert!(!store.is_completed("m-a"));
    }

    #[tokio::test]
    async fn load_reads_persisted_map() {
        let backend = InMemoryStore::new();
        backend
            .set(PROGRESS_STORAGE_KEY, r#"{"m-a":true,"m-b":false}"#)
            .await
            .unwrap();
        let store =
            ProgressStore::load(fixed_clock(), Arc::new(backend), ProgressSettings::default())
                .await;
        assert!(store.is_completed("m-a"));
        assert!(!store.is_completed("m-b"));
        assert_eq!(store.progress().len(), 2);
    }

    #[tokio::test]
    async fn malformed_saved_progress_loads_empty() {
        for raw in ["not json", "[true]", r#"{"m-a":"yes"}"#] {
            let backend = InMemoryStore::new();
            backend.set(PROGRESS_STORAGE_KEY, raw).await.unwrap();
            let store = ProgressStore::load(
                fixed_clock(),
                Arc::new(backend.clone()),
                ProgressSettings::default(),
            )
            .await;
            assert!(store.progress().is_empty(), "{raw}");
            assert!(!store.is_loaded(), "{raw}");
            // left in place until the next write
            assert_eq!(backend.get(PROGRESS_STORAGE_KEY).await.unwrap().as_deref(), Some(raw));
        }
    }

    #[tokio::test]
    async fn unreadable_backend_is_not_reported_as_loaded() {
        struct Unreachable;

        #[async_trait::async_trait]
        impl KeyValueStore for Unreachable {
            fn tier(&self) -> StorageTier {
                StorageTier::Durable
            }

            async fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
                Err(StorageError::Connection("database is locked".into()))
            }

            async fn set(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
                Err(StorageError::Connection("database is locked".into()))
            }

            async fn remove(&self, _key: &str) -> Result<(), StorageError> {
                Err(StorageError::Connection("database is locked".into()))
            }
        }

        let store =
            ProgressStore::load(fixed_clock(), Arc::new(Unreachable), ProgressSettings::default())
                .await;
        assert!(!store.is_loaded());
        assert!(store.progress().is_empty());
        assert!(!store.diagnostics().await.loaded);
    }

    #[tokio::test]
    async fn padded_chapter_key_survives_reload() {
        let (mut store, backend) = fresh().await;
        let key = ProgressKey::chapter(&ModuleId::new("part0"), &ChapterId::new("intro "));
        assert!(store.toggle(key.clone()).await);

        let reloaded =
            ProgressStore::load(fixed_clock(), Arc::new(backend), ProgressSettings::default())
                .await;
        assert!(reloaded.is_loaded());
        assert!(reloaded.is_completed(key.as_str()));

        let (mut target, _) = fresh().await;
        target.import(&reloaded.export().unwrap()).await.unwrap();
        assert_eq!(target.progress(), reloaded.progress());
    }

    #[tokio::test]
    async fn export_shape_and_file_name() {
        let (mut store, _) = fresh().await;
        store.toggle(key("m-a")).await;

        let value: serde_json::Value = serde_json::from_str(&store.export().unwrap()).unwrap();
        assert_eq!(value["progress"]["m-a"], serde_json::Value::Bool(true));
        assert_eq!(value["version"], "1.0");
        assert_eq!(value["exportDate"], "2023-11-14T22:13:20.000Z");
        assert_eq!(
            store.export_file_name(),
            "fullstack-learning-progress-2023-11-14.json"
        );
    }

    #[tokio::test]
    async fn import_round_trips_export_and_backs_up_first() {
        let (mut source, _) = fresh().await;
        source.toggle(key("m-a")).await;
        source.toggle(key("m-a-exercise-0")).await;
        let exported = source.export().unwrap();

        let (mut target, backend) = fresh().await;
        target.toggle(key("other")).await;

        assert_eq!(target.import(&exported).await.unwrap(), 2);
        assert_eq!(target.progress(), source.progress());

        let backup = backend.get(BACKUP_STORAGE_KEY).await.unwrap().unwrap();
        let backed_up = ProgressBackup::parse_progress(&backup).unwrap();
        assert!(backed_up.is_completed("other"));
    }

    #[tokio::test]
    async fn rejected_import_changes_nothing() {
        let (mut store, backend) = fresh().await;
        store.toggle(key("m-a")).await;

        for raw in [
            "garbage",
            r#"{"exportDate":"2024-01-01T00:00:00.000Z","version":"1.0"}"#,
            r#"{"progress":{"m-a":"yes"},"version":"1.0"}"#,
            r#"{"progress":{"m-a":false},"version":"2.0"}"#,
        ] {
            assert!(matches!(
                store.import(raw).await,
                Err(ProgressError::Snapshot(_))
            ));
        }
        assert!(store.is_completed("m-a"));
        assert_eq!(backend.get(BACKUP_STORAGE_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn reset_then_restore_brings_progress_back() {
        let (mut store, _) = fresh().await;
        store.toggle(key("m-a")).await;
        store.toggle(key("m-b")).await;

        store.reset().await.unwrap();
        assert!(store.progress().is_empty());
        assert!(store.has_backup().await);

        assert_eq!(store.restore_from_backup().await.unwrap(), 2);
        assert!(store.is_completed("m-a"));
        assert!(store.is_completed("m-b"));
    }

    #[tokio::test]
    async fn restore_without_backup_fails_cleanly() {
        let (mut store, _) = fresh().await;
        store.toggle(key("m-a")).await;
        assert!(matches!(
            store.restore_from_backup().await,
            Err(ProgressError::NoBackup)
        ));
        assert!(store.is_completed("m-a"));
    }

    #[tokio::test]
    async fn malformed_backup_is_rejected() {
        let (mut store, backend) = fresh().await;
        store.toggle(key("m-a")).await;
        backend.set(BACKUP_STORAGE_KEY, r#"{"backupDate":"x"}"#).await.unwrap();

        assert!(matches!(
            store.restore_from_backup().await,
            Err(ProgressError::Snapshot(_))
        ));
        assert!(store.is_completed("m-a"));
    }

    #[tokio::test]
    async fn diagnostics_report_counts() {
        let (mut store, _) = fresh().await;
        store.toggle(key("m-a")).await;
        store.toggle(key("m-b")).await;
        store.toggle(key("m-b")).await;

        let report = store.diagnostics().await;
        assert_eq!(report.active_tier, StorageTier::Memory);
        assert_eq!(report.entries, 2);
        assert_eq!(report.completed, 1);
        assert!(!report.has_backup);
        assert!(report.loaded);
        assert_eq!(report.progress_key, PROGRESS_STORAGE_KEY);
    }
}
