use std::path::PathBuf;
use std::sync::Arc;

use storage::repository::{KeyValueStore, StorageTier};
use storage::tiered::{StorageOptions, TieredStore};

use crate::Clock;
use crate::checklist::ChecklistService;
use crate::content::load_learning_path;
use crate::error::AppServicesError;
use crate::progress_store::{ProgressSettings, ProgressStore, StorageReport};

/// Everything needed to assemble [`AppServices`].
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub content_path: PathBuf,
    pub storage: StorageOptions,
    pub progress: ProgressSettings,
    pub auto_complete_chapters: bool,
}

/// Storage report plus the tier chain that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostics {
    pub tiers: Vec<StorageTier>,
    pub report: StorageReport,
}

/// Loads the curriculum, opens storage and wires the checklist.
pub struct AppServices {
    storage: Arc<TieredStore>,
    checklist: ChecklistService,
}

impl AppServices {
    /// Build services from `config`.
    ///
    /// The curriculum is read first so a bad content file fails before any
    /// storage is opened. Storage itself never fails: unavailable tiers are
    /// skipped down to the in-memory one.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError::Content` if the curriculum cannot be loaded.
    pub async fn open(config: &AppConfig, clock: Clock) -> Result<Self, AppServicesError> {
        let path = Arc::new(load_learning_path(&config.content_path)?);

        let storage = Arc::new(TieredStore::open(&config.storage).await);
        let backend: Arc<dyn KeyValueStore> = storage.clone();
        let store = ProgressStore::load(clock, backend, config.progress.clone()).await;

        Ok(Self {
            storage,
            checklist: ChecklistService::new(path, store, config.auto_complete_chapters),
        })
    }

    #[must_use]
    pub fn checklist(&self) -> &ChecklistService {
        &self.checklist
    }

    pub fn checklist_mut(&mut self) -> &mut ChecklistService {
        &mut self.checklist
    }

    pub async fn diagnostics(&self) -> Diagnostics {
        Diagnostics {
            tiers: self.storage.tiers(),
            report: self.checklist.store().diagnostics().await,
        }
    }
}
