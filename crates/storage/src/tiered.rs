use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::repository::{InMemoryStore, KeyValueStore, StorageError, StorageTier};
use crate::session::SessionFileStore;
use crate::sqlite::SqliteStore;

/// Which tiers to try when opening a [`TieredStore`].
#[derive(Debug, Clone, Default)]
pub struct StorageOptions {
    /// `SQLite` URL for the durable tier; `None` skips it.
    pub db_url: Option<String>,
    /// Directory for the session file; `None` skips the session tier.
    pub session_dir: Option<PathBuf>,
}

impl StorageOptions {
    /// No durable or session tier; progress lives only in memory.
    #[must_use]
    pub fn memory_only() -> Self {
        Self::default()
    }
}

/// What the chain writes into each tier: the caller's value tagged with a
/// per-key revision. `value: None` marks a delete that some tier refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct Revisioned {
    rev: u64,
    value: Option<String>,
}

impl Revisioned {
    /// Values written by something other than the chain count as revision 0.
    fn decode(raw: String) -> Self {
        match serde_json::from_str(&raw) {
            Ok(stored) => stored,
            Err(_) => Self {
                rev: 0,
                value: Some(raw),
            },
        }
    }

    fn encode(&self) -> Result<String, StorageError> {
        serde_json::to_string(self).map_err(|e| StorageError::Serialization(e.to_string()))
    }
}

/// Fallback chain over storage tiers, tried in priority order.
///
/// Writes land on the first tier that accepts them, tagged with a revision
/// one past the newest copy any tier holds, and then try to clear the key
/// elsewhere. Reads consult every readable tier and return the highest
/// revision, so a tier that refused the write or the clear cannot shadow
/// newer data, even after a restart. Ties go to the higher-priority tier.
/// The chain always ends with an in-memory tier, which cannot fail.
pub struct TieredStore {
    tiers: Vec<Arc<dyn KeyValueStore>>,
    active: Mutex<StorageTier>,
}

impl TieredStore {
    /// Build a chain from explicit tiers. A memory tier is appended unless
    /// one is already present.
    #[must_use]
    pub fn new(mut tiers: Vec<Arc<dyn KeyValueStore>>) -> Self {
        if !tiers.iter().any(|t| t.tier() == StorageTier::Memory) {
            tiers.push(Arc::new(InMemoryStore::new()));
        }
        let first = tiers.first().map_or(StorageTier::Memory, |t| t.tier());
        Self {
            tiers,
            active: Mutex::new(first),
        }
    }

    #[must_use]
    pub fn memory_only() -> Self {
        Self::new(Vec::new())
    }

    /// Open every configured tier. A durable tier that cannot be opened is
    /// skipped with a warning instead of failing startup.
    pub async fn open(options: &StorageOptions) -> Self {
        let mut tiers: Vec<Arc<dyn KeyValueStore>> = Vec::new();

        if let Some(url) = options.db_url.as_deref() {
            match SqliteStore::open(url).await {
                Ok(store) => tiers.push(Arc::new(store)),
                Err(err) => warn!(db_url = url, error = %err, "durable storage unavailable"),
            }
        }
        if let Some(dir) = options.session_dir.as_ref() {
            tiers.push(Arc::new(SessionFileStore::in_dir(dir)));
        }

        let store = Self::new(tiers);
        debug!(tiers = ?store.tiers(), "storage chain ready");
        store
    }

    /// Tiers in the order they are tried.
    #[must_use]
    pub fn tiers(&self) -> Vec<StorageTier> {
        self.tiers.iter().map(|t| t.tier()).collect()
    }

    /// Tier that served the most recent successful read or write.
    #[must_use]
    pub fn active_tier(&self) -> StorageTier {
        self.active
            .lock()
            .map_or(StorageTier::Memory, |guard| *guard)
    }

    fn mark_active(&self, tier: StorageTier) {
        if let Ok(mut guard) = self.active.lock() {
            *guard = tier;
        }
    }

    /// Newest copy of `key` across readable tiers, with the index of the
    /// tier holding it. Fails only when no tier could be read.
    async fn newest(&self, key: &str) -> Result<Option<(usize, Revisioned)>, StorageError> {
        let mut newest: Option<(usize, Revisioned)> = None;
        let mut last_err = None;
        let mut any_readable = false;

        for (i, store) in self.tiers.iter().enumerate() {
            match store.get(key).await {
                Ok(Some(raw)) => {
                    any_readable = true;
                    let found = Revisioned::decode(raw);
                    if newest.as_ref().is_none_or(|(_, best)| found.rev > best.rev) {
                        newest = Some((i, found));
                    }
                }
                Ok(None) => any_readable = true,
                Err(err) => {
                    warn!(tier = %store.tier(), key, error = %err, "read failed, trying next tier");
                    last_err = Some(err);
                }
            }
        }

        match last_err {
            Some(err) if !any_readable => Err(err),
            _ => Ok(newest),
        }
    }

    async fn next_revision(&self, key: &str) -> u64 {
        match self.newest(key).await {
            Ok(Some((_, stored))) => stored.rev + 1,
            _ => 1,
        }
    }

    /// Write to the first tier that accepts `raw`; returns its index.
    async fn write_first(&self, key: &str, raw: &str) -> Result<usize, StorageError> {
        let mut last_err = None;

        for (i, store) in self.tiers.iter().enumerate() {
            match store.set(key, raw).await {
                Ok(()) => {
                    self.mark_active(store.tier());
                    return Ok(i);
                }
                Err(err) => {
                    warn!(tier = %store.tier(), key, error = %err, "write failed, falling back");
                    last_err = Some(err);
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| StorageError::Unavailable("no storage tiers configured".into())))
    }

    async fn clear_others(&self, key: &str, keep: usize) {
        for (i, store) in self.tiers.iter().enumerate() {
            if i == keep {
                continue;
            }
            if let Err(err) = store.remove(key).await {
                warn!(tier = %store.tier(), key, error = %err, "older copy left in place");
            }
        }
    }
}

#[async_trait]
impl KeyValueStore for TieredStore {
    fn tier(&self) -> StorageTier {
        self.active_tier()
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let Some((i, stored)) = self.newest(key).await? else {
            return Ok(None);
        };
        self.mark_active(self.tiers[i].tier());
        Ok(stored.value)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let raw = Revisioned {
            rev: self.next_revision(key).await,
            value: Some(value.to_owned()),
        }
        .encode()?;
        let written = self.write_first(key, &raw).await?;
        self.clear_others(key, written).await;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        let rev = self.next_revision(key).await;
        let mut last_err = None;
        let mut removed_somewhere = false;

        for store in &self.tiers {
            match store.remove(key).await {
                Ok(()) => removed_somewhere = true,
                Err(err) => {
                    warn!(tier = %store.tier(), key, error = %err, "delete failed");
                    last_err = Some(err);
                }
            }
        }

        let Some(err) = last_err else {
            return Ok(());
        };
        // A tier kept its copy; a newer tombstone hides it from reads.
        let tombstone = Revisioned { rev, value: None }.encode()?;
        match self.write_first(key, &tombstone).await {
            Ok(_) => Ok(()),
            Err(_) if removed_somewhere => Ok(()),
            Err(_) => Err(err),
        }
    }
}
