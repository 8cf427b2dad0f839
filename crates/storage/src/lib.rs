#![forbid(unsafe_code)]

pub mod repository;
pub mod session;
pub mod sqlite;
pub mod tiered;

pub use repository::{InMemoryStore, KeyValueStore, StorageError, StorageTier};
pub use session::SessionFileStore;
pub use sqlite::{SqliteInitError, SqliteStore};
pub use tiered::{StorageOptions, TieredStore};
