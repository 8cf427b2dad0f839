//! Shared error types for the services crate.

use std::path::PathBuf;

use thiserror::Error;

use learnpath_core::model::{ChapterId, ContentError, ModuleId, PhaseId, SnapshotError};
use storage::repository::StorageError;

/// Errors emitted by `ProgressStore`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProgressError {
    #[error("no backup found")]
    NoBackup,
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("failed to encode progress: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Errors emitted while reading the curriculum file.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ContentLoadError {
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{}: {source}", path.display())]
    Content {
        path: PathBuf,
        #[source]
        source: ContentError,
    },
}

/// Errors emitted by `ChecklistService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ChecklistError {
    #[error("unknown phase `{0}`")]
    UnknownPhase(PhaseId),
    #[error("unknown module `{0}`")]
    UnknownModule(ModuleId),
    #[error("module `{module}` has no chapter `{chapter}`")]
    UnknownChapter { module: ModuleId, chapter: ChapterId },
    #[error("chapter `{module}-{chapter}` has no exercise #{index}")]
    UnknownExercise {
        module: ModuleId,
        chapter: ChapterId,
        index: usize,
    },
    #[error(transparent)]
    Progress(#[from] ProgressError),
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Content(#[from] ContentLoadError),
}
