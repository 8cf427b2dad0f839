#![forbid(unsafe_code)]

pub mod app_services;
pub mod checklist;
pub mod content;
pub mod error;
pub mod progress_store;

pub use learnpath_core::Clock;

pub use app_services::{AppConfig, AppServices, Diagnostics};
pub use checklist::{
    ChapterNode, ChecklistService, ExerciseNode, ModuleNode, Outline, PhaseNode, ToggleOutcome,
};
pub use content::load_learning_path;
pub use error::{AppServicesError, ChecklistError, ContentLoadError, ProgressError};
pub use progress_store::{
    BACKUP_STORAGE_KEY, PROGRESS_STORAGE_KEY, ProgressSettings, ProgressStore, StorageReport,
};
