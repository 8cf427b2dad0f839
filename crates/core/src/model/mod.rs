mod curriculum;
mod ids;
mod progress;
mod snapshot;

pub use curriculum::{
    Additional, Chapter, ContentError, LearningPath, Module, OptionalModule, Phase,
};
pub use ids::{ChapterId, ModuleId, ParseIdError, PhaseId, ProgressKey};
pub use progress::ProgressMap;
pub use snapshot::{ProgressBackup, ProgressExport, SNAPSHOT_VERSION, SnapshotError};
