use thiserror::Error;

use crate::model::{ContentError, SnapshotError};

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Content(#[from] ContentError),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LearningPath, ProgressExport};

    #[test]
    fn wraps_domain_errors_transparently() {
        let content = LearningPath::from_yaml_str("phases: nope").unwrap_err();
        let message = content.to_string();
        assert_eq!(Error::from(content).to_string(), message);

        let err: Error = ProgressExport::parse_progress("[]").unwrap_err().into();
        assert!(matches!(err, Error::Snapshot(SnapshotError::NotAnObject)));
    }
}
