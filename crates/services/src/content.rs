use std::fs;
use std::path::Path;

use tracing::{info, warn};

use learnpath_core::model::LearningPath;

use crate::error::ContentLoadError;

/// Read, parse and validate the curriculum document at `path`.
///
/// Progress keys shared by several nodes are logged as warnings; the path
/// still loads.
///
/// # Errors
///
/// Returns `ContentLoadError::Io` if the file cannot be read and
/// `ContentLoadError::Content` if it is not a valid learning path.
pub fn load_learning_path(path: impl AsRef<Path>) -> Result<LearningPath, ContentLoadError> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path).map_err(|source| ContentLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let learning_path =
        LearningPath::from_yaml_str(&raw).map_err(|source| ContentLoadError::Content {
            path: path.to_path_buf(),
            source,
        })?;

    for key in learning_path.duplicate_progress_keys() {
        warn!(%key, "progress key is shared by more than one item");
    }
    info!(
        path = %path.display(),
        phases = learning_path.phases.len(),
        items = learning_path.total_items(),
        "learning path loaded"
    );
    Ok(learning_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_a_valid_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("learning-path.yaml");
        fs::write(
            &file,
            "phases:\n  - id: p\n    name: P\n    modules:\n      - id: m\n        name: M\n        chapters:\n          - id: c\n            name: C\n            url: https://example.com/c\n",
        )
        .unwrap();

        let path = load_learning_path(&file).unwrap();
        assert_eq!(path.total_items(), 1);
        assert!(path.optional_modules.is_empty());
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_learning_path(dir.path().join("nope.yaml")).unwrap_err();
        assert!(matches!(err, ContentLoadError::Io { .. }));
        assert!(err.to_string().contains("nope.yaml"));
    }

    #[test]
    fn bad_shape_is_a_content_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("learning-path.yaml");
        fs::write(&file, "phases: 12").unwrap();
        assert!(matches!(
            load_learning_path(&file),
            Err(ContentLoadError::Content { .. })
        ));
    }

    #[test]
    fn bundled_demo_path_is_valid() {
        let file = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../demos/learning-path.yaml");
        let path = load_learning_path(file).unwrap();
        assert_eq!(path.phases.len(), 2);
        assert_eq!(path.total_items(), 12);
        assert!(path.duplicate_progress_keys().is_empty());
    }
}
