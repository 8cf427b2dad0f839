use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::model::progress::ProgressMap;

/// Format tag written into every export and backup.
pub const SNAPSHOT_VERSION: &str = "1.0";

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SnapshotError {
    #[error("snapshot is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("snapshot must be a JSON object")]
    NotAnObject,

    #[error("snapshot has no `progress` field")]
    MissingProgress,

    #[error("`progress` must map keys to booleans")]
    ProgressNotAMap,

    #[error("progress entry `{key}` is not a boolean")]
    NonBooleanValue { key: String },

    #[error("progress entry has an empty key")]
    EmptyKey,

    #[error("unsupported snapshot version: {0}")]
    UnsupportedVersion(String),
}

/// Shape produced by `export` and accepted by `import`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressExport {
    pub progress: ProgressMap,
    #[serde(with = "iso_millis")]
    pub export_date: DateTime<Utc>,
    pub version: String,
}

impl ProgressExport {
    #[must_use]
    pub fn new(progress: ProgressMap, export_date: DateTime<Utc>) -> Self {
        Self {
            progress,
            export_date,
            version: SNAPSHOT_VERSION.to_owned(),
        }
    }

    /// Validate an incoming export and extract its map.
    ///
    /// Only `progress` is required. `version`, when given, must be
    /// [`SNAPSHOT_VERSION`]; `exportDate` is informational and not checked.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotError` describing the first shape violation.
    pub fn parse_progress(raw: &str) -> Result<ProgressMap, SnapshotError> {
        parse_payload(raw)
    }
}

/// Shape written under the backup key before destructive operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressBackup {
    pub progress: ProgressMap,
    #[serde(with = "iso_millis")]
    pub backup_date: DateTime<Utc>,
    pub version: String,
}

impl ProgressBackup {
    #[must_use]
    pub fn new(progress: ProgressMap, backup_date: DateTime<Utc>) -> Self {
        Self {
            progress,
            backup_date,
            version: SNAPSHOT_VERSION.to_owned(),
        }
    }

    /// Validate a stored backup and extract its map.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotError` if the backup is malformed.
    pub fn parse_progress(raw: &str) -> Result<ProgressMap, SnapshotError> {
        parse_payload(raw)
    }
}

fn parse_payload(raw: &str) -> Result<ProgressMap, SnapshotError> {
    let value: Value = serde_json::from_str(raw)?;
    let Value::Object(fields) = value else {
        return Err(SnapshotError::NotAnObject);
    };

    if let Some(version) = fields.get("version") {
        match version.as_str() {
            Some(SNAPSHOT_VERSION) => {}
            Some(other) => return Err(SnapshotError::UnsupportedVersion(other.to_owned())),
            None => return Err(SnapshotError::UnsupportedVersion(version.to_string())),
        }
    }

    let progress = fields.get("progress").ok_or(SnapshotError::MissingProgress)?;
    ProgressMap::from_json_value(progress)
}

/// RFC 3339 with millisecond precision and a `Z` suffix.
mod iso_millis {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(at: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&at.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|at| at.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    fn sample_map() -> ProgressMap {
        [
            ("part0-a".parse().unwrap(), true),
            ("part0-b-exercise-0".parse().unwrap(), false),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn export_uses_camel_case_and_millis() {
        let export = ProgressExport::new(sample_map(), fixed_now());
        let raw = serde_json::to_string(&export).unwrap();
        assert!(raw.contains(r#""exportDate":"2023-11-14T22:13:20.000Z""#));
        assert!(raw.contains(r#""version":"1.0""#));
    }

    #[test]
    fn exported_text_parses_back_to_same_map() {
        let export = ProgressExport::new(sample_map(), fixed_now());
        let raw = serde_json::to_string_pretty(&export).unwrap();
        assert_eq!(ProgressExport::parse_progress(&raw).unwrap(), sample_map());
    }

    #[test]
    fn backup_uses_its_own_date_field() {
        let backup = ProgressBackup::new(sample_map(), fixed_now());
        let raw = serde_json::to_string(&backup).unwrap();
        assert!(raw.contains("backupDate"));
        assert!(!raw.contains("exportDate"));
        assert_eq!(ProgressBackup::parse_progress(&raw).unwrap(), sample_map());
    }

    #[test]
    fn missing_progress_is_rejected() {
        let err = ProgressExport::parse_progress(r#"{"version":"1.0"}"#).unwrap_err();
        assert!(matches!(err, SnapshotError::MissingProgress));
    }

    #[test]
    fn bare_map_is_not_a_snapshot() {
        // `{"a": true}` has no `progress` field
        let err = ProgressExport::parse_progress(r#"{"a":true}"#).unwrap_err();
        assert!(matches!(err, SnapshotError::MissingProgress));
    }

    #[test]
    fn foreign_version_is_rejected() {
        let err =
            ProgressExport::parse_progress(r#"{"progress":{},"version":"2.0"}"#).unwrap_err();
        assert!(matches!(err, SnapshotError::UnsupportedVersion(v) if v == "2.0"));
    }

    #[test]
    fn version_and_date_are_optional() {
        let map = ProgressExport::parse_progress(r#"{"progress":{"x":true}}"#).unwrap();
        assert!(map.is_completed("x"));
    }

    #[test]
    fn non_object_payload_is_rejected() {
        let err = ProgressExport::parse_progress("[1,2]").unwrap_err();
        assert!(matches!(err, SnapshotError::NotAnObject));
    }
}
