use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::ids::ProgressKey;
use crate::model::snapshot::SnapshotError;

/// Completion flags keyed by progress key.
///
/// A key is only present after it has been written; absence reads as
/// "not completed". Serialized as a flat JSON object in key order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProgressMap(BTreeMap<ProgressKey, bool>);

impl ProgressMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode the live map as persisted by the store.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotError` if the text is not JSON, not an object, or holds
    /// a non-boolean value or an empty key.
    pub fn from_json_str(raw: &str) -> Result<Self, SnapshotError> {
        let value: Value = serde_json::from_str(raw)?;
        Self::from_json_value(&value)
    }

    pub(crate) fn from_json_value(value: &Value) -> Result<Self, SnapshotError> {
        let Value::Object(entries) = value else {
            return Err(SnapshotError::ProgressNotAMap);
        };
        let mut map = BTreeMap::new();
        for (key, flag) in entries {
            let flag = flag
                .as_bool()
                .ok_or_else(|| SnapshotError::NonBooleanValue { key: key.clone() })?;
            let key = ProgressKey::try_new(key.as_str()).map_err(|_| SnapshotError::EmptyKey)?;
            map.insert(key, flag);
        }
        Ok(Self(map))
    }

    /// Encode for persistence.
    ///
    /// # Errors
    ///
    /// Propagates `serde_json` failures.
    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    #[must_use]
    pub fn is_completed(&self, key: &str) -> bool {
        self.0.get(key).copied().unwrap_or(false)
    }

    /// Flip a flag (absent counts as false) and return the new value.
    pub fn toggle(&mut self, key: ProgressKey) -> bool {
        let flag = self.0.entry(key).or_insert(false);
        *flag = !*flag;
        *flag
    }

    pub fn set(&mut self, key: ProgressKey, completed: bool) {
        self.0.insert(key, completed);
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Number of keys ever written, completed or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn completed_count(&self) -> usize {
        self.0.values().filter(|done| **done).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ProgressKey, bool)> {
        self.0.iter().map(|(k, v)| (k, *v))
    }
}

impl FromIterator<(ProgressKey, bool)> for ProgressMap {
    fn from_iter<I: IntoIterator<Item = (ProgressKey, bool)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
