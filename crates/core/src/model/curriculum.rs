use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::model::ids::{ChapterId, ModuleId, PhaseId, ProgressKey};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ContentError {
    #[error("learning path is not valid YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("{node} at {path} has an empty {field}")]
    EmptyField {
        node: &'static str,
        field: &'static str,
        path: String,
    },

    #[error("{path} has an invalid url: {url}")]
    InvalidUrl { path: String, url: String },
}

//
// ─── TREE ──────────────────────────────────────────────────────────────────────
//

/// A link listed under a module as optional further reading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Additional {
    pub name: String,
    pub url: String,
}

/// A content unit with its own completion flag and an ordered exercise list.
///
/// Exercises are plain names; their completion lives in the progress map
/// under keys derived from their position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    pub id: ChapterId,
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub exercises: Vec<String>,
}

impl Chapter {
    #[must_use]
    pub fn progress_key(&self, module: &ModuleId) -> ProgressKey {
        ProgressKey::chapter(module, &self.id)
    }

    /// Exercises paired with their position and progress key.
    pub fn exercise_keys<'a>(
        &'a self,
        module: &'a ModuleId,
    ) -> impl Iterator<Item = (usize, &'a str, ProgressKey)> + 'a {
        self.exercises
            .iter()
            .enumerate()
            .map(move |(index, name)| {
                (
                    index,
                    name.as_str(),
                    ProgressKey::exercise(module, &self.id, index),
                )
            })
    }

    /// Number of trackable items: every exercise plus the chapter itself.
    #[must_use]
    pub fn item_count(&self) -> usize {
        self.exercises.len() + 1
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    pub id: ModuleId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub chapters: Vec<Chapter>,
    #[serde(default)]
    pub additionals: Vec<Additional>,
}

impl Module {
    #[must_use]
    pub fn find_chapter(&self, id: &ChapterId) -> Option<&Chapter> {
        self.chapters.iter().find(|c| &c.id == id)
    }

    /// Every progress key this module contributes, chapter flag first.
    pub fn progress_keys(&self) -> impl Iterator<Item = ProgressKey> + '_ {
        self.chapters.iter().flat_map(move |chapter| {
            std::iter::once(chapter.progress_key(&self.id))
                .chain(chapter.exercise_keys(&self.id).map(|(_, _, key)| key))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phase {
    pub id: PhaseId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub modules: Vec<Module>,
}

/// Stand-alone module outside the core path; listed, never tracked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionalModule {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub url: String,
}

/// The whole curriculum. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LearningPath {
    #[serde(default)]
    pub phases: Vec<Phase>,
    #[serde(default)]
    pub optional_modules: Vec<OptionalModule>,
}

impl LearningPath {
    /// Parse and validate a curriculum document.
    ///
    /// # Errors
    ///
    /// Returns `ContentError::Parse` when the YAML does not match the tree
    /// shape, or a validation error for empty ids/names and bad urls.
    pub fn from_yaml_str(raw: &str) -> Result<Self, ContentError> {
        let path: Self = serde_yaml::from_str(raw)?;
        path.validate()?;
        Ok(path)
    }

    /// Check ids, names and urls across the tree.
    ///
    /// # Errors
    ///
    /// Returns the first `ContentError` found, in document order.
    pub fn validate(&self) -> Result<(), ContentError> {
        for phase in &self.phases {
            let phase_path = format!("phases[{}]", phase.id);
            require("phase", "id", phase.id.as_str(), &phase_path)?;
            require("phase", "name", &phase.name, &phase_path)?;

            for module in &phase.modules {
                let module_path = format!("{phase_path}.modules[{}]", module.id);
                require("module", "id", module.id.as_str(), &module_path)?;
                require("module", "name", &module.name, &module_path)?;

                for chapter in &module.chapters {
                    let chapter_path = format!("{module_path}.chapters[{}]", chapter.id);
                    require("chapter", "id", chapter.id.as_str(), &chapter_path)?;
                    require("chapter", "name", &chapter.name, &chapter_path)?;
                    check_url(&chapter.url, &chapter_path)?;
                }

                for (i, additional) in module.additionals.iter().enumerate() {
                    let path = format!("{module_path}.additionals[{i}]");
                    require("additional", "name", &additional.name, &path)?;
                    check_url(&additional.url, &path)?;
                }
            }
        }

        for optional in &self.optional_modules {
            let path = format!("optional_modules[{}]", optional.id);
            require("optional module", "id", &optional.id, &path)?;
            require("optional module", "name", &optional.name, &path)?;
            check_url(&optional.url, &path)?;
        }

        Ok(())
    }

    /// All modules in document order, paired with their phase.
    pub fn modules(&self) -> impl Iterator<Item = (&Phase, &Module)> {
        self.phases
            .iter()
            .flat_map(|phase| phase.modules.iter().map(move |module| (phase, module)))
    }

    /// First module with this id. Later duplicates are shadowed.
    #[must_use]
    pub fn find_module(&self, id: &ModuleId) -> Option<&Module> {
        self.modules().map(|(_, m)| m).find(|m| &m.id == id)
    }

    /// Total trackable items (exercises plus one flag per chapter).
    #[must_use]
    pub fn total_items(&self) -> usize {
        self.modules()
            .flat_map(|(_, m)| &m.chapters)
            .map(Chapter::item_count)
            .sum()
    }

    /// Progress keys produced by more than one node.
    ///
    /// Keys are not namespaced, so e.g. module `a` chapter `b-c` and module
    /// `a-b` chapter `c` share `a-b-c`. Such nodes share a completion flag.
    #[must_use]
    pub fn duplicate_progress_keys(&self) -> Vec<ProgressKey> {
        let mut seen: BTreeMap<ProgressKey, usize> = BTreeMap::new();
        for (_, module) in self.modules() {
            for key in module.progress_keys() {
                *seen.entry(key).or_default() += 1;
            }
        }
        seen.into_iter()
            .filter(|(_, count)| *count > 1)
            .map(|(key, _)| key)
            .collect()
    }
}

fn require(
    node: &'static str,
    field: &'static str,
    value: &str,
    path: &str,
) -> Result<(), ContentError> {
    if value.trim().is_empty() {
        return Err(ContentError::EmptyField {
            node,
            field,
            path: path.to_owned(),
        });
    }
    Ok(())
}

fn check_url(url: &str, path: &str) -> Result<(), ContentError> {
    Url::parse(url).map_err(|_| ContentError::InvalidUrl {
        path: path.to_owned(),
        url: url.to_owned(),
    })?;
    Ok(())
}
