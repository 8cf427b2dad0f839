//! Curriculum plus progress: toggles, cached tallies and the outline view.

use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use learnpath_core::aggregate::{self, CompletionStats, Tally};
use learnpath_core::model::{
    Additional, Chapter, ChapterId, LearningPath, Module, ModuleId, OptionalModule, PhaseId,
    ProgressKey,
};

use crate::error::{ChecklistError, ProgressError};
use crate::progress_store::ProgressStore;

/// Result of a single toggle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToggleOutcome {
    pub key: ProgressKey,
    pub completed: bool,
    /// Chapter flag switched on because its last exercise was completed.
    pub auto_completed_chapter: Option<ProgressKey>,
}

//
// ─── OUTLINE ───────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outline {
    pub tally: Tally,
    pub phases: Vec<PhaseNode>,
    pub optional_modules: Vec<OptionalModule>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseNode {
    pub id: PhaseId,
    pub name: String,
    pub description: String,
    pub tally: Tally,
    pub modules: Vec<ModuleNode>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleNode {
    pub id: ModuleId,
    pub name: String,
    pub description: String,
    pub tally: Tally,
    pub chapters: Vec<ChapterNode>,
    pub additionals: Vec<Additional>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterNode {
    pub id: ChapterId,
    pub key: ProgressKey,
    pub name: String,
    pub url: String,
    pub completed: bool,
    pub tally: Tally,
    pub exercises: Vec<ExerciseNode>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExerciseNode {
    pub index: usize,
    pub key: ProgressKey,
    pub name: String,
    pub completed: bool,
}

//
// ─── SERVICE ───────────────────────────────────────────────────────────────────
//

/// Owns the loaded curriculum and the progress store.
///
/// Module tallies are computed on first use and cached by module position.
/// A toggle drops the cache entries of modules whose key prefix matches;
/// bulk replacements (import, reset, restore) drop everything.
pub struct ChecklistService {
    path: Arc<LearningPath>,
    store: ProgressStore,
    auto_complete_chapters: bool,
    module_cache: Mutex<Vec<Option<Tally>>>,
}

impl ChecklistService {
    #[must_use]
    pub fn new(path: Arc<LearningPath>, store: ProgressStore, auto_complete_chapters: bool) -> Self {
        let modules = path.modules().count();
        Self {
            path,
            store,
            auto_complete_chapters,
            module_cache: Mutex::new(vec![None; modules]),
        }
    }

    #[must_use]
    pub fn path(&self) -> &LearningPath {
        &self.path
    }

    #[must_use]
    pub fn store(&self) -> &ProgressStore {
        &self.store
    }

    #[must_use]
    pub fn auto_complete_chapters(&self) -> bool {
        self.auto_complete_chapters
    }

    /// Toggle a chapter's own flag.
    ///
    /// # Errors
    ///
    /// Returns `ChecklistError::UnknownModule` or `UnknownChapter` when the
    /// ids do not name a chapter in the curriculum.
    pub async fn toggle_chapter(
        &mut self,
        module: &ModuleId,
        chapter: &ChapterId,
    ) -> Result<ToggleOutcome, ChecklistError> {
        let (module, chapter) = self.find_chapter(module, chapter)?;
        let key = chapter.progress_key(&module.id);
        Ok(self.toggle_key(key).await)
    }

    /// Toggle one exercise by its position in the chapter.
    ///
    /// # Errors
    ///
    /// Returns `ChecklistError` when the module, chapter or exercise index
    /// does not exist.
    pub async fn toggle_exercise(
        &mut self,
        module: &ModuleId,
        chapter: &ChapterId,
        index: usize,
    ) -> Result<ToggleOutcome, ChecklistError> {
        let (m, c) = self.find_chapter(module, chapter)?;
        if index >= c.exercises.len() {
            return Err(ChecklistError::UnknownExercise {
                module: module.clone(),
                chapter: chapter.clone(),
                index,
            });
        }
        let key = ProgressKey::exercise(&m.id, &c.id, index);
        Ok(self.toggle_key(key).await)
    }

    /// Toggle any key, known to the curriculum or not.
    pub async fn toggle_key(&mut self, key: ProgressKey) -> ToggleOutcome {
        let completed = self.store.toggle(key.clone()).await;
        self.invalidate(&key);

        let mut auto_completed_chapter = None;
        if completed && self.auto_complete_chapters {
            if let Some(chapter_key) = self.chapter_ready_for_auto_complete(&key) {
                self.store.set(chapter_key.clone(), true).await;
                self.invalidate(&chapter_key);
                info!(chapter = %chapter_key, "chapter completed with its last exercise");
                auto_completed_chapter = Some(chapter_key);
            }
        }

        ToggleOutcome {
            key,
            completed,
            auto_completed_chapter,
        }
    }

    /// Import an export document, see [`ProgressStore::import`].
    ///
    /// # Errors
    ///
    /// Propagates `ProgressError` from the store.
    pub async fn import(&mut self, raw: &str) -> Result<usize, ProgressError> {
        let count = self.store.import(raw).await?;
        self.invalidate_all();
        Ok(count)
    }

    /// Back up and clear all progress.
    ///
    /// # Errors
    ///
    /// Propagates `ProgressError` from the store.
    pub async fn reset(&mut self) -> Result<(), ProgressError> {
        self.store.reset().await?;
        self.invalidate_all();
        Ok(())
    }

    /// # Errors
    ///
    /// Propagates `ProgressError` from the store.
    pub async fn restore_from_backup(&mut self) -> Result<usize, ProgressError> {
        let count = self.store.restore_from_backup().await?;
        self.invalidate_all();
        Ok(count)
    }

    /// # Errors
    ///
    /// Propagates `ProgressError` from the store.
    pub async fn create_backup(&self) -> Result<(), ProgressError> {
        self.store.create_backup().await
    }

    #[must_use]
    pub fn is_completed(&self, key: &ProgressKey) -> bool {
        self.store.is_completed(key.as_str())
    }

    /// Tally of the first module with this id.
    #[must_use]
    pub fn module_tally(&self, id: &ModuleId) -> Option<Tally> {
        let index = self.path.modules().position(|(_, m)| &m.id == id)?;
        Some(self.cached_module_tally(index))
    }

    /// # Errors
    ///
    /// Returns `ChecklistError::UnknownPhase` for an id not in the curriculum.
    pub fn phase_tally(&self, id: &PhaseId) -> Result<Tally, ChecklistError> {
        self.phase_tallies()
            .into_iter()
            .find(|(phase, _)| phase == id)
            .map(|(_, tally)| tally)
            .ok_or_else(|| ChecklistError::UnknownPhase(id.clone()))
    }

    #[must_use]
    pub fn overall(&self) -> Tally {
        (0..self.module_count())
            .map(|index| self.cached_module_tally(index))
            .sum()
    }

    #[must_use]
    pub fn stats(&self) -> CompletionStats {
        self.store.stats(&self.path)
    }

    /// Full presentation tree.
    #[must_use]
    pub fn outline(&self) -> Outline {
        let progress = self.store.progress();
        let mut module_index = 0;
        let mut phases = Vec::with_capacity(self.path.phases.len());

        for phase in &self.path.phases {
            let mut modules = Vec::with_capacity(phase.modules.len());
            for module in &phase.modules {
                let tally = self.cached_module_tally(module_index);
                module_index += 1;

                let chapters = module
                    .chapters
                    .iter()
                    .map(|chapter| {
                        let key = chapter.progress_key(&module.id);
                        ChapterNode {
                            id: chapter.id.clone(),
                            completed: progress.is_completed(key.as_str()),
                            tally: aggregate::chapter_tally(&module.id, chapter, progress),
                            key,
                            name: chapter.name.clone(),
                            url: chapter.url.clone(),
                            exercises: chapter
                                .exercise_keys(&module.id)
                                .map(|(index, name, key)| ExerciseNode {
                                    index,
                                    completed: progress.is_completed(key.as_str()),
                                    key,
                                    name: name.to_owned(),
                                })
                                .collect(),
                        }
                    })
                    .collect();

                modules.push(ModuleNode {
                    id: module.id.clone(),
                    name: module.name.clone(),
                    description: module.description.clone(),
                    tally,
                    chapters,
                    additionals: module.additionals.clone(),
                });
            }

            phases.push(PhaseNode {
                id: phase.id.clone(),
                name: phase.name.clone(),
                description: phase.description.clone(),
                tally: modules.iter().map(|m| m.tally).sum(),
                modules,
            });
        }

        Outline {
            tally: phases.iter().map(|p| p.tally).sum(),
            phases,
            optional_modules: self.path.optional_modules.clone(),
        }
    }

    fn module_count(&self) -> usize {
        self.path.modules().count()
    }

    fn phase_tallies(&self) -> Vec<(PhaseId, Tally)> {
        let mut index = 0;
        self.path
            .phases
            .iter()
            .map(|phase| {
                let tally = (index..index + phase.modules.len())
                    .map(|i| self.cached_module_tally(i))
                    .sum();
                index += phase.modules.len();
                (phase.id.clone(), tally)
            })
            .collect()
    }

    fn find_chapter(
        &self,
        module: &ModuleId,
        chapter: &ChapterId,
    ) -> Result<(&Module, &Chapter), ChecklistError> {
        let m = self
            .path
            .find_module(module)
            .ok_or_else(|| ChecklistError::UnknownModule(module.clone()))?;
        let c = m
            .find_chapter(chapter)
            .ok_or_else(|| ChecklistError::UnknownChapter {
                module: module.clone(),
                chapter: chapter.clone(),
            })?;
        Ok((m, c))
    }

    /// Chapter key to switch on if `exercise` was the last open exercise of
    /// a chapter whose own flag is still off.
    fn chapter_ready_for_auto_complete(&self, exercise: &ProgressKey) -> Option<ProgressKey> {
        let progress = self.store.progress();
        self.path
            .modules()
            .flat_map(|(_, module)| module.chapters.iter().map(move |c| (module, c)))
            .find(|(module, chapter)| {
                chapter
                    .exercise_keys(&module.id)
                    .any(|(_, _, key)| &key == exercise)
            })
            .filter(|(module, chapter)| aggregate::all_exercises_done(&module.id, chapter, progress))
            .map(|(module, chapter)| chapter.progress_key(&module.id))
            .filter(|key| !progress.is_completed(key.as_str()))
    }

    fn cached_module_tally(&self, index: usize) -> Tally {
        let compute = || {
            self.path
                .modules()
                .nth(index)
                .map(|(_, m)| aggregate::module_tally(m, self.store.progress()))
                .unwrap_or_default()
        };

        let Ok(mut cache) = self.module_cache.lock() else {
            return compute();
        };
        match cache.get(index).copied().flatten() {
            Some(tally) => tally,
            None => {
                let tally = compute();
                if let Some(slot) = cache.get_mut(index) {
                    *slot = Some(tally);
                }
                tally
            }
        }
    }

    fn invalidate(&self, key: &ProgressKey) {
        let Ok(mut cache) = self.module_cache.lock() else {
            return;
        };
        for ((_, module), slot) in self.path.modules().zip(cache.iter_mut()) {
            if key.is_in_module(&module.id) {
                *slot = None;
            }
        }
        debug!(%key, "module tallies invalidated");
    }

    fn invalidate_all(&self) {
        if let Ok(mut cache) = self.module_cache.lock() {
            cache.iter_mut().for_each(|slot| *slot = None);
        }
    }

    #[cfg(test)]
    fn is_cached(&self, id: &ModuleId) -> bool {
        let Some(index) = self.path.modules().position(|(_, m)| &m.id == id) else {
            return false;
        };
        self.module_cache
            .lock()
            .map(|cache| cache.get(index).copied().flatten().is_some())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use learnpath_core::time::fixed_clock;
    use storage::repository::InMemoryStore;

    use crate::progress_store::ProgressSettings;

    const PATH: &str = r"
phases:
  - id: phase1
    name: Foundations
    modules:
      - id: part0
        name: Fundamentals
        chapters:
          - id: a
            name: Chapter A
            url: https://example.com/a
            exercises: [one, two, three]
          - id: b
            name: Chapter B
            url: https://example.com/b
      - id: part1
        name: Next
        chapters:
          - id: c
            name: Chapter C
            url: https://example.com/c
            exercises: [x]
  - id: phase2
    name: Empty
optional_modules:
  - id: extra
    name: Extra
    url: https://example.com/extra
";

    async fn service(auto_complete: bool) -> ChecklistService {
        let path = Arc::new(LearningPath::from_yaml_str(PATH).unwrap());
        let store = ProgressStore::load(
            fixed_clock(),
            Arc::new(InMemoryStore::new()),
            ProgressSettings::default(),
        )
        .await;
        ChecklistService::new(path, store, auto_complete)
    }

    fn module(id: &str) -> ModuleId {
        ModuleId::new(id)
    }

    fn chapter(id: &str) -> ChapterId {
        ChapterId::new(id)
    }

    #[tokio::test]
    async fn two_of_three_exercises_is_half_the_chapter() {
        let mut svc = service(false).await;
        svc.toggle_exercise(&module("part0"), &chapter("a"), 0).await.unwrap();
        svc.toggle_exercise(&module("part0"), &chapter("a"), 1).await.unwrap();

        let outline = svc.outline();
        let node = &outline.phases[0].modules[0].chapters[0];
        assert_eq!(node.tally, Tally::new(2, 4));
        assert_eq!(node.tally.percent(), 50);
        assert!(node.exercises[0].completed);
        assert!(!node.exercises[2].completed);
    }

    #[tokio::test]
    async fn totals_count_one_per_chapter_plus_exercises() {
        let mut svc = service(false).await;
        assert_eq!(svc.overall(), Tally::new(0, 7));
        assert_eq!(svc.module_tally(&module("part0")), Some(Tally::new(0, 5)));
        assert_eq!(svc.phase_tally(&"phase2".parse().unwrap()).unwrap(), Tally::new(0, 0));
        assert_eq!(svc.phase_tally(&"phase2".parse().unwrap()).unwrap().percent(), 0);

        svc.toggle_chapter(&module("part1"), &chapter("c")).await.unwrap();
        assert_eq!(svc.overall(), Tally::new(1, 7));
        assert_eq!(svc.overall(), svc.stats().overall);
    }

    #[tokio::test]
    async fn toggle_only_invalidates_owning_module() {
        let mut svc = service(false).await;
        let _ = svc.overall();
        assert!(svc.is_cached(&module("part0")));
        assert!(svc.is_cached(&module("part1")));

        let outcome = svc.toggle_chapter(&module("part0"), &chapter("b")).await.unwrap();
        assert!(outcome.completed);
        assert!(!svc.is_cached(&module("part0")));
        assert!(svc.is_cached(&module("part1")));

        assert_eq!(svc.module_tally(&module("part0")), Some(Tally::new(1, 5)));
        assert!(svc.is_cached(&module("part0")));
    }

    #[tokio::test]
    async fn unknown_targets_are_rejected() {
        let mut svc = service(false).await;
        assert!(matches!(
            svc.toggle_chapter(&module("nope"), &chapter("a")).await,
            Err(ChecklistError::UnknownModule(_))
        ));
        assert!(matches!(
            svc.toggle_chapter(&module("part0"), &chapter("zzz")).await,
            Err(ChecklistError::UnknownChapter { .. })
        ));
        assert!(matches!(
            svc.toggle_exercise(&module("part0"), &chapter("a"), 3).await,
            Err(ChecklistError::UnknownExercise { index: 3, .. })
        ));
        assert!(matches!(
            svc.phase_tally(&"nope".parse().unwrap()),
            Err(ChecklistError::UnknownPhase(_))
        ));
        assert!(svc.store().progress().is_empty());
    }

    #[tokio::test]
    async fn auto_complete_is_off_by_default() {
        let mut svc = service(false).await;
        for i in 0..3 {
            let outcome = svc.toggle_exercise(&module("part0"), &chapter("a"), i).await.unwrap();
            assert_eq!(outcome.auto_completed_chapter, None);
        }
        assert!(!svc.is_completed(&"part0-a".parse().unwrap()));
    }

    #[tokio::test]
    async fn auto_complete_sets_chapter_on_last_exercise() {
        let mut svc = service(true).await;
        svc.toggle_exercise(&module("part0"), &chapter("a"), 0).await.unwrap();
        svc.toggle_exercise(&module("part0"), &chapter("a"), 1).await.unwrap();
        let outcome = svc.toggle_exercise(&module("part0"), &chapter("a"), 2).await.unwrap();

        assert_eq!(outcome.auto_completed_chapter, Some("part0-a".parse().unwrap()));
        assert_eq!(svc.module_tally(&module("part0")), Some(Tally::new(4, 5)));

        // unticking an exercise never clears the chapter
        let outcome = svc.toggle_exercise(&module("part0"), &chapter("a"), 2).await.unwrap();
        assert!(!outcome.completed);
        assert!(svc.is_completed(&"part0-a".parse().unwrap()));
    }

    #[tokio::test]
    async fn bulk_operations_refresh_cached_tallies() {
        let mut svc = service(false).await;
        svc.toggle_chapter(&module("part0"), &chapter("a")).await.unwrap();
        assert_eq!(svc.overall(), Tally::new(1, 7));

        svc.reset().await.unwrap();
        assert_eq!(svc.overall(), Tally::new(0, 7));

        svc.restore_from_backup().await.unwrap();
        assert_eq!(svc.overall(), Tally::new(1, 7));

        let doc = r#"{"progress":{"part1-c":true,"part1-c-exercise-0":true},"version":"1.0"}"#;
        assert_eq!(svc.import(doc).await.unwrap(), 2);
        assert_eq!(svc.overall(), Tally::new(2, 7));
        assert_eq!(svc.module_tally(&module("part0")), Some(Tally::new(0, 5)));
    }

    #[tokio::test]
    async fn outline_carries_optional_modules_and_sums() {
        let mut svc = service(false).await;
        svc.toggle_key("part0-b".parse().unwrap()).await;

        let outline = svc.outline();
        assert_eq!(outline.tally, Tally::new(1, 7));
        assert_eq!(outline.phases.len(), 2);
        assert_eq!(outline.phases[0].tally, Tally::new(1, 7));
        assert!(outline.phases[1].modules.is_empty());
        assert!(outline.phases[0].modules[0].chapters[1].completed);
        assert_eq!(outline.optional_modules[0].id, "extra");
    }
}
