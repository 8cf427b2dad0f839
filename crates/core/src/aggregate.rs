//! Completion percentages derived from the curriculum and the progress map.
//!
//! Every chapter counts as `exercises + 1` items: its exercises plus its own
//! flag. Module, phase and path tallies are plain sums of chapter tallies.

use std::iter::Sum;
use std::ops::{Add, AddAssign};

use crate::model::{Chapter, LearningPath, Module, ModuleId, Phase, ProgressKey, ProgressMap};

/// Read access to completion flags.
pub trait CompletionLookup {
    fn is_completed(&self, key: &ProgressKey) -> bool;
}

impl CompletionLookup for ProgressMap {
    fn is_completed(&self, key: &ProgressKey) -> bool {
        ProgressMap::is_completed(self, key.as_str())
    }
}

/// Completed and total item counts for one node of the tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub completed: usize,
    pub total: usize,
}

impl Tally {
    #[must_use]
    pub fn new(completed: usize, total: usize) -> Self {
        Self { completed, total }
    }

    /// `round(100 * completed / total)`, half rounding up; 0 for an empty node.
    #[must_use]
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 0;
        }
        let rounded = (200 * self.completed + self.total) / (2 * self.total);
        u8::try_from(rounded.min(100)).unwrap_or(100)
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.total.saturating_sub(self.completed)
    }

    /// True when there is at least one item and all are done.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.total > 0 && self.completed >= self.total
    }
}

impl Add for Tally {
    type Output = Tally;

    fn add(self, rhs: Tally) -> Tally {
        Tally {
            completed: self.completed + rhs.completed,
            total: self.total + rhs.total,
        }
    }
}

impl AddAssign for Tally {
    fn add_assign(&mut self, rhs: Tally) {
        *self = *self + rhs;
    }
}

impl Sum for Tally {
    fn sum<I: Iterator<Item = Tally>>(iter: I) -> Tally {
        iter.fold(Tally::default(), Add::add)
    }
}

#[must_use]
pub fn chapter_tally(module: &ModuleId, chapter: &Chapter, lookup: &impl CompletionLookup) -> Tally {
    let own = usize::from(lookup.is_completed(&chapter.progress_key(module)));
    let exercises = chapter
        .exercise_keys(module)
        .filter(|(_, _, key)| lookup.is_completed(key))
        .count();
    Tally::new(own + exercises, chapter.item_count())
}

#[must_use]
pub fn module_tally(module: &Module, lookup: &impl CompletionLookup) -> Tally {
    module
        .chapters
        .iter()
        .map(|chapter| chapter_tally(&module.id, chapter, lookup))
        .sum()
}

#[must_use]
pub fn phase_tally(phase: &Phase, lookup: &impl CompletionLookup) -> Tally {
    phase.modules.iter().map(|m| module_tally(m, lookup)).sum()
}

#[must_use]
pub fn path_tally(path: &LearningPath, lookup: &impl CompletionLookup) -> Tally {
    path.phases.iter().map(|p| phase_tally(p, lookup)).sum()
}

/// True when a chapter has exercises and every one of them is completed.
#[must_use]
pub fn all_exercises_done(
    module: &ModuleId,
    chapter: &Chapter,
    lookup: &impl CompletionLookup,
) -> bool {
    !chapter.exercises.is_empty()
        && chapter
            .exercise_keys(module)
            .all(|(_, _, key)| lookup.is_completed(&key))
}

/// Overall numbers split by item kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompletionStats {
    pub overall: Tally,
    pub chapters: Tally,
    pub exercises: Tally,
}

#[must_use]
pub fn completion_stats(path: &LearningPath, lookup: &impl CompletionLookup) -> CompletionStats {
    let mut stats = CompletionStats::default();
    for (_, module) in path.modules() {
        for chapter in &module.chapters {
            let done = lookup.is_completed(&chapter.progress_key(&module.id));
            stats.chapters += Tally::new(usize::from(done), 1);

            let exercises_done = chapter
                .exercise_keys(&module.id)
                .filter(|(_, _, key)| lookup.is_completed(key))
                .count();
            stats.exercises += Tally::new(exercises_done, chapter.exercises.len());
        }
    }
    stats.overall = stats.chapters + stats.exercises;
    stats
}
