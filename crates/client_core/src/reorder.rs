//! Turns a drag-and-drop result into the smallest position update the server needs.

use std::collections::{HashMap, HashSet};

use shared::domain::{Chapter, ChapterId, ChapterPosition};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReorderPlanError {
    #[error("index {index} is out of range for {len} chapters")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("new order has {actual} chapters, expected {expected}")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("chapter {0} is not part of the current list")]
    UnknownChapter(ChapterId),
    #[error("chapter {0} appears more than once in the new order")]
    DuplicateChapter(ChapterId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReorderPlan {
    /// Full display order after the move.
    pub order: Vec<ChapterId>,
    /// Only the chapters whose stored position differs from their new index.
    pub updates: Vec<ChapterPosition>,
}

impl ReorderPlan {
    pub fn is_noop(&self) -> bool {
        self.updates.is_empty()
    }
}

/// Removes the element at `from` and reinserts it at `to`.
pub fn move_item<T: Clone>(items: &[T], from: usize, to: usize) -> Result<Vec<T>, ReorderPlanError> {
    let len = items.len();
    for index in [from, to] {
        if index >= len {
            return Err(ReorderPlanError::IndexOutOfRange { index, len });
        }
    }
    let mut moved = items.to_vec();
    let item = moved.remove(from);
    moved.insert(to, item);
    Ok(moved)
}

/// Diffs `new_order` against `current` (which must be in display order).
///
/// Positions in the plan are 0-based indexes in `new_order`. A chapter already
/// stored at its new index is left out, so writing the plan always yields a list
/// whose positions sort into `new_order`.
pub fn plan_reorder(
    current: &[Chapter],
    new_order: &[ChapterId],
) -> Result<ReorderPlan, ReorderPlanError> {
    if current.len() != new_order.len() {
        return Err(ReorderPlanError::LengthMismatch {
            expected: current.len(),
            actual: new_order.len(),
        });
    }

    let stored: HashMap<ChapterId, i64> = current
        .iter()
        .map(|chapter| (chapter.chapter_id, chapter.position))
        .collect();
    let mut seen = HashSet::with_capacity(new_order.len());
    let mut updates = Vec::new();

    for (index, id) in new_order.iter().enumerate() {
        let Some(&position) = stored.get(id) else {
            return Err(ReorderPlanError::UnknownChapter(*id));
        };
        if !seen.insert(*id) {
            return Err(ReorderPlanError::DuplicateChapter(*id));
        }
        let index = index as i64;
        if position != index {
            updates.push(ChapterPosition {
                id: *id,
                position: index,
            });
        }
    }

    Ok(ReorderPlan {
        order: new_order.to_vec(),
        updates,
    })
}

/// Plans a single drag from index `from` to index `to` of the displayed list.
pub fn plan_move(current: &[Chapter], from: usize, to: usize) -> Result<ReorderPlan, ReorderPlanError> {
    let ids: Vec<ChapterId> = current.iter().map(|chapter| chapter.chapter_id).collect();
    let new_order = move_item(&ids, from, to)?;
    plan_reorder(current, &new_order)
}

/// Applies a committed plan to the locally rendered chapters.
pub fn apply_plan(current: &[Chapter], plan: &ReorderPlan) -> Vec<Chapter> {
    let by_id: HashMap<ChapterId, &Chapter> = current
        .iter()
        .map(|chapter| (chapter.chapter_id, chapter))
        .collect();
    let updated: HashMap<ChapterId, i64> = plan
        .updates
        .iter()
        .map(|update| (update.id, update.position))
        .collect();

    plan.order
        .iter()
        .filter_map(|id| by_id.get(id))
        .map(|chapter| {
            let mut chapter = (*chapter).clone();
            if let Some(position) = updated.get(&chapter.chapter_id) {
                chapter.position = *position;
            }
            chapter
        })
        .collect()
}

#[cfg(test)]
#[path = "tests/reorder_tests.rs"]
mod tests;
