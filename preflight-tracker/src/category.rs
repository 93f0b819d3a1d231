//! Category completion evaluation
//!
//! Category state is always recomputed from scratch from the current item
//! statuses, never maintained incrementally.

use crate::graph::DependencyGraph;
use crate::models::{Category, Checklist, CompletionRule, ItemStatus};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryState {
    pub category_id: String,
    pub complete: bool,
    pub completed_items: usize,
    pub total_items: usize,
    pub completed_required: usize,
    pub total_required: usize,
    /// Completed items as a percentage of all items (0-100)
    pub percentage: f32,
}

/// Evaluate `category` against the statuses held by `graph`
///
/// Skipped items never count as completed, so a category whose rule needs a
/// skipped item stays incomplete.
pub fn evaluate(category: &Category, checklist: &Checklist, graph: &DependencyGraph) -> CategoryState {
    let mut completed_items = 0;
    let mut completed_required = 0;
    let mut total_required = 0;

    for item_id in &category.items {
        let completed = graph.item_status(item_id) == Some(ItemStatus::Completed);
        let required = graph.item(checklist, item_id).map_or(false, |i| i.required);

        if completed {
            completed_items += 1;
        }
        if required {
            total_required += 1;
            if completed {
                completed_required += 1;
            }
        }
    }

    let total_items = category.items.len();
    let required_done = completed_required == total_required;

    let complete = match category.rule {
        CompletionRule::AllRequired => required_done,
        CompletionRule::AllItems => completed_items == total_items,
        CompletionRule::Quorum { minimum } => required_done && completed_items >= minimum,
    };

    let percentage = if total_items == 0 {
        100.0
    } else {
        completed_items as f32 / total_items as f32 * 100.0
    };

    CategoryState {
        category_id: category.id.clone(),
        complete,
        completed_items,
        total_items,
        completed_required,
        total_required,
        percentage,
    }
}

/// Evaluate every category of `checklist`, in declaration order
pub fn evaluate_all(checklist: &Checklist, graph: &DependencyGraph) -> Vec<CategoryState> {
    checklist
        .categories
        .iter()
        .map(|category| evaluate(category, checklist, graph))
        .collect()
}
