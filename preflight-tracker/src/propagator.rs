//! Propagation of accepted updates through the graph and categories
//!
//! Runs after the state machine has accepted an update. Callers must hold the
//! checklist's exclusive section for the whole propagation so readers only
//! ever observe post-propagation state.

use crate::category::{self, CategoryState};
use crate::graph::DependencyGraph;
use crate::models::{Checklist, ItemStatus, ProgressUpdate};
use crate::state_machine::Transition;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Category completeness flip caused by a propagation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CategoryTransition {
    /// incomplete -> complete
    Completed,
    /// complete -> incomplete (only possible through reset)
    Reopened,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropagationReport {
    pub item_id: String,
    pub new_status: ItemStatus,
    /// Dependents that moved blocked -> pending
    pub newly_unblocked: Vec<String>,
    /// Owning category after recompute
    pub category: Option<CategoryState>,
    pub category_transition: Option<CategoryTransition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResetReport {
    pub item_id: String,
    pub previous_status: ItemStatus,
    /// Dependents that moved pending -> blocked
    pub reblocked: Vec<String>,
    pub category: Option<CategoryState>,
    pub category_transition: Option<CategoryTransition>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CompletionPropagator;

impl CompletionPropagator {
    pub fn new() -> Self {
        Self
    }

    /// Whether `update` was already applied to its item
    pub fn is_already_applied(graph: &DependencyGraph, update: &ProgressUpdate) -> bool {
        graph
            .last_applied(&update.item_id)
            .map_or(false, |applied| applied.is_same_update(update))
    }

    /// Apply an accepted transition
    pub fn on_accepted(
        &self,
        graph: &mut DependencyGraph,
        checklist: &Checklist,
        update: &ProgressUpdate,
        transition: &Transition,
    ) -> PropagationReport {
        let owning = checklist.category_of(&update.item_id);
        let before = owning.map(|c| category::evaluate(c, checklist, graph));

        graph.record_applied(update);

        let mut newly_unblocked = Vec::new();
        if transition.to == ItemStatus::Completed {
            graph.apply_completion(&update.item_id);
        }
        if transition.effects.notify_dependents {
            newly_unblocked = graph.on_dependency_completed(&update.item_id);
        }

        let after = if transition.effects.recheck_category {
            owning.map(|c| category::evaluate(c, checklist, graph))
        } else {
            before.clone()
        };
        let category_transition = flip(before.as_ref(), after.as_ref());

        debug!(
            checklist_id = %checklist.id,
            item_id = %update.item_id,
            status = %transition.to,
            unblocked = newly_unblocked.len(),
            "Update propagated"
        );
        if let (Some(CategoryTransition::Completed), Some(state)) = (category_transition, &after) {
            info!(
                checklist_id = %checklist.id,
                category_id = %state.category_id,
                "Category completed"
            );
        }

        PropagationReport {
            item_id: update.item_id.clone(),
            new_status: transition.to,
            newly_unblocked,
            category: after,
            category_transition,
        }
    }

    /// Return `item_id` to pending and re-gate its dependents
    pub fn on_reset(
        &self,
        graph: &mut DependencyGraph,
        checklist: &Checklist,
        item_id: &str,
    ) -> ResetReport {
        let owning = checklist.category_of(item_id);
        let before = owning.map(|c| category::evaluate(c, checklist, graph));
        let previous_status = graph.item_status(item_id).unwrap_or(ItemStatus::Pending);

        let reblocked = graph.reset(item_id);
        let after = owning.map(|c| category::evaluate(c, checklist, graph));
        let category_transition = flip(before.as_ref(), after.as_ref());

        info!(
            checklist_id = %checklist.id,
            item_id = %item_id,
            previous = %previous_status,
            reblocked = reblocked.len(),
            "Item reset"
        );

        ResetReport {
            item_id: item_id.to_string(),
            previous_status,
            reblocked,
            category: after,
            category_transition,
        }
    }
}

fn flip(before: Option<&CategoryState>, after: Option<&CategoryState>) -> Option<CategoryTransition> {
    match (before.map(|s| s.complete), after.map(|s| s.complete)) {
        (Some(false), Some(true)) => Some(CategoryTransition::Completed),
        (Some(true), Some(false)) => Some(CategoryTransition::Reopened),
        _ => None,
    }
}
