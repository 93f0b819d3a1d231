//! Per-item lifecycle state machine
//!
//! ```text
//! pending ──> completed
//!    │  ├──> skipped
//!    │  └──> flagged ──> completed | skipped
//! ```
//!
//! `completed` and `skipped` are terminal. Leaving them is only possible via
//! an explicit reset, which does not go through this machine.

use crate::error::TransitionError;
use crate::models::{ChecklistItem, ItemStatus, ProgressUpdate, ProposedStatus, VerificationMethod};
use serde::{Deserialize, Serialize};

/// Work the caller must perform after an accepted transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SideEffects {
    pub notify_dependents: bool,
    pub recheck_category: bool,
}

/// Accepted transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub item_id: String,
    pub from: ItemStatus,
    pub to: ItemStatus,
    pub effects: SideEffects,
}

/// Stateless validator; the current status is always supplied by the caller
#[derive(Debug, Clone, Copy, Default)]
pub struct ProgressStateMachine;

impl ProgressStateMachine {
    pub fn new() -> Self {
        Self
    }

    /// Whether `from -> to` is in the transition table
    pub fn can_transition(from: ItemStatus, to: ItemStatus) -> bool {
        use ItemStatus::*;
        matches!(
            (from, to),
            (Pending, Completed)
                | (Pending, Skipped)
                | (Pending, Flagged)
                | (Flagged, Completed)
                | (Flagged, Skipped)
        )
    }

    /// Validate `update` against `item` in its `current` status
    ///
    /// Checks run in order: transition table, verification method, photo
    /// evidence, AI-assisted confirmation. The first failure is returned.
    pub fn validate_update(
        &self,
        item: &ChecklistItem,
        update: &ProgressUpdate,
        current: ItemStatus,
    ) -> Result<Transition, TransitionError> {
        let to = ItemStatus::from(update.status);

        if !Self::can_transition(current, to) {
            return Err(TransitionError::InvalidTransition {
                item: item.id.clone(),
                from: current,
                to,
            });
        }

        if !item.accepts(update.verification_method) {
            return Err(TransitionError::VerificationMismatch {
                item: item.id.clone(),
                method: update.verification_method,
            });
        }

        if update.verification_method == VerificationMethod::Photo
            && update
                .photo_evidence
                .as_deref()
                .map_or(true, |e| e.trim().is_empty())
        {
            return Err(TransitionError::MissingEvidence {
                item: item.id.clone(),
            });
        }

        if update.verification_method == VerificationMethod::AiAssisted
            && update.status == ProposedStatus::Completed
            && item.required
            && !update.confirmed
        {
            return Err(TransitionError::ConfirmationRequired {
                item: item.id.clone(),
            });
        }

        Ok(Transition {
            item_id: item.id.clone(),
            from: current,
            to,
            effects: Self::effects_of(to),
        })
    }

    fn effects_of(to: ItemStatus) -> SideEffects {
        match to {
            ItemStatus::Completed => SideEffects {
                notify_dependents: true,
                recheck_category: true,
            },
            ItemStatus::Skipped => SideEffects {
                notify_dependents: false,
                recheck_category: true,
            },
            ItemStatus::Flagged | ItemStatus::Pending => SideEffects {
                notify_dependents: false,
                recheck_category: false,
            },
        }
    }
}
