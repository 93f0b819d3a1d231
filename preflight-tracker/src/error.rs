//! Error types for the checklist tracker
//!
//! Validation outcomes that the caller is expected to act on (blocked items,
//! illegal transitions) are returned as [`Rejection`](crate::tracker::Rejection)
//! values rather than errors. The types here cover load-time configuration
//! problems, transition checks, channel failures and collaborator failures.

use crate::channel::TranscriptionAttempt;
use crate::models::{ItemStatus, VerificationMethod};
use thiserror::Error;

/// Checklist structure problem detected at load time
///
/// Fatal for the affected checklist: it is never partially loaded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphConfigError {
    #[error("Duplicate item id: {0}")]
    DuplicateItem(String),

    #[error("Duplicate category id: {0}")]
    DuplicateCategory(String),

    #[error("Item {item} depends on unknown item {missing}")]
    DanglingDependency { item: String, missing: String },

    #[error("Dependency cycle detected involving item {item}")]
    Cycle { item: String },

    #[error("Item {item} references unknown category {category}")]
    UnknownCategory { item: String, category: String },

    #[error("Category {category} lists unknown item {item}")]
    UnknownCategoryItem { category: String, item: String },

    #[error("Item {item} belongs to category {expected} but is listed under {listed}")]
    CategoryMismatch {
        item: String,
        expected: String,
        listed: String,
    },

    #[error("Item {0} is not listed by its category")]
    UnlistedItem(String),

    #[error("Item {0} accepts no verification methods")]
    NoVerificationMethods(String),

    #[error("Category {category} quorum of {minimum} exceeds its {available} items")]
    InvalidQuorum {
        category: String,
        minimum: usize,
        available: usize,
    },
}

/// Progress update refused by the state machine
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("Item {item}: transition {from} -> {to} is not allowed")]
    InvalidTransition {
        item: String,
        from: ItemStatus,
        to: ItemStatus,
    },

    #[error("Item {item} does not accept {method} verification")]
    VerificationMismatch {
        item: String,
        method: VerificationMethod,
    },

    #[error("Item {item}: photo verification requires an evidence reference")]
    MissingEvidence { item: String },

    #[error("Item {item}: AI-assisted completion of a required item must be confirmed")]
    ConfirmationRequired { item: String },
}

/// Failure of an external collaborator call (noise reduction, extraction)
///
/// Always treated as transient by the channel: it consumes one attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Service call timed out after {0} ms")]
    Timeout(u64),

    #[error("Service call failed: {0}")]
    Failed(String),
}

/// Terminal outcome of a channel session that produced no usable result
#[derive(Debug, Clone, Error)]
pub enum ChannelError {
    /// Retry budget consumed; carries the best discarded candidate
    #[error("No result met the confidence threshold after {attempts} attempts")]
    Exhausted {
        attempts: u32,
        best: Option<TranscriptionAttempt>,
    },

    /// Caller aborted the session between attempts
    #[error("Channel session cancelled after {attempts} attempts")]
    Cancelled { attempts: u32 },
}

/// Tracker service error
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("Checklist {checklist_id} is misconfigured: {source}")]
    GraphConfiguration {
        checklist_id: String,
        #[source]
        source: GraphConfigError,
    },

    #[error("Unknown item {item_id} in checklist {checklist_id}")]
    UnknownItem {
        checklist_id: String,
        item_id: String,
    },

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error("Store error: {0}")]
    Store(#[from] preflight_common::Error),
}

/// Result type for tracker operations
pub type TrackerResult<T> = Result<T, TrackerError>;
