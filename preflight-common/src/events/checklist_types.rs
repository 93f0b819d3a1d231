//! Checklist-related type definitions shared by events and the tracker

use serde::{Deserialize, Serialize};

/// Lifecycle status of a single checklist item
///
/// `Pending` is the initial status. `Completed` and `Skipped` are terminal;
/// `Flagged` is a recoverable hold (e.g. "needs supervisor review").
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Pending,
    Completed,
    Skipped,
    Flagged,
}

impl ItemStatus {
    /// Terminal statuses have no outgoing transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, ItemStatus::Completed | ItemStatus::Skipped)
    }
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ItemStatus::Pending => write!(f, "pending"),
            ItemStatus::Completed => write!(f, "completed"),
            ItemStatus::Skipped => write!(f, "skipped"),
            ItemStatus::Flagged => write!(f, "flagged"),
        }
    }
}

/// How a channel session ended
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChannelOutcome {
    /// A result at or above the confidence threshold was obtained
    Accepted,
    /// Retry budget consumed without a confident result
    Exhausted,
    /// Caller aborted the session between attempts
    Cancelled,
}

impl std::fmt::Display for ChannelOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelOutcome::Accepted => write!(f, "accepted"),
            ChannelOutcome::Exhausted => write!(f, "exhausted"),
            ChannelOutcome::Cancelled => write!(f, "cancelled"),
        }
    }
}
