//! Progress updates submitted by callers

use super::checklist::VerificationMethod;
use chrono::{DateTime, Utc};
use preflight_common::events::ItemStatus;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status a caller may propose for an item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProposedStatus {
    Completed,
    Skipped,
    Flagged,
}

impl From<ProposedStatus> for ItemStatus {
    fn from(status: ProposedStatus) -> Self {
        match status {
            ProposedStatus::Completed => ItemStatus::Completed,
            ProposedStatus::Skipped => ItemStatus::Skipped,
            ProposedStatus::Flagged => ItemStatus::Flagged,
        }
    }
}

/// A proposed status change for one item
///
/// Never mutated after creation: rejected updates are discarded, accepted
/// ones become the item's "last applied" record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub item_id: String,
    pub status: ProposedStatus,
    pub verification_method: VerificationMethod,
    /// An explicit confirmation step occurred (required for AI-assisted
    /// completion of required items)
    #[serde(default)]
    pub confirmed: bool,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub notes: Option<String>,
    /// Evidence reference (e.g. photo storage pointer)
    #[serde(default)]
    pub photo_evidence: Option<String>,
}

impl ProgressUpdate {
    pub fn new(
        item_id: impl Into<String>,
        status: ProposedStatus,
        verification_method: VerificationMethod,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            item_id: item_id.into(),
            status,
            verification_method,
            confirmed: false,
            timestamp: Utc::now(),
            notes: None,
            photo_evidence: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes = Some(note.into());
        self
    }

    pub fn with_evidence(mut self, evidence: impl Into<String>) -> Self {
        self.photo_evidence = Some(evidence.into());
        self
    }

    /// Mark that the caller explicitly confirmed this update
    pub fn confirmed(mut self) -> Self {
        self.confirmed = true;
        self
    }

    /// Whether `other` is a re-submission of this same update
    ///
    /// Matches on update id, or on item/status/timestamp for callers that
    /// regenerate ids on retry.
    pub fn is_same_update(&self, other: &ProgressUpdate) -> bool {
        self.id == other.id
            || (self.item_id == other.item_id
                && self.status == other.status
                && self.timestamp == other.timestamp)
    }
}
