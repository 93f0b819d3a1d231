//! Event types for the Preflight event system
//!
//! Provides shared event definitions and the EventBus used by the tracker.

mod checklist_types;

pub use checklist_types::{ChannelOutcome, ItemStatus};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Preflight event types
///
/// Events are only emitted after a checklist update has fully propagated,
/// so a subscriber never observes intermediate graph state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PreflightEvent {
    /// An accepted progress update changed an item's status
    ///
    /// Triggers:
    /// - Dashboard: refresh item row
    /// - Persistence: already written before emission
    ItemUpdated {
        checklist_id: String,
        item_id: String,
        old_status: ItemStatus,
        new_status: ItemStatus,
        timestamp: DateTime<Utc>,
    },

    /// All dependencies of an item are now completed
    ItemUnblocked {
        checklist_id: String,
        item_id: String,
        /// Dependency whose completion released the item
        unblocked_by: String,
        timestamp: DateTime<Utc>,
    },

    /// An item's gate closed again after an explicit reset upstream
    ItemBlocked {
        checklist_id: String,
        item_id: String,
        /// Reset dependencies that closed the item's gate
        blocked_by: Vec<String>,
        timestamp: DateTime<Utc>,
    },

    /// An item was explicitly reset to pending
    ItemReset {
        checklist_id: String,
        item_id: String,
        timestamp: DateTime<Utc>,
    },

    /// A submitted update was rejected (blocked, invalid transition, ...)
    UpdateRejected {
        checklist_id: String,
        item_id: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// Category transitioned from incomplete to complete
    CategoryCompleted {
        checklist_id: String,
        category_id: String,
        timestamp: DateTime<Utc>,
    },

    /// Category transitioned from complete back to incomplete
    CategoryReopened {
        checklist_id: String,
        category_id: String,
        timestamp: DateTime<Utc>,
    },

    /// One extraction attempt finished inside a channel session
    ChannelAttempt {
        session_id: Uuid,
        /// Attempt number (1-based)
        attempt: u32,
        /// Confidence of the extraction, None if the attempt failed
        confidence: Option<f32>,
        accepted: bool,
        timestamp: DateTime<Utc>,
    },

    /// Channel session produced its final outcome for an input
    ChannelFinished {
        session_id: Uuid,
        outcome: ChannelOutcome,
        attempts: u32,
        timestamp: DateTime<Utc>,
    },
}

impl PreflightEvent {
    /// Event type name (matches the serde tag)
    pub fn event_type(&self) -> &str {
        match self {
            PreflightEvent::ItemUpdated { .. } => "ItemUpdated",
            PreflightEvent::ItemUnblocked { .. } => "ItemUnblocked",
            PreflightEvent::ItemBlocked { .. } => "ItemBlocked",
            PreflightEvent::ItemReset { .. } => "ItemReset",
            PreflightEvent::UpdateRejected { .. } => "UpdateRejected",
            PreflightEvent::CategoryCompleted { .. } => "CategoryCompleted",
            PreflightEvent::CategoryReopened { .. } => "CategoryReopened",
            PreflightEvent::ChannelAttempt { .. } => "ChannelAttempt",
            PreflightEvent::ChannelFinished { .. } => "ChannelFinished",
        }
    }
}

// ========================================
// EventBus Implementation
// ========================================

/// Central event distribution bus
///
/// The EventBus uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use preflight_common::events::{EventBus, PreflightEvent};
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(PreflightEvent::CategoryCompleted {
///     checklist_id: "pre-departure".to_string(),
///     category_id: "engine".to_string(),
///     timestamp: chrono::Utc::now(),
/// });
///
/// let event = rx.try_recv().unwrap();
/// assert_eq!(event.event_type(), "CategoryCompleted");
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PreflightEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<PreflightEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: PreflightEvent,
    ) -> Result<usize, broadcast::error::SendError<PreflightEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: PreflightEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
