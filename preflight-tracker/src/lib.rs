//! preflight-tracker - Checklist progress tracking
//!
//! Tracks operator progress through pre-departure checklists:
//! - Dependency gating between items ([`graph`])
//! - Per-item lifecycle rules ([`state_machine`])
//! - Propagation of accepted updates to dependents and categories ([`propagator`])
//! - Confidence-gated voice/text input ([`channel`])
//!
//! [`ChecklistTracker`] ties these together behind a per-checklist lock and
//! persists through a [`ProgressStore`].

pub mod category;
pub mod channel;
pub mod error;
pub mod graph;
pub mod models;
pub mod propagator;
pub mod state_machine;
pub mod store;
pub mod tracker;

pub use channel::{
    AudioInput, ChannelConfig, ChannelInput, ChannelSession, ConfidenceGatedChannel, Extraction,
    NoiseReducer, SessionSummary, SpeechExtractor, TranscriptionAttempt,
};
pub use error::{
    ChannelError, GraphConfigError, ServiceError, TrackerError, TrackerResult, TransitionError,
};
pub use graph::{DependencyGraph, NodeStatus, Validation};
pub use store::{MemoryStore, ProgressStore};
#[cfg(feature = "sqlite")]
pub use store::SqliteStore;
pub use tracker::{ChecklistTracker, ProgressSnapshot, Rejection, SubmitOutcome};
