//! Persistence for checklists, applied updates and graph state
//!
//! The tracker only talks to storage through [`ProgressStore`]. Graph state is
//! persisted as the list of [`DependencyNode`]s; on load the gating statuses
//! are recomputed from the stored `last_applied` updates.

pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::MemoryStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

use crate::graph::DependencyNode;
use crate::models::{Checklist, ProgressUpdate};
use preflight_common::Result;

#[async_trait::async_trait]
pub trait ProgressStore: Send + Sync {
    /// Fails with `Error::NotFound` for unknown ids
    async fn load_checklist(&self, checklist_id: &str) -> Result<Checklist>;

    async fn save_checklist(&self, checklist: &Checklist) -> Result<()>;

    /// Append an accepted update to the checklist's progress log
    ///
    /// An update whose id is already logged for the checklist is ignored.
    async fn save_progress(&self, checklist_id: &str, update: &ProgressUpdate) -> Result<()>;

    /// Accepted updates in the order they were saved
    async fn progress_log(&self, checklist_id: &str) -> Result<Vec<ProgressUpdate>>;

    /// Empty when nothing has been saved yet
    async fn load_graph_state(&self, checklist_id: &str) -> Result<Vec<DependencyNode>>;

    async fn save_graph_state(&self, checklist_id: &str, nodes: &[DependencyNode]) -> Result<()>;
}
