//! In-process store

use super::ProgressStore;
use crate::graph::DependencyNode;
use crate::models::{Checklist, ProgressUpdate};
use preflight_common::{Error, Result};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
pub struct MemoryStore {
    checklists: RwLock<HashMap<String, Checklist>>,
    progress: RwLock<HashMap<String, Vec<ProgressUpdate>>>,
    graphs: RwLock<HashMap<String, Vec<DependencyNode>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl ProgressStore for MemoryStore {
    async fn load_checklist(&self, checklist_id: &str) -> Result<Checklist> {
        self.checklists
            .read()
            .await
            .get(checklist_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Checklist {}", checklist_id)))
    }

    async fn save_checklist(&self, checklist: &Checklist) -> Result<()> {
        self.checklists
            .write()
            .await
            .insert(checklist.id.clone(), checklist.clone());
        Ok(())
    }

    async fn save_progress(&self, checklist_id: &str, update: &ProgressUpdate) -> Result<()> {
        let mut progress = self.progress.write().await;
        let log = progress.entry(checklist_id.to_string()).or_default();
        if !log.iter().any(|logged| logged.id == update.id) {
            log.push(update.clone());
        }
        Ok(())
    }

    async fn progress_log(&self, checklist_id: &str) -> Result<Vec<ProgressUpdate>> {
        Ok(self
            .progress
            .read()
            .await
            .get(checklist_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn load_graph_state(&self, checklist_id: &str) -> Result<Vec<DependencyNode>> {
        Ok(self
            .graphs
            .read()
            .await
            .get(checklist_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn save_graph_state(&self, checklist_id: &str, nodes: &[DependencyNode]) -> Result<()> {
        self.graphs
            .write()
            .await
            .insert(checklist_id.to_string(), nodes.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ProposedStatus, VerificationMethod};

    #[tokio::test]
    async fn test_unknown_checklist_not_found() {
        let store = MemoryStore::new();
        let err = store.load_checklist("missing").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_progress_log_keeps_order() {
        let store = MemoryStore::new();
        let a = ProgressUpdate::new("a", ProposedStatus::Completed, VerificationMethod::Manual);
        let b = ProgressUpdate::new("b", ProposedStatus::Skipped, VerificationMethod::Manual);

        store.save_progress("c1", &a).await.unwrap();
        store.save_progress("c1", &b).await.unwrap();

        let log = store.progress_log("c1").await.unwrap();
        assert_eq!(log, vec![a, b]);
        assert!(store.progress_log("c2").await.unwrap().is_empty());
        assert!(store.load_graph_state("c1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_progress_log_ignores_repeated_update_id() {
        let store = MemoryStore::new();
        let a = ProgressUpdate::new("a", ProposedStatus::Completed, VerificationMethod::Manual);

        store.save_progress("c1", &a).await.unwrap();
        store.save_progress("c1", &a).await.unwrap();
        store.save_progress("c2", &a).await.unwrap();

        assert_eq!(store.progress_log("c1").await.unwrap(), vec![a.clone()]);
        assert_eq!(store.progress_log("c2").await.unwrap(), vec![a]);
    }
}
