//! Checklist tracker service
//!
//! Entry point for callers: validate items, submit updates (typed or through
//! a channel session), reset items and poll progress.
//!
//! # Concurrency
//!
//! Each checklist has its own `RwLock`. Updates hold the write lock from the
//! gate check through persistence and event emission, so updates to the same
//! checklist are serialized and readers only see post-propagation state.
//! Different checklists never contend beyond the brief registry lookup.
//!
//! Propagation runs on a copy of the graph which replaces the live graph only
//! once persistence succeeded; a failed store call leaves the checklist as it
//! was before the update.

use crate::category::{self, CategoryState};
use crate::channel::{ChannelInput, ChannelSession};
use crate::error::{TrackerError, TrackerResult, TransitionError};
use crate::graph::{DependencyGraph, NodeStatus, Validation};
use crate::models::{
    Checklist, ContextualPrompt, DefaultPromptSelector, ItemStatus, ProgressUpdate, PromptContext,
    PromptSelector, PromptType, ProposedStatus, VerificationMethod,
};
use crate::propagator::{CategoryTransition, CompletionPropagator, ResetReport};
use crate::state_machine::ProgressStateMachine;
use crate::store::ProgressStore;
use chrono::{DateTime, Utc};
use preflight_common::events::{EventBus, PreflightEvent};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, info, warn};

/// Why an update was refused
///
/// Returned to the immediate caller; never retried by the tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Rejection {
    DependencyBlocked {
        blockers: Vec<String>,
        suggestions: Vec<ContextualPrompt>,
    },
    InvalidTransition {
        from: ItemStatus,
        to: ItemStatus,
    },
    VerificationMismatch {
        method: VerificationMethod,
        accepted: Vec<VerificationMethod>,
        hint: ContextualPrompt,
    },
    MissingEvidence {
        prompt: ContextualPrompt,
    },
    ConfirmationRequired {
        prompt: ContextualPrompt,
    },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::DependencyBlocked { blockers, .. } => {
                write!(f, "blocked by {}", blockers.join(", "))
            }
            Rejection::InvalidTransition { from, to } => {
                write!(f, "transition {} -> {} is not allowed", from, to)
            }
            Rejection::VerificationMismatch { method, .. } => {
                write!(f, "{} verification is not accepted", method)
            }
            Rejection::MissingEvidence { .. } => write!(f, "photo evidence is missing"),
            Rejection::ConfirmationRequired { .. } => write!(f, "confirmation required"),
        }
    }
}

/// Result of [`ChecklistTracker::submit_update`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SubmitOutcome {
    Applied {
        item_id: String,
        status: ItemStatus,
        newly_unblocked: Vec<String>,
        category: Option<CategoryState>,
        category_completed: bool,
    },
    /// Re-submission of an update already in effect; nothing changed
    AlreadyApplied {
        item_id: String,
        category: Option<CategoryState>,
    },
    Rejected {
        item_id: String,
        rejection: Rejection,
    },
}

impl SubmitOutcome {
    /// Whether the update is in effect (newly applied or already applied)
    pub fn accepted(&self) -> bool {
        !matches!(self, SubmitOutcome::Rejected { .. })
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            SubmitOutcome::Rejected { rejection, .. } => Some(rejection),
            _ => None,
        }
    }

    /// Owning category state after the update
    pub fn category_state(&self) -> Option<&CategoryState> {
        match self {
            SubmitOutcome::Applied { category, .. } | SubmitOutcome::AlreadyApplied { category, .. } => {
                category.as_ref()
            }
            SubmitOutcome::Rejected { .. } => None,
        }
    }
}

/// Per-item line of a progress snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemProgress {
    pub item_id: String,
    pub category: String,
    pub required: bool,
    pub status: ItemStatus,
    pub gate: NodeStatus,
    pub blockers: Vec<String>,
}

/// Consistent view of one checklist for dashboard polling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub checklist_id: String,
    pub categories: Vec<CategoryState>,
    /// Items in dependency order
    pub items: Vec<ItemProgress>,
    pub completed_items: usize,
    pub total_items: usize,
    /// Completed items as a percentage of all items (0-100)
    pub percentage: f32,
    /// Every category complete
    pub complete: bool,
    pub generated_at: DateTime<Utc>,
}

struct ChecklistState {
    checklist: Checklist,
    graph: DependencyGraph,
}

type SharedState = Arc<RwLock<ChecklistState>>;

pub struct ChecklistTracker {
    store: Arc<dyn ProgressStore>,
    event_bus: EventBus,
    prompts: Arc<dyn PromptSelector>,
    state_machine: ProgressStateMachine,
    propagator: CompletionPropagator,
    checklists: Mutex<HashMap<String, SharedState>>,
}

impl ChecklistTracker {
    pub fn new(store: Arc<dyn ProgressStore>, event_bus: EventBus) -> Self {
        Self {
            store,
            event_bus,
            prompts: Arc::new(DefaultPromptSelector),
            state_machine: ProgressStateMachine::new(),
            propagator: CompletionPropagator::new(),
            checklists: Mutex::new(HashMap::new()),
        }
    }

    /// Use `prompts` for suggestion and confirmation wording
    pub fn with_prompt_selector(mut self, prompts: Arc<dyn PromptSelector>) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PreflightEvent> {
        self.event_bus.subscribe()
    }

    /// Validate, persist and start tracking a checklist
    ///
    /// Any previously persisted graph state for the same id is restored.
    /// Re-registering a tracked checklist updates the live entry in place, so
    /// callers holding it keep seeing one state.
    pub async fn register_checklist(&self, checklist: Checklist) -> TrackerResult<()> {
        let checklist_id = checklist.id.clone();
        let mut registry = self.checklists.lock().await;

        let items = match registry.get(&checklist_id).cloned() {
            Some(shared) => {
                drop(registry);
                // Pending writers finish first; their graph state is restored below
                let mut guard = shared.write().await;
                let state = self.build_state(checklist).await?;
                self.store.save_checklist(&state.checklist).await?;
                let items = state.graph.len();
                *guard = state;
                items
            }
            None => {
                let state = self.build_state(checklist).await?;
                self.store.save_checklist(&state.checklist).await?;
                let items = state.graph.len();
                registry.insert(checklist_id.clone(), Arc::new(RwLock::new(state)));
                items
            }
        };

        info!(checklist_id = %checklist_id, items = items, "Checklist registered");
        Ok(())
    }

    /// Current checklist definition
    pub async fn checklist(&self, checklist_id: &str) -> TrackerResult<Checklist> {
        let state = self.state(checklist_id).await?;
        let guard = state.read().await;
        Ok(guard.checklist.clone())
    }

    /// Can `item_id` proceed? Unknown items may always proceed.
    pub async fn validate(&self, checklist_id: &str, item_id: &str) -> TrackerResult<Validation> {
        let state = self.state(checklist_id).await?;
        let guard = state.read().await;
        Ok(guard.graph.validate_with(item_id, self.prompts.as_ref()))
    }

    /// Gate, validate and apply a progress update
    pub async fn submit_update(
        &self,
        checklist_id: &str,
        update: ProgressUpdate,
    ) -> TrackerResult<SubmitOutcome> {
        let state = self.state(checklist_id).await?;
        let mut guard = state.write().await;
        let ChecklistState { checklist, graph } = &mut *guard;
        let checklist = &*checklist;

        let item = graph
            .item(checklist, &update.item_id)
            .ok_or_else(|| TrackerError::UnknownItem {
                checklist_id: checklist_id.to_string(),
                item_id: update.item_id.clone(),
            })?;

        if CompletionPropagator::is_already_applied(graph, &update) {
            debug!(
                checklist_id = %checklist_id,
                item_id = %update.item_id,
                update_id = %update.id,
                "Update already applied"
            );
            return Ok(SubmitOutcome::AlreadyApplied {
                item_id: update.item_id,
                category: checklist
                    .category_of(&item.id)
                    .map(|c| category::evaluate(c, checklist, graph)),
            });
        }

        let gate = graph.validate_with(&update.item_id, self.prompts.as_ref());
        if !gate.can_proceed {
            let rejection = Rejection::DependencyBlocked {
                blockers: gate.blockers,
                suggestions: gate.suggestions,
            };
            return Ok(self.reject(checklist_id, update.item_id, rejection));
        }

        let current = graph.item_status(&update.item_id).unwrap_or(ItemStatus::Pending);
        let transition = match self.state_machine.validate_update(item, &update, current) {
            Ok(transition) => transition,
            Err(e) => {
                let rejection = self.rejection_for(e, checklist, &update);
                return Ok(self.reject(checklist_id, update.item_id, rejection));
            }
        };

        let mut next = graph.clone();
        let report = self
            .propagator
            .on_accepted(&mut next, checklist, &update, &transition);

        // Graph state first: the log is keyed by update id, so a retry after a
        // failed log write converges instead of duplicating.
        self.store
            .save_graph_state(checklist_id, &next.snapshot())
            .await?;
        self.store.save_progress(checklist_id, &update).await?;
        *graph = next;

        info!(
            checklist_id = %checklist_id,
            item_id = %update.item_id,
            from = %transition.from,
            to = %transition.to,
            method = %update.verification_method,
            "Progress update applied"
        );

        let now = Utc::now();
        self.event_bus.emit_lossy(PreflightEvent::ItemUpdated {
            checklist_id: checklist_id.to_string(),
            item_id: update.item_id.clone(),
            old_status: transition.from,
            new_status: transition.to,
            timestamp: now,
        });
        for unblocked in &report.newly_unblocked {
            self.event_bus.emit_lossy(PreflightEvent::ItemUnblocked {
                checklist_id: checklist_id.to_string(),
                item_id: unblocked.clone(),
                unblocked_by: update.item_id.clone(),
                timestamp: now,
            });
        }
        let category_completed = report.category_transition == Some(CategoryTransition::Completed);
        if let (true, Some(state)) = (category_completed, &report.category) {
            self.event_bus.emit_lossy(PreflightEvent::CategoryCompleted {
                checklist_id: checklist_id.to_string(),
                category_id: state.category_id.clone(),
                timestamp: now,
            });
        }

        Ok(SubmitOutcome::Applied {
            item_id: report.item_id,
            status: report.new_status,
            newly_unblocked: report.newly_unblocked,
            category: report.category,
            category_completed,
        })
    }

    /// Normalize `input` through a channel session and submit the transcript
    /// as an AI-assisted update
    ///
    /// The gate is checked first so a blocked item never consumes channel
    /// attempts. Set `confirmed` when the operator explicitly confirmed the
    /// completion.
    pub async fn submit_input(
        &self,
        checklist_id: &str,
        item_id: &str,
        status: ProposedStatus,
        input: &ChannelInput,
        session: &mut ChannelSession,
        confirmed: bool,
    ) -> TrackerResult<SubmitOutcome> {
        let gate = {
            let state = self.state(checklist_id).await?;
            let guard = state.read().await;
            if !guard.graph.contains(item_id) {
                return Err(TrackerError::UnknownItem {
                    checklist_id: checklist_id.to_string(),
                    item_id: item_id.to_string(),
                });
            }
            guard.graph.validate_with(item_id, self.prompts.as_ref())
        };
        if !gate.can_proceed {
            let rejection = Rejection::DependencyBlocked {
                blockers: gate.blockers,
                suggestions: gate.suggestions,
            };
            return Ok(self.reject(checklist_id, item_id.to_string(), rejection));
        }

        let transcript = session.attempt(input).await?;
        debug!(
            checklist_id = %checklist_id,
            item_id = %item_id,
            confidence = transcript.confidence,
            audio = input.is_audio(),
            "Channel input accepted"
        );

        let mut update = ProgressUpdate::new(item_id, status, VerificationMethod::AiAssisted)
            .with_note(transcript.text);
        update.confirmed = confirmed;

        self.submit_update(checklist_id, update).await
    }

    /// Return an item to `pending`, re-blocking dependents and reopening its
    /// category if needed
    pub async fn reset_item(&self, checklist_id: &str, item_id: &str) -> TrackerResult<ResetReport> {
        let state = self.state(checklist_id).await?;
        let mut guard = state.write().await;
        let ChecklistState { checklist, graph } = &mut *guard;
        let checklist = &*checklist;

        if !graph.contains(item_id) {
            return Err(TrackerError::UnknownItem {
                checklist_id: checklist_id.to_string(),
                item_id: item_id.to_string(),
            });
        }

        let mut next = graph.clone();
        let report = self.propagator.on_reset(&mut next, checklist, item_id);

        self.store
            .save_graph_state(checklist_id, &next.snapshot())
            .await?;
        *graph = next;

        let now = Utc::now();
        self.event_bus.emit_lossy(PreflightEvent::ItemReset {
            checklist_id: checklist_id.to_string(),
            item_id: item_id.to_string(),
            timestamp: now,
        });
        for blocked in &report.reblocked {
            self.event_bus.emit_lossy(PreflightEvent::ItemBlocked {
                checklist_id: checklist_id.to_string(),
                item_id: blocked.clone(),
                blocked_by: vec![item_id.to_string()],
                timestamp: now,
            });
        }
        if let (Some(CategoryTransition::Reopened), Some(state)) =
            (report.category_transition, &report.category)
        {
            self.event_bus.emit_lossy(PreflightEvent::CategoryReopened {
                checklist_id: checklist_id.to_string(),
                category_id: state.category_id.clone(),
                timestamp: now,
            });
        }

        Ok(report)
    }

    /// Snapshot of the checklist for dashboard polling
    pub async fn progress(&self, checklist_id: &str) -> TrackerResult<ProgressSnapshot> {
        let state = self.state(checklist_id).await?;
        let guard = state.read().await;
        let ChecklistState { checklist, graph } = &*guard;

        let categories = category::evaluate_all(checklist, graph);

        let items: Vec<ItemProgress> = graph
            .topological_order()
            .into_iter()
            .filter_map(|item_id| {
                let item = graph.item(checklist, item_id)?;
                let node = graph.node(item_id)?;
                Some(ItemProgress {
                    item_id: item.id.clone(),
                    category: item.category.clone(),
                    required: item.required,
                    status: node.item_status(),
                    gate: node.status,
                    blockers: graph.validate_with(item_id, self.prompts.as_ref()).blockers,
                })
            })
            .collect();

        let completed_items = items
            .iter()
            .filter(|i| i.status == ItemStatus::Completed)
            .count();
        let total_items = items.len();
        let percentage = if total_items == 0 {
            100.0
        } else {
            completed_items as f32 / total_items as f32 * 100.0
        };

        Ok(ProgressSnapshot {
            checklist_id: checklist_id.to_string(),
            complete: categories.iter().all(|c| c.complete),
            categories,
            items,
            completed_items,
            total_items,
            percentage,
            generated_at: Utc::now(),
        })
    }

    /// Look up a tracked checklist, loading it from the store on first use
    async fn state(&self, checklist_id: &str) -> TrackerResult<SharedState> {
        if let Some(state) = self.checklists.lock().await.get(checklist_id) {
            return Ok(Arc::clone(state));
        }

        let checklist = self.store.load_checklist(checklist_id).await?;
        let state = self.build_state(checklist).await?;
        debug!(checklist_id = %checklist_id, "Checklist loaded from store");

        // Another task may have loaded it while the registry was unlocked
        let mut registry = self.checklists.lock().await;
        let entry = registry
            .entry(checklist_id.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(state)));
        Ok(Arc::clone(entry))
    }

    async fn build_state(&self, checklist: Checklist) -> TrackerResult<ChecklistState> {
        let config_error = |source| TrackerError::GraphConfiguration {
            checklist_id: checklist.id.clone(),
            source,
        };

        checklist.validate().map_err(config_error)?;
        let mut graph = DependencyGraph::build(&checklist).map_err(config_error)?;

        let saved = self.store.load_graph_state(&checklist.id).await?;
        if !saved.is_empty() {
            graph.restore(saved);
        }

        Ok(ChecklistState { checklist, graph })
    }

    fn rejection_for(
        &self,
        error: TransitionError,
        checklist: &Checklist,
        update: &ProgressUpdate,
    ) -> Rejection {
        match error {
            TransitionError::InvalidTransition { from, to, .. } => {
                Rejection::InvalidTransition { from, to }
            }
            TransitionError::VerificationMismatch { item, method } => {
                let message = self.prompt_text(PromptType::Educational, checklist, &item);
                Rejection::VerificationMismatch {
                    method,
                    accepted: checklist
                        .item(&update.item_id)
                        .map(|i| i.verification.clone())
                        .unwrap_or_default(),
                    hint: ContextualPrompt::educational(&item, message),
                }
            }
            TransitionError::MissingEvidence { item } => {
                let message = self.prompt_text(PromptType::Safety, checklist, &item);
                Rejection::MissingEvidence {
                    prompt: ContextualPrompt::safety(&item, message),
                }
            }
            TransitionError::ConfirmationRequired { item } => {
                let message = self.prompt_text(PromptType::Confirmation, checklist, &item);
                Rejection::ConfirmationRequired {
                    prompt: ContextualPrompt::confirmation(&item, message),
                }
            }
        }
    }

    /// Prompt wording about `item_id` itself
    fn prompt_text(&self, prompt_type: PromptType, checklist: &Checklist, item_id: &str) -> String {
        let description = checklist
            .item(item_id)
            .map(|i| i.description.clone())
            .filter(|d| !d.is_empty());
        self.prompts.select_prompt(&PromptContext {
            prompt_type,
            item_id: item_id.to_string(),
            description,
            requested_item: item_id.to_string(),
        })
    }

    fn reject(&self, checklist_id: &str, item_id: String, rejection: Rejection) -> SubmitOutcome {
        warn!(
            checklist_id = %checklist_id,
            item_id = %item_id,
            reason = %rejection,
            "Progress update rejected"
        );
        self.event_bus.emit_lossy(PreflightEvent::UpdateRejected {
            checklist_id: checklist_id.to_string(),
            item_id: item_id.clone(),
            reason: rejection.to_string(),
            timestamp: Utc::now(),
        });
        SubmitOutcome::Rejected { item_id, rejection }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, ChecklistItem, ChecklistMetadata, CompletionRule};
    use crate::store::MemoryStore;

    fn checklist() -> Checklist {
        let item = |id: &str, deps: &[&str], verification: Vec<VerificationMethod>| ChecklistItem {
            id: id.to_string(),
            category: "engine".to_string(),
            description: format!("Check {}", id),
            required: true,
            dependencies: deps.iter().map(|s| s.to_string()).collect(),
            verification,
            ai_prompts: vec![],
        };
        Checklist {
            id: "engine-start".to_string(),
            name: "Engine start".to_string(),
            categories: vec![Category {
                id: "engine".to_string(),
                name: "Engine".to_string(),
                items: vec!["fuel".to_string(), "start".to_string()],
                rule: CompletionRule::AllRequired,
            }],
            items: vec![
                item("fuel", &[], vec![VerificationMethod::Manual, VerificationMethod::AiAssisted]),
                item("start", &["fuel"], vec![VerificationMethod::Manual]),
            ],
            metadata: ChecklistMetadata::default(),
        }
    }

    async fn tracker() -> ChecklistTracker {
        let tracker = ChecklistTracker::new(Arc::new(MemoryStore::new()), EventBus::new(100));
        tracker.register_checklist(checklist()).await.unwrap();
        tracker
    }

    #[tokio::test]
    async fn test_unknown_checklist_is_store_error() {
        let tracker = tracker().await;
        let err = tracker.validate("nope", "fuel").await.unwrap_err();
        assert!(matches!(err, TrackerError::Store(preflight_common::Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_reregistration_keeps_live_entry_and_progress() {
        let tracker = tracker().await;
        let before = tracker.state("engine-start").await.unwrap();
        let update = ProgressUpdate::new("fuel", ProposedStatus::Completed, VerificationMethod::Manual);
        tracker.submit_update("engine-start", update).await.unwrap();

        let mut revised = checklist();
        revised.name = "Engine start (revised)".to_string();
        tracker.register_checklist(revised).await.unwrap();

        let after = tracker.state("engine-start").await.unwrap();
        assert!(Arc::ptr_eq(&before, &after));
        assert_eq!(before.read().await.checklist.name, "Engine start (revised)");

        let snapshot = tracker.progress("engine-start").await.unwrap();
        assert_eq!(snapshot.completed_items, 1);
        assert!(tracker.validate("engine-start", "start").await.unwrap().can_proceed);
    }

    #[tokio::test]
    async fn test_unknown_item_update_is_error() {
        let tracker = tracker().await;
        let update = ProgressUpdate::new("ghost", ProposedStatus::Completed, VerificationMethod::Manual);
        let err = tracker.submit_update("engine-start", update).await.unwrap_err();
        assert!(matches!(err, TrackerError::UnknownItem { .. }));
    }

    #[tokio::test]
    async fn test_confirmation_rejection_carries_prompt() {
        let tracker = tracker().await;
        let update = ProgressUpdate::new("fuel", ProposedStatus::Completed, VerificationMethod::AiAssisted);

        let outcome = tracker.submit_update("engine-start", update).await.unwrap();
        match outcome.rejection() {
            Some(Rejection::ConfirmationRequired { prompt }) => {
                assert_eq!(prompt.prompt_type, PromptType::Confirmation);
                assert!(prompt.required_response);
                assert_eq!(prompt.message, "Please confirm that Check fuel has been completed.");
            }
            other => panic!("expected confirmation rejection, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_verification_mismatch_lists_accepted_methods() {
        let tracker = tracker().await;
        let update = ProgressUpdate::new("fuel", ProposedStatus::Completed, VerificationMethod::Photo)
            .with_evidence("photos/fuel.jpg");

        let outcome = tracker.submit_update("engine-start", update).await.unwrap();
        match outcome.rejection() {
            Some(Rejection::VerificationMismatch {
                method,
                accepted,
                hint,
            }) => {
                assert_eq!(*method, VerificationMethod::Photo);
                assert_eq!(
                    accepted,
                    &vec![VerificationMethod::Manual, VerificationMethod::AiAssisted]
                );
                assert_eq!(hint.prompt_type, PromptType::Educational);
                assert!(!hint.required_response);
                assert_eq!(hint.dependencies, vec!["fuel".to_string()]);
            }
            other => panic!("expected verification mismatch, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_progress_snapshot() {
        let tracker = tracker().await;
        let update = ProgressUpdate::new("fuel", ProposedStatus::Completed, VerificationMethod::Manual);
        tracker.submit_update("engine-start", update).await.unwrap();

        let snapshot = tracker.progress("engine-start").await.unwrap();
        assert_eq!(snapshot.completed_items, 1);
        assert_eq!(snapshot.total_items, 2);
        assert_eq!(snapshot.percentage, 50.0);
        assert!(!snapshot.complete);
        assert_eq!(snapshot.items[0].item_id, "fuel");
        assert_eq!(snapshot.items[1].gate, NodeStatus::Pending);
        assert!(snapshot.items[1].blockers.is_empty());
    }

    #[tokio::test]
    async fn test_misconfigured_checklist_not_registered() {
        let tracker = ChecklistTracker::new(Arc::new(MemoryStore::new()), EventBus::new(10));
        let mut list = checklist();
        list.items[0].dependencies = vec!["start".to_string()];

        let err = tracker.register_checklist(list).await.unwrap_err();
        assert!(matches!(
            err,
            TrackerError::GraphConfiguration { source: crate::error::GraphConfigError::Cycle { .. }, .. }
        ));
        assert!(tracker.progress("engine-start").await.is_err());
    }
}
