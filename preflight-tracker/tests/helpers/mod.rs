//! Shared test utilities: checklist builders and scripted channel collaborators

#![allow(dead_code)]

use preflight_common::config::NoiseReductionLevel;
use preflight_common::events::{EventBus, PreflightEvent};
use preflight_tracker::models::{
    Category, Checklist, ChecklistItem, ChecklistMetadata, CompletionRule, ProgressUpdate,
    ProposedStatus, VerificationMethod,
};
use preflight_tracker::{
    AudioInput, ChannelInput, ChecklistTracker, Extraction, MemoryStore, NoiseReducer,
    ServiceError, SpeechExtractor,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Checklist builders
// ============================================================================

pub fn item(id: &str, category: &str, deps: &[&str]) -> ChecklistItem {
    ChecklistItem {
        id: id.to_string(),
        category: category.to_string(),
        description: String::new(),
        required: true,
        dependencies: deps.iter().map(|d| d.to_string()).collect(),
        verification: vec![
            VerificationMethod::Manual,
            VerificationMethod::Photo,
            VerificationMethod::AiAssisted,
        ],
        ai_prompts: vec![],
    }
}

/// Checklist whose categories list their items in the given order
pub fn checklist(id: &str, categories: Vec<(&str, CompletionRule, Vec<ChecklistItem>)>) -> Checklist {
    let mut all_items = Vec::new();
    let mut all_categories = Vec::new();
    for (category_id, rule, items) in categories {
        all_categories.push(Category {
            id: category_id.to_string(),
            name: category_id.to_string(),
            items: items.iter().map(|i| i.id.clone()).collect(),
            rule,
        });
        all_items.extend(items);
    }
    Checklist {
        id: id.to_string(),
        name: id.to_string(),
        categories: all_categories,
        items: all_items,
        metadata: ChecklistMetadata::default(),
    }
}

/// A depends on B, both in category "main"
pub fn two_step(id: &str) -> Checklist {
    checklist(
        id,
        vec![(
            "main",
            CompletionRule::AllRequired,
            vec![item("A", "main", &["B"]), item("B", "main", &[])],
        )],
    )
}

pub fn manual(item_id: &str, status: ProposedStatus) -> ProgressUpdate {
    ProgressUpdate::new(item_id, status, VerificationMethod::Manual)
}

pub async fn tracker_with(store: Arc<MemoryStore>, list: Checklist) -> ChecklistTracker {
    let tracker = ChecklistTracker::new(store, EventBus::new(256));
    tracker.register_checklist(list).await.unwrap();
    tracker
}

/// Drain every event currently buffered on `rx`
pub fn drain(rx: &mut broadcast::Receiver<PreflightEvent>) -> Vec<PreflightEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn count(events: &[PreflightEvent], event_type: &str) -> usize {
    events.iter().filter(|e| e.event_type() == event_type).count()
}

// ============================================================================
// Channel collaborators
// ============================================================================

pub fn audio() -> ChannelInput {
    ChannelInput::Audio(AudioInput {
        samples: vec![0.01; 160],
        sample_rate: 16_000,
        num_channels: 1,
    })
}

/// Returns its input unchanged, recording the requested levels
#[derive(Default)]
pub struct RecordingReducer {
    pub levels: Mutex<Vec<NoiseReductionLevel>>,
}

#[async_trait::async_trait]
impl NoiseReducer for RecordingReducer {
    async fn reduce_noise(
        &self,
        input: &AudioInput,
        level: NoiseReductionLevel,
    ) -> Result<AudioInput, ServiceError> {
        self.levels.lock().unwrap().push(level);
        Ok(input.clone())
    }
}

pub enum Step {
    Score(f32),
    Fail,
    /// Never answers within any reasonable timeout
    Hang,
}

/// Extractor replaying a fixed script; score 0.0 once the script runs out
#[derive(Default)]
pub struct ScriptedExtractor {
    script: Mutex<VecDeque<Step>>,
    calls: AtomicUsize,
    cancel_at: Mutex<Option<(usize, CancellationToken)>>,
}

impl ScriptedExtractor {
    pub fn new(script: Vec<Step>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            ..Default::default()
        }
    }

    pub fn scores(scores: &[f32]) -> Self {
        Self::new(scores.iter().map(|&s| Step::Score(s)).collect())
    }

    /// Cancel `token` while serving call number `call` (1-based)
    pub fn cancel_during(&self, call: usize, token: CancellationToken) {
        *self.cancel_at.lock().unwrap() = Some((call, token));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl SpeechExtractor for ScriptedExtractor {
    async fn extract(&self, _input: &AudioInput) -> Result<Extraction, ServiceError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((at, token)) = self.cancel_at.lock().unwrap().as_ref() {
            if *at == call {
                token.cancel();
            }
        }

        let step = self.script.lock().unwrap().pop_front().unwrap_or(Step::Score(0.0));
        match step {
            Step::Score(confidence) => Ok(Extraction {
                text: format!("transcript {}", call),
                confidence,
            }),
            Step::Fail => Err(ServiceError::Unavailable("recognizer offline".to_string())),
            Step::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(ServiceError::Failed("unreachable".to_string()))
            }
        }
    }
}
