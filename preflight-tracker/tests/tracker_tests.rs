//! Integration tests for the tracker service: gating, transitions,
//! propagation, idempotence, category completion and reset

mod helpers;

use helpers::*;
use preflight_common::config::NoiseReductionLevel;
use preflight_common::events::{ItemStatus, PreflightEvent};
use preflight_tracker::models::{CompletionRule, ProgressUpdate, ProposedStatus, PromptType, VerificationMethod};
use preflight_tracker::{
    ChannelConfig, ChannelError, ChannelInput, ConfidenceGatedChannel, MemoryStore, NodeStatus,
    ProgressStore, Rejection, SubmitOutcome, TrackerError,
};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Dependency gating
// ============================================================================

#[tokio::test]
async fn test_dependency_scenario() {
    let tracker = tracker_with(Arc::new(MemoryStore::new()), two_step("pre")).await;

    let v = tracker.validate("pre", "A").await.unwrap();
    assert!(!v.can_proceed);
    assert_eq!(v.blockers, vec!["B".to_string()]);
    assert_eq!(v.suggestions.len(), 1);
    assert_eq!(v.suggestions[0].prompt_type, PromptType::Dependency);
    assert_eq!(v.suggestions[0].dependencies, vec!["B".to_string()]);

    let outcome = tracker
        .submit_update("pre", manual("A", ProposedStatus::Completed))
        .await
        .unwrap();
    assert!(!outcome.accepted());
    assert!(matches!(
        outcome.rejection(),
        Some(Rejection::DependencyBlocked { blockers, .. }) if blockers == &vec!["B".to_string()]
    ));

    let outcome = tracker
        .submit_update("pre", manual("B", ProposedStatus::Completed))
        .await
        .unwrap();
    match outcome {
        SubmitOutcome::Applied { newly_unblocked, status, .. } => {
            assert_eq!(status, ItemStatus::Completed);
            assert_eq!(newly_unblocked, vec!["A".to_string()]);
        }
        other => panic!("expected applied update, got {:?}", other),
    }

    let v = tracker.validate("pre", "A").await.unwrap();
    assert!(v.can_proceed);
    assert!(v.blockers.is_empty());

    let outcome = tracker
        .submit_update("pre", manual("A", ProposedStatus::Completed))
        .await
        .unwrap();
    assert!(outcome.accepted());
    assert!(outcome.category_state().unwrap().complete);
}

#[tokio::test]
async fn test_unknown_item_validates_permissively() {
    let tracker = tracker_with(Arc::new(MemoryStore::new()), two_step("pre")).await;

    let v = tracker.validate("pre", "not-an-item").await.unwrap();
    assert!(v.can_proceed);
    assert!(v.blockers.is_empty());
}

#[tokio::test]
async fn test_skip_of_blocked_item_is_gated() {
    let tracker = tracker_with(Arc::new(MemoryStore::new()), two_step("pre")).await;

    let outcome = tracker
        .submit_update("pre", manual("A", ProposedStatus::Skipped))
        .await
        .unwrap();
    assert!(matches!(outcome.rejection(), Some(Rejection::DependencyBlocked { .. })));
}

#[tokio::test]
async fn test_skipped_dependency_keeps_dependent_blocked() {
    let tracker = tracker_with(Arc::new(MemoryStore::new()), two_step("pre")).await;

    tracker
        .submit_update("pre", manual("B", ProposedStatus::Skipped))
        .await
        .unwrap();

    let v = tracker.validate("pre", "A").await.unwrap();
    assert!(!v.can_proceed);
    assert_eq!(v.blockers, vec!["B".to_string()]);
}

// ============================================================================
// Transitions
// ============================================================================

#[tokio::test]
async fn test_flagged_item_can_complete() {
    let tracker = tracker_with(Arc::new(MemoryStore::new()), two_step("pre")).await;

    let flagged = tracker
        .submit_update(
            "pre",
            manual("B", ProposedStatus::Flagged).with_note("needs supervisor review"),
        )
        .await
        .unwrap();
    assert!(flagged.accepted());

    let snapshot = tracker.progress("pre").await.unwrap();
    let b = snapshot.items.iter().find(|i| i.item_id == "B").unwrap();
    assert_eq!(b.status, ItemStatus::Flagged);

    let completed = tracker
        .submit_update("pre", manual("B", ProposedStatus::Completed))
        .await
        .unwrap();
    assert!(completed.accepted());
}

#[tokio::test]
async fn test_completed_item_cannot_regress() {
    let tracker = tracker_with(Arc::new(MemoryStore::new()), two_step("pre")).await;

    tracker
        .submit_update("pre", manual("B", ProposedStatus::Completed))
        .await
        .unwrap();
    let outcome = tracker
        .submit_update("pre", manual("B", ProposedStatus::Flagged))
        .await
        .unwrap();

    assert_eq!(
        outcome.rejection(),
        Some(&Rejection::InvalidTransition {
            from: ItemStatus::Completed,
            to: ItemStatus::Flagged,
        })
    );
}

#[tokio::test]
async fn test_photo_without_evidence_rejected() {
    let tracker = tracker_with(Arc::new(MemoryStore::new()), two_step("pre")).await;

    let update = ProgressUpdate::new("B", ProposedStatus::Completed, VerificationMethod::Photo);
    let outcome = tracker.submit_update("pre", update).await.unwrap();
    match outcome.rejection() {
        Some(Rejection::MissingEvidence { prompt }) => {
            assert_eq!(prompt.prompt_type, PromptType::Safety);
            assert!(prompt.required_response);
            assert_eq!(prompt.dependencies, vec!["B".to_string()]);
        }
        other => panic!("expected missing evidence, got {:?}", other),
    }

    let update = ProgressUpdate::new("B", ProposedStatus::Completed, VerificationMethod::Photo)
        .with_evidence("photos/b.jpg");
    assert!(tracker.submit_update("pre", update).await.unwrap().accepted());
}

#[tokio::test]
async fn test_unknown_checklist_and_item() {
    let tracker = tracker_with(Arc::new(MemoryStore::new()), two_step("pre")).await;

    assert!(matches!(
        tracker.progress("missing").await,
        Err(TrackerError::Store(preflight_common::Error::NotFound(_)))
    ));
    assert!(matches!(
        tracker
            .submit_update("pre", manual("Z", ProposedStatus::Completed))
            .await,
        Err(TrackerError::UnknownItem { .. })
    ));
}

// ============================================================================
// Idempotence
// ============================================================================

#[tokio::test]
async fn test_same_update_twice_applies_once() {
    let store = Arc::new(MemoryStore::new());
    let tracker = tracker_with(Arc::clone(&store), two_step("pre")).await;
    let mut rx = tracker.subscribe();

    let update = manual("B", ProposedStatus::Completed);
    let first = tracker.submit_update("pre", update.clone()).await.unwrap();
    let second = tracker.submit_update("pre", update).await.unwrap();

    assert!(matches!(first, SubmitOutcome::Applied { .. }));
    assert!(matches!(second, SubmitOutcome::AlreadyApplied { .. }));
    assert!(second.accepted());

    let events = drain(&mut rx);
    assert_eq!(count(&events, "ItemUpdated"), 1);
    assert_eq!(count(&events, "ItemUnblocked"), 1);
    assert_eq!(store.progress_log("pre").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_resubmission_with_new_id_is_recognized() {
    let tracker = tracker_with(Arc::new(MemoryStore::new()), two_step("pre")).await;

    let update = manual("B", ProposedStatus::Completed);
    let mut retry = update.clone();
    retry.id = uuid::Uuid::new_v4();

    tracker.submit_update("pre", update).await.unwrap();
    let outcome = tracker.submit_update("pre", retry).await.unwrap();
    assert!(matches!(outcome, SubmitOutcome::AlreadyApplied { .. }));
}

// ============================================================================
// Category completion and reset
// ============================================================================

fn pair(rule: CompletionRule) -> preflight_tracker::models::Checklist {
    checklist(
        "pair",
        vec![("deck", rule, vec![item("X", "deck", &[]), item("Y", "deck", &[])])],
    )
}

#[tokio::test]
async fn test_skipped_required_item_leaves_category_incomplete() {
    let tracker = tracker_with(Arc::new(MemoryStore::new()), pair(CompletionRule::AllRequired)).await;
    let mut rx = tracker.subscribe();

    tracker
        .submit_update("pair", manual("X", ProposedStatus::Completed))
        .await
        .unwrap();
    let outcome = tracker
        .submit_update("pair", manual("Y", ProposedStatus::Skipped))
        .await
        .unwrap();

    assert!(!outcome.category_state().unwrap().complete);
    assert_eq!(count(&drain(&mut rx), "CategoryCompleted"), 0);
    assert!(!tracker.progress("pair").await.unwrap().complete);
}

#[tokio::test]
async fn test_category_completes_then_reopens_on_reset() {
    let tracker = tracker_with(Arc::new(MemoryStore::new()), pair(CompletionRule::AllRequired)).await;
    let mut rx = tracker.subscribe();

    tracker
        .submit_update("pair", manual("X", ProposedStatus::Completed))
        .await
        .unwrap();
    let outcome = tracker
        .submit_update("pair", manual("Y", ProposedStatus::Completed))
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        SubmitOutcome::Applied { category_completed: true, .. }
    ));
    assert!(tracker.progress("pair").await.unwrap().complete);

    let report = tracker.reset_item("pair", "X").await.unwrap();
    assert_eq!(report.previous_status, ItemStatus::Completed);
    assert!(!report.category.unwrap().complete);

    let snapshot = tracker.progress("pair").await.unwrap();
    assert!(!snapshot.complete);
    assert_eq!(snapshot.completed_items, 1);

    let events = drain(&mut rx);
    assert_eq!(count(&events, "CategoryCompleted"), 1);
    assert_eq!(count(&events, "ItemReset"), 1);
    assert_eq!(count(&events, "CategoryReopened"), 1);
}

#[tokio::test]
async fn test_reset_reblocks_dependent() {
    let tracker = tracker_with(Arc::new(MemoryStore::new()), two_step("pre")).await;
    let mut rx = tracker.subscribe();

    tracker
        .submit_update("pre", manual("B", ProposedStatus::Completed))
        .await
        .unwrap();
    let report = tracker.reset_item("pre", "B").await.unwrap();
    assert_eq!(report.reblocked, vec!["A".to_string()]);

    let v = tracker.validate("pre", "A").await.unwrap();
    assert!(!v.can_proceed);

    let events = drain(&mut rx);
    assert!(events.iter().any(|e| matches!(
        e,
        PreflightEvent::ItemBlocked { item_id, blocked_by, .. }
            if item_id == "A" && blocked_by == &vec!["B".to_string()]
    )));

    // The item can be completed again after a reset
    let again = tracker
        .submit_update("pre", manual("B", ProposedStatus::Completed))
        .await
        .unwrap();
    assert!(matches!(again, SubmitOutcome::Applied { .. }));
}

#[tokio::test]
async fn test_reset_unknown_item_is_error() {
    let tracker = tracker_with(Arc::new(MemoryStore::new()), two_step("pre")).await;
    assert!(matches!(
        tracker.reset_item("pre", "nope").await,
        Err(TrackerError::UnknownItem { .. })
    ));
}

#[tokio::test]
async fn test_quorum_category() {
    let list = checklist(
        "quorum",
        vec![(
            "safety",
            CompletionRule::Quorum { minimum: 2 },
            vec![
                {
                    let mut i = item("vest", "safety", &[]);
                    i.required = false;
                    i
                },
                {
                    let mut i = item("flare", "safety", &[]);
                    i.required = false;
                    i
                },
                {
                    let mut i = item("horn", "safety", &[]);
                    i.required = false;
                    i
                },
            ],
        )],
    );
    let tracker = tracker_with(Arc::new(MemoryStore::new()), list).await;

    tracker
        .submit_update("quorum", manual("vest", ProposedStatus::Completed))
        .await
        .unwrap();
    let outcome = tracker
        .submit_update("quorum", manual("horn", ProposedStatus::Completed))
        .await
        .unwrap();
    assert!(outcome.category_state().unwrap().complete);
}

// ============================================================================
// Events and snapshot
// ============================================================================

#[tokio::test]
async fn test_event_order_after_completion() {
    let tracker = tracker_with(Arc::new(MemoryStore::new()), two_step("pre")).await;
    let mut rx = tracker.subscribe();

    tracker
        .submit_update("pre", manual("B", ProposedStatus::Completed))
        .await
        .unwrap();

    let types: Vec<String> = drain(&mut rx)
        .iter()
        .map(|e| e.event_type().to_string())
        .collect();
    assert_eq!(types, vec!["ItemUpdated", "ItemUnblocked"]);
}

#[tokio::test]
async fn test_rejection_emits_event() {
    let tracker = tracker_with(Arc::new(MemoryStore::new()), two_step("pre")).await;
    let mut rx = tracker.subscribe();

    tracker
        .submit_update("pre", manual("A", ProposedStatus::Completed))
        .await
        .unwrap();

    let events = drain(&mut rx);
    assert_eq!(count(&events, "UpdateRejected"), 1);
    assert_eq!(count(&events, "ItemUpdated"), 0);
}

#[tokio::test]
async fn test_snapshot_lists_items_in_dependency_order() {
    let tracker = tracker_with(Arc::new(MemoryStore::new()), two_step("pre")).await;

    let snapshot = tracker.progress("pre").await.unwrap();
    let order: Vec<&str> = snapshot.items.iter().map(|i| i.item_id.as_str()).collect();
    assert_eq!(order, vec!["B", "A"]);
    assert_eq!(snapshot.items[1].gate, NodeStatus::Blocked);
    assert_eq!(snapshot.items[1].blockers, vec!["B".to_string()]);
    assert_eq!(snapshot.percentage, 0.0);
}

// ============================================================================
// Channel input
// ============================================================================

fn channel_config() -> ChannelConfig {
    ChannelConfig::new(0.8, 3, NoiseReductionLevel::High, Duration::from_secs(1)).unwrap()
}

#[tokio::test]
async fn test_submit_text_input_with_confirmation() {
    let tracker = tracker_with(Arc::new(MemoryStore::new()), two_step("pre")).await;
    let extractor = Arc::new(ScriptedExtractor::default());
    let channel = ConfidenceGatedChannel::new(Arc::new(RecordingReducer::default()), extractor.clone());
    let mut session = channel.open(channel_config());

    let input = ChannelInput::Text("B is done".to_string());
    let unconfirmed = tracker
        .submit_input("pre", "B", ProposedStatus::Completed, &input, &mut session, false)
        .await
        .unwrap();
    assert!(matches!(
        unconfirmed.rejection(),
        Some(Rejection::ConfirmationRequired { .. })
    ));

    let confirmed = tracker
        .submit_input("pre", "B", ProposedStatus::Completed, &input, &mut session, true)
        .await
        .unwrap();
    assert!(matches!(confirmed, SubmitOutcome::Applied { .. }));
    assert_eq!(extractor.calls(), 0);
}

#[tokio::test]
async fn test_submit_audio_input_transcript_becomes_note() {
    let store = Arc::new(MemoryStore::new());
    let tracker = tracker_with(Arc::clone(&store), two_step("pre")).await;
    let channel = ConfidenceGatedChannel::new(
        Arc::new(RecordingReducer::default()),
        Arc::new(ScriptedExtractor::scores(&[0.3, 0.9])),
    );
    let mut session = channel.open(channel_config());

    let outcome = tracker
        .submit_input("pre", "B", ProposedStatus::Completed, &audio(), &mut session, true)
        .await
        .unwrap();
    assert!(outcome.accepted());

    let log = store.progress_log("pre").await.unwrap();
    assert_eq!(log[0].verification_method, VerificationMethod::AiAssisted);
    assert_eq!(log[0].notes.as_deref(), Some("transcript 2"));
    assert_eq!(session.finish().total_attempts, 2);
}

#[tokio::test]
async fn test_blocked_item_does_not_consume_channel_attempts() {
    let tracker = tracker_with(Arc::new(MemoryStore::new()), two_step("pre")).await;
    let extractor = Arc::new(ScriptedExtractor::scores(&[0.95]));
    let channel = ConfidenceGatedChannel::new(Arc::new(RecordingReducer::default()), extractor.clone());
    let mut session = channel.open(channel_config());

    let outcome = tracker
        .submit_input("pre", "A", ProposedStatus::Completed, &audio(), &mut session, true)
        .await
        .unwrap();
    assert!(matches!(outcome.rejection(), Some(Rejection::DependencyBlocked { .. })));
    assert_eq!(extractor.calls(), 0);
}

#[tokio::test]
async fn test_unknown_item_does_not_consume_channel_attempts() {
    let tracker = tracker_with(Arc::new(MemoryStore::new()), two_step("pre")).await;
    let extractor = Arc::new(ScriptedExtractor::scores(&[0.95]));
    let channel = ConfidenceGatedChannel::new(Arc::new(RecordingReducer::default()), extractor.clone());
    let mut session = channel.open(channel_config());

    let err = tracker
        .submit_input("pre", "ghost", ProposedStatus::Completed, &audio(), &mut session, true)
        .await
        .unwrap_err();
    assert!(matches!(err, TrackerError::UnknownItem { ref item_id, .. } if item_id == "ghost"));
    assert_eq!(extractor.calls(), 0);
    assert!(session.history().is_empty());
}

#[tokio::test]
async fn test_exhausted_channel_surfaces_error() {
    let tracker = tracker_with(Arc::new(MemoryStore::new()), two_step("pre")).await;
    let channel = ConfidenceGatedChannel::new(
        Arc::new(RecordingReducer::default()),
        Arc::new(ScriptedExtractor::scores(&[0.1, 0.2, 0.3])),
    );
    let mut session = channel.open(channel_config());

    let err = tracker
        .submit_input("pre", "B", ProposedStatus::Completed, &audio(), &mut session, true)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        TrackerError::Channel(ChannelError::Exhausted { attempts: 3, .. })
    ));

    let snapshot = tracker.progress("pre").await.unwrap();
    assert_eq!(snapshot.completed_items, 0);
}
