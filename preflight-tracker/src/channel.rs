//! Confidence-gated input channel
//!
//! Turns noisy audio (or typed text) into a transcript that meets a
//! confidence threshold, retrying a bounded number of times.
//!
//! # Attempt loop
//!
//! Each attempt runs noise reduction then extraction, each call bounded by
//! the configured timeout. A call failure or timeout consumes the attempt.
//! A result below the threshold is discarded but remembered if it is the best
//! candidate so far. The loop stops at the first result at or above the
//! threshold, or once `max_retries` attempts have been made.
//!
//! Cancellation is observed at attempt boundaries only: an in-flight attempt
//! always runs to completion, but no further collaborator calls are made once
//! the session is cancelled.

use crate::error::{ChannelError, ServiceError};
use chrono::Utc;
use preflight_common::config::{ChannelSettings, NoiseReductionLevel};
use preflight_common::events::{ChannelOutcome, EventBus, PreflightEvent};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Raw audio captured from the operator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioInput {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub num_channels: u8,
}

/// Input to the channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "lowercase")]
pub enum ChannelInput {
    Audio(AudioInput),
    /// Typed input; bypasses extraction with full confidence
    Text(String),
}

impl ChannelInput {
    pub fn is_audio(&self) -> bool {
        matches!(self, ChannelInput::Audio(_))
    }
}

/// Extraction service result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extraction {
    pub text: String,
    /// Confidence score (0.0-1.0)
    pub confidence: f32,
}

/// Noise reduction collaborator
#[async_trait::async_trait]
pub trait NoiseReducer: Send + Sync {
    async fn reduce_noise(
        &self,
        input: &AudioInput,
        level: NoiseReductionLevel,
    ) -> Result<AudioInput, ServiceError>;
}

/// Speech-to-text collaborator
#[async_trait::async_trait]
pub trait SpeechExtractor: Send + Sync {
    async fn extract(&self, input: &AudioInput) -> Result<Extraction, ServiceError>;
}

/// Validated channel parameters
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelConfig {
    pub confidence_threshold: f32,
    /// Total attempt budget per input; 0 means no attempt is made
    pub max_retries: u32,
    pub noise_reduction_level: NoiseReductionLevel,
    /// Bound on every individual collaborator call
    pub attempt_timeout: Duration,
}

impl ChannelConfig {
    pub fn new(
        confidence_threshold: f32,
        max_retries: u32,
        noise_reduction_level: NoiseReductionLevel,
        attempt_timeout: Duration,
    ) -> preflight_common::Result<Self> {
        if !(0.0..=1.0).contains(&confidence_threshold) {
            return Err(preflight_common::Error::InvalidInput(format!(
                "confidence_threshold must be within 0.0-1.0, got {}",
                confidence_threshold
            )));
        }
        if attempt_timeout.is_zero() {
            return Err(preflight_common::Error::InvalidInput(
                "attempt_timeout must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            confidence_threshold,
            max_retries,
            noise_reduction_level,
            attempt_timeout,
        })
    }

    pub fn from_settings(settings: &ChannelSettings) -> preflight_common::Result<Self> {
        Self::new(
            settings.confidence_threshold,
            settings.max_retries,
            settings.noise_reduction_level,
            Duration::from_millis(settings.attempt_timeout_ms),
        )
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        let settings = ChannelSettings::default();
        Self {
            confidence_threshold: settings.confidence_threshold,
            max_retries: settings.max_retries,
            noise_reduction_level: settings.noise_reduction_level,
            attempt_timeout: Duration::from_millis(settings.attempt_timeout_ms),
        }
    }
}

/// One scored transcription
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionAttempt {
    /// 1-based attempt number within its run
    pub attempt: u32,
    pub text: String,
    pub confidence: f32,
    /// None for text input
    pub noise_reduction_level: Option<NoiseReductionLevel>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Accepted(TranscriptionAttempt),
    /// Below threshold
    Discarded(TranscriptionAttempt),
    /// Collaborator failure or timeout
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub attempt: u32,
    pub outcome: AttemptOutcome,
}

/// Produced by [`ChannelSession::finish`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: Uuid,
    /// Outcome of the last run, if any run happened
    pub outcome: Option<ChannelOutcome>,
    pub total_attempts: u32,
    pub history: Vec<AttemptRecord>,
}

/// Factory for channel sessions over a pair of collaborators
#[derive(Clone)]
pub struct ConfidenceGatedChannel {
    reducer: Arc<dyn NoiseReducer>,
    extractor: Arc<dyn SpeechExtractor>,
    event_bus: Option<EventBus>,
}

impl ConfidenceGatedChannel {
    pub fn new(reducer: Arc<dyn NoiseReducer>, extractor: Arc<dyn SpeechExtractor>) -> Self {
        Self {
            reducer,
            extractor,
            event_bus: None,
        }
    }

    /// Emit `ChannelAttempt`/`ChannelFinished` events on `bus`
    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn open(&self, config: ChannelConfig) -> ChannelSession {
        let session = ChannelSession {
            id: Uuid::new_v4(),
            config,
            reducer: Arc::clone(&self.reducer),
            extractor: Arc::clone(&self.extractor),
            event_bus: self.event_bus.clone(),
            cancel: CancellationToken::new(),
            history: Vec::new(),
            last_outcome: None,
        };
        debug!(session_id = %session.id, "Channel session opened");
        session
    }
}

/// Scoped channel session
///
/// Sessions are independent: cancelling one never affects another.
pub struct ChannelSession {
    id: Uuid,
    config: ChannelConfig,
    reducer: Arc<dyn NoiseReducer>,
    extractor: Arc<dyn SpeechExtractor>,
    event_bus: Option<EventBus>,
    cancel: CancellationToken,
    history: Vec<AttemptRecord>,
    last_outcome: Option<ChannelOutcome>,
}

impl ChannelSession {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Request cancellation; takes effect at the next attempt boundary
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token for cancelling from another task while `attempt` is running
    pub fn cancel_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn history(&self) -> &[AttemptRecord] {
        &self.history
    }

    /// Run the attempt loop for one input
    ///
    /// Returns the first result meeting the threshold, or
    /// [`ChannelError::Exhausted`] with the best discarded candidate, or
    /// [`ChannelError::Cancelled`].
    pub async fn attempt(&mut self, input: &ChannelInput) -> Result<TranscriptionAttempt, ChannelError> {
        let audio = match input {
            ChannelInput::Text(text) => return self.accept_text(text),
            ChannelInput::Audio(audio) => audio,
        };

        // Cancellation wins over an empty budget
        if self.cancel.is_cancelled() {
            return Err(self.cancelled(0));
        }

        let mut best: Option<TranscriptionAttempt> = None;
        let mut attempts = 0u32;

        while attempts < self.config.max_retries {
            if self.cancel.is_cancelled() {
                return Err(self.cancelled(attempts));
            }
            attempts += 1;

            let outcome = match self.run_attempt(audio, attempts).await {
                Ok(candidate) if candidate.confidence >= self.config.confidence_threshold => {
                    self.record(attempts, AttemptOutcome::Accepted(candidate.clone()));
                    self.finish_run(ChannelOutcome::Accepted, attempts);
                    info!(
                        session_id = %self.id,
                        attempt = attempts,
                        confidence = candidate.confidence,
                        "Channel result accepted"
                    );
                    return Ok(candidate);
                }
                Ok(candidate) => {
                    debug!(
                        session_id = %self.id,
                        attempt = attempts,
                        confidence = candidate.confidence,
                        threshold = self.config.confidence_threshold,
                        "Discarding low-confidence result"
                    );
                    if best.as_ref().map_or(true, |b| candidate.confidence > b.confidence) {
                        best = Some(candidate.clone());
                    }
                    AttemptOutcome::Discarded(candidate)
                }
                Err(e) => {
                    warn!(
                        session_id = %self.id,
                        attempt = attempts,
                        error = %e,
                        "Channel attempt failed"
                    );
                    AttemptOutcome::Failed {
                        reason: e.to_string(),
                    }
                }
            };
            self.record(attempts, outcome);
        }

        warn!(
            session_id = %self.id,
            attempts = attempts,
            best_confidence = ?best.as_ref().map(|b| b.confidence),
            "Channel retries exhausted"
        );
        self.finish_run(ChannelOutcome::Exhausted, attempts);
        Err(ChannelError::Exhausted { attempts, best })
    }

    /// Close the session and return its attempt log
    pub fn finish(self) -> SessionSummary {
        let summary = SessionSummary {
            session_id: self.id,
            outcome: self.last_outcome,
            total_attempts: self.history.len() as u32,
            history: self.history,
        };
        debug!(
            session_id = %summary.session_id,
            attempts = summary.total_attempts,
            "Channel session finished"
        );
        summary
    }

    fn accept_text(&mut self, text: &str) -> Result<TranscriptionAttempt, ChannelError> {
        if self.cancel.is_cancelled() {
            return Err(self.cancelled(0));
        }
        let candidate = TranscriptionAttempt {
            attempt: 1,
            text: text.to_string(),
            confidence: 1.0,
            noise_reduction_level: None,
        };
        self.record(1, AttemptOutcome::Accepted(candidate.clone()));
        self.finish_run(ChannelOutcome::Accepted, 1);
        Ok(candidate)
    }

    async fn run_attempt(&self, audio: &AudioInput, attempt: u32) -> Result<TranscriptionAttempt, ServiceError> {
        let level = self.config.noise_reduction_level;
        let cleaned = self
            .bounded(self.reducer.reduce_noise(audio, level))
            .await?;
        let extraction = self.bounded(self.extractor.extract(&cleaned)).await?;

        Ok(TranscriptionAttempt {
            attempt,
            text: extraction.text,
            confidence: clamp_confidence(extraction.confidence),
            noise_reduction_level: Some(level),
        })
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, ServiceError>>,
    ) -> Result<T, ServiceError> {
        match tokio::time::timeout(self.config.attempt_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(ServiceError::Timeout(
                self.config.attempt_timeout.as_millis() as u64,
            )),
        }
    }

    fn record(&mut self, attempt: u32, outcome: AttemptOutcome) {
        if let Some(bus) = &self.event_bus {
            let (confidence, accepted) = match &outcome {
                AttemptOutcome::Accepted(a) => (Some(a.confidence), true),
                AttemptOutcome::Discarded(a) => (Some(a.confidence), false),
                AttemptOutcome::Failed { .. } => (None, false),
            };
            bus.emit_lossy(PreflightEvent::ChannelAttempt {
                session_id: self.id,
                attempt,
                confidence,
                accepted,
                timestamp: Utc::now(),
            });
        }
        self.history.push(AttemptRecord { attempt, outcome });
    }

    fn finish_run(&mut self, outcome: ChannelOutcome, attempts: u32) {
        self.last_outcome = Some(outcome);
        if let Some(bus) = &self.event_bus {
            bus.emit_lossy(PreflightEvent::ChannelFinished {
                session_id: self.id,
                outcome,
                attempts,
                timestamp: Utc::now(),
            });
        }
    }

    fn cancelled(&mut self, attempts: u32) -> ChannelError {
        info!(session_id = %self.id, attempts = attempts, "Channel session cancelled");
        self.finish_run(ChannelOutcome::Cancelled, attempts);
        ChannelError::Cancelled { attempts }
    }
}

/// Clamp to 0.0-1.0; NaN scores count as zero confidence
fn clamp_confidence(confidence: f32) -> f32 {
    if confidence.is_nan() {
        0.0
    } else {
        confidence.clamp(0.0, 1.0)
    }
}
