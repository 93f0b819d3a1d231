//! Data models for the checklist tracker

pub mod checklist;
pub mod progress;
pub mod prompt;

pub use checklist::{
    Category, Checklist, ChecklistItem, ChecklistMetadata, CompletionRule, VerificationMethod,
};
pub use preflight_common::events::ItemStatus;
pub use progress::{ProgressUpdate, ProposedStatus};
pub use prompt::{ContextualPrompt, DefaultPromptSelector, PromptContext, PromptSelector, PromptType};
