//! Contextual prompts surfaced to the person working the checklist
//!
//! The tracker never writes prompt prose itself: message text comes from a
//! [`PromptSelector`]. It only guarantees the prompt shape (type, priority,
//! whether a response is required, related items).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptType {
    /// Verification that must happen before the item can count as done
    Safety,
    /// Guidance on how the item can be verified
    Educational,
    Confirmation,
    Dependency,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextualPrompt {
    #[serde(rename = "type")]
    pub prompt_type: PromptType,
    /// 1 is the most urgent
    pub priority: u8,
    pub message: String,
    /// Caller must answer before retrying the blocked action
    pub required_response: bool,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl ContextualPrompt {
    /// Suggestion to complete `blocker` before the blocked item
    pub fn dependency(blocker: &str, message: String) -> Self {
        Self {
            prompt_type: PromptType::Dependency,
            priority: 1,
            message,
            required_response: true,
            dependencies: vec![blocker.to_string()],
        }
    }

    /// Required verification step missing from an update
    pub fn safety(item_id: &str, message: String) -> Self {
        Self {
            prompt_type: PromptType::Safety,
            priority: 1,
            message,
            required_response: true,
            dependencies: vec![item_id.to_string()],
        }
    }

    /// Informational hint; the caller may carry on without answering
    pub fn educational(item_id: &str, message: String) -> Self {
        Self {
            prompt_type: PromptType::Educational,
            priority: 3,
            message,
            required_response: false,
            dependencies: vec![item_id.to_string()],
        }
    }

    /// Request for an explicit confirmation of an AI-inferred completion
    pub fn confirmation(item_id: &str, message: String) -> Self {
        Self {
            prompt_type: PromptType::Confirmation,
            priority: 1,
            message,
            required_response: true,
            dependencies: vec![item_id.to_string()],
        }
    }
}

/// What a prompt is about, handed to the [`PromptSelector`]
#[derive(Debug, Clone, PartialEq)]
pub struct PromptContext {
    pub prompt_type: PromptType,
    /// Item the prompt refers to (the blocker, or the item awaiting confirmation)
    pub item_id: String,
    pub description: Option<String>,
    /// Item the caller was trying to update
    pub requested_item: String,
}

/// Prompt text selection, supplied by the conversation layer
pub trait PromptSelector: Send + Sync {
    fn select_prompt(&self, ctx: &PromptContext) -> String;
}

/// Plain fallback wording used when no conversation layer is attached
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPromptSelector;

impl PromptSelector for DefaultPromptSelector {
    fn select_prompt(&self, ctx: &PromptContext) -> String {
        let subject = ctx.description.as_deref().unwrap_or(ctx.item_id.as_str());
        match ctx.prompt_type {
            PromptType::Dependency => format!("Would you like to complete {} first?", subject),
            PromptType::Confirmation => format!("Please confirm that {} has been completed.", subject),
            PromptType::Safety => {
                format!("Important: {} requires photo evidence before proceeding.", subject)
            }
            PromptType::Educational => {
                format!("{} must be verified another way; see its accepted methods.", subject)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dependency_prompt_shape() {
        let prompt = ContextualPrompt::dependency("fuel", "msg".to_string());
        assert_eq!(prompt.prompt_type, PromptType::Dependency);
        assert_eq!(prompt.priority, 1);
        assert!(prompt.required_response);
        assert_eq!(prompt.dependencies, vec!["fuel".to_string()]);
    }

    #[test]
    fn test_default_selector_prefers_description() {
        let ctx = PromptContext {
            prompt_type: PromptType::Dependency,
            item_id: "fuel".to_string(),
            description: Some("Check fuel level".to_string()),
            requested_item: "engine-start".to_string(),
        };
        assert_eq!(
            DefaultPromptSelector.select_prompt(&ctx),
            "Would you like to complete Check fuel level first?"
        );
    }

    #[test]
    fn test_prompt_serializes_type_field() {
        let prompt = ContextualPrompt::confirmation("hull", "ok?".to_string());
        let json = serde_json::to_string(&prompt).unwrap();
        assert!(json.contains("\"type\":\"confirmation\""));
        assert!(json.contains("\"required_response\":true"));
    }

    #[test]
    fn test_safety_and_educational_prompts() {
        let safety = ContextualPrompt::safety("hull", "photo".to_string());
        assert_eq!(safety.prompt_type, PromptType::Safety);
        assert!(safety.required_response);

        let hint = ContextualPrompt::educational("hull", "methods".to_string());
        assert_eq!(hint.prompt_type, PromptType::Educational);
        assert!(!hint.required_response);
        assert!(hint.priority > safety.priority);

        let back: ContextualPrompt = serde_json::from_str(
            r#"{"type":"safety","priority":1,"message":"m","required_response":true}"#,
        )
        .unwrap();
        assert_eq!(back.prompt_type, PromptType::Safety);
        assert!(back.dependencies.is_empty());
    }
}
