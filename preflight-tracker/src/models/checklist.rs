//! Checklist definition: items, categories and completion rules
//!
//! A checklist is immutable once loaded. Structural problems (unknown
//! categories, items listed twice, impossible quorums) are reported as
//! [`GraphConfigError`] before any progress is tracked.

use crate::error::GraphConfigError;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Means by which an item's completion is attested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationMethod {
    Manual,
    Photo,
    AiAssisted,
}

impl std::fmt::Display for VerificationMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VerificationMethod::Manual => write!(f, "manual"),
            VerificationMethod::Photo => write!(f, "photo"),
            VerificationMethod::AiAssisted => write!(f, "ai_assisted"),
        }
    }
}

/// A single checklist item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub id: String,
    /// Owning category id
    pub category: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required: bool,
    /// Items that must be completed first (direct dependencies only)
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Accepted verification methods
    pub verification: Vec<VerificationMethod>,
    /// Prompt hints for conversational guidance (opaque to the tracker)
    #[serde(default)]
    pub ai_prompts: Vec<String>,
}

impl ChecklistItem {
    /// Whether `method` is among this item's accepted verification methods
    pub fn accepts(&self, method: VerificationMethod) -> bool {
        self.verification.contains(&method)
    }
}

/// Predicate deciding whether a category counts as done
///
/// Every rule additionally requires all required items to be completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum CompletionRule {
    /// Every required item completed
    #[default]
    AllRequired,
    /// Every item completed, required or not
    AllItems,
    /// Required items completed and at least `minimum` items completed overall
    Quorum { minimum: usize },
}

/// Ordered group of items sharing a completion rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Item ids in display order
    pub items: Vec<String>,
    #[serde(default)]
    pub rule: CompletionRule,
}

/// Free-form checklist metadata carried for collaborators
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChecklistMetadata {
    #[serde(default)]
    pub vessel_type: Option<String>,
    #[serde(default)]
    pub required_crew: Option<u32>,
    #[serde(default)]
    pub weather_dependent: bool,
}

/// Complete checklist definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checklist {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub categories: Vec<Category>,
    pub items: Vec<ChecklistItem>,
    #[serde(default)]
    pub metadata: ChecklistMetadata,
}

impl Checklist {
    /// Parse a checklist from its JSON document form
    pub fn from_json(json: &str) -> preflight_common::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn item(&self, item_id: &str) -> Option<&ChecklistItem> {
        self.items.iter().find(|item| item.id == item_id)
    }

    pub fn category(&self, category_id: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.id == category_id)
    }

    /// Category owning `item_id`
    pub fn category_of(&self, item_id: &str) -> Option<&Category> {
        self.item(item_id).and_then(|item| self.category(&item.category))
    }

    /// Validate category structure
    ///
    /// Each item must belong to exactly one existing category and be listed
    /// by that category exactly once. Dependency checks live in
    /// [`DependencyGraph::build`](crate::graph::DependencyGraph::build).
    pub fn validate(&self) -> Result<(), GraphConfigError> {
        let mut categories: HashMap<&str, &Category> = HashMap::new();
        for category in &self.categories {
            if categories.insert(category.id.as_str(), category).is_some() {
                return Err(GraphConfigError::DuplicateCategory(category.id.clone()));
            }
        }

        let items: HashMap<&str, &ChecklistItem> =
            self.items.iter().map(|i| (i.id.as_str(), i)).collect();

        for item in &self.items {
            if !categories.contains_key(item.category.as_str()) {
                return Err(GraphConfigError::UnknownCategory {
                    item: item.id.clone(),
                    category: item.category.clone(),
                });
            }
            if item.verification.is_empty() {
                return Err(GraphConfigError::NoVerificationMethods(item.id.clone()));
            }
        }

        let mut listed: HashSet<&str> = HashSet::new();
        for category in &self.categories {
            for item_id in &category.items {
                let Some(item) = items.get(item_id.as_str()) else {
                    return Err(GraphConfigError::UnknownCategoryItem {
                        category: category.id.clone(),
                        item: item_id.clone(),
                    });
                };
                if item.category != category.id {
                    return Err(GraphConfigError::CategoryMismatch {
                        item: item_id.clone(),
                        expected: item.category.clone(),
                        listed: category.id.clone(),
                    });
                }
                if !listed.insert(item_id.as_str()) {
                    return Err(GraphConfigError::DuplicateItem(item_id.clone()));
                }
            }

            if let CompletionRule::Quorum { minimum } = category.rule {
                if minimum > category.items.len() {
                    return Err(GraphConfigError::InvalidQuorum {
                        category: category.id.clone(),
                        minimum,
                        available: category.items.len(),
                    });
                }
            }
        }

        if let Some(unlisted) = self.items.iter().find(|i| !listed.contains(i.id.as_str())) {
            return Err(GraphConfigError::UnlistedItem(unlisted.id.clone()));
        }

        Ok(())
    }
}
