//! Dependency graph gating checklist items
//!
//! Nodes live in a single owned table addressed by a stable integer index.
//! Edges are stored twice as index lists: `dependencies[i]` (what item `i`
//! waits on) and `dependents[i]` (what waits on item `i`). Acyclicity is
//! checked once at build time with a topological sort.
//!
//! Only direct dependencies are consulted when gating. A dependency can only
//! become `completed` after passing its own gate, so checking the direct
//! parents is sufficient for the whole DAG.

use crate::error::GraphConfigError;
use crate::models::{
    Checklist, ChecklistItem, ContextualPrompt, DefaultPromptSelector, ItemStatus, ProgressUpdate, PromptContext,
    PromptSelector, PromptType,
};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// Gating status of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    /// All dependencies completed, item itself not yet completed
    Pending,
    Completed,
    /// At least one direct dependency is not completed
    Blocked,
}

/// One node per checklist item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyNode {
    pub item_id: String,
    /// Direct dependencies, in declaration order, without duplicates
    pub dependencies: Vec<String>,
    pub status: NodeStatus,
    #[serde(default)]
    pub last_applied: Option<ProgressUpdate>,
}

impl DependencyNode {
    /// Lifecycle status derived from the last applied update
    pub fn item_status(&self) -> ItemStatus {
        self.last_applied
            .as_ref()
            .map(|update| update.status.into())
            .unwrap_or(ItemStatus::Pending)
    }
}

/// Answer to "can this item proceed?"
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Validation {
    pub can_proceed: bool,
    /// Direct dependencies not yet completed
    pub blockers: Vec<String>,
    /// One dependency prompt per blocker, in blocker order
    pub suggestions: Vec<ContextualPrompt>,
}

impl Validation {
    fn proceed() -> Self {
        Self {
            can_proceed: true,
            blockers: Vec::new(),
            suggestions: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DependencyGraph {
    nodes: Vec<DependencyNode>,
    descriptions: Vec<String>,
    index: HashMap<String, usize>,
    dependencies: Vec<Vec<usize>>,
    dependents: Vec<Vec<usize>>,
    topo_order: Vec<usize>,
}

impl DependencyGraph {
    /// Build the graph for a checklist
    ///
    /// Fails on duplicate item ids, dangling dependency references and cycles.
    pub fn build(checklist: &Checklist) -> Result<Self, GraphConfigError> {
        let mut index = HashMap::with_capacity(checklist.items.len());
        for (i, item) in checklist.items.iter().enumerate() {
            if index.insert(item.id.clone(), i).is_some() {
                return Err(GraphConfigError::DuplicateItem(item.id.clone()));
            }
        }

        let mut nodes = Vec::with_capacity(checklist.items.len());
        let mut dependencies = Vec::with_capacity(checklist.items.len());
        let mut dependents = vec![Vec::new(); checklist.items.len()];

        for (i, item) in checklist.items.iter().enumerate() {
            let mut seen = HashSet::new();
            let mut dep_ids = Vec::new();
            let mut dep_indices = Vec::new();

            for dep in &item.dependencies {
                if !seen.insert(dep.as_str()) {
                    continue;
                }
                let Some(&d) = index.get(dep) else {
                    return Err(GraphConfigError::DanglingDependency {
                        item: item.id.clone(),
                        missing: dep.clone(),
                    });
                };
                dep_ids.push(dep.clone());
                dep_indices.push(d);
                dependents[d].push(i);
            }

            nodes.push(DependencyNode {
                item_id: item.id.clone(),
                status: if dep_indices.is_empty() {
                    NodeStatus::Pending
                } else {
                    NodeStatus::Blocked
                },
                dependencies: dep_ids,
                last_applied: None,
            });
            dependencies.push(dep_indices);
        }

        let topo_order = Self::topological_pass(&nodes, &dependencies)?;

        debug!(
            checklist_id = %checklist.id,
            items = nodes.len(),
            "Dependency graph built"
        );

        Ok(Self {
            descriptions: checklist.items.iter().map(|i| i.description.clone()).collect(),
            nodes,
            index,
            dependencies,
            dependents,
            topo_order,
        })
    }

    /// Load-time acyclicity check; returns node indices in dependency order
    fn topological_pass(
        nodes: &[DependencyNode],
        dependencies: &[Vec<usize>],
    ) -> Result<Vec<usize>, GraphConfigError> {
        let mut dag: DiGraph<usize, ()> = DiGraph::with_capacity(nodes.len(), nodes.len());
        let handles: Vec<NodeIndex> = (0..nodes.len()).map(|i| dag.add_node(i)).collect();
        for (i, deps) in dependencies.iter().enumerate() {
            for &d in deps {
                dag.add_edge(handles[d], handles[i], ());
            }
        }

        toposort(&dag, None)
            .map(|order| order.into_iter().map(|h| dag[h]).collect())
            .map_err(|cycle| GraphConfigError::Cycle {
                item: nodes[dag[cycle.node_id()]].item_id.clone(),
            })
    }

    /// Overlay persisted node state onto a freshly built graph
    ///
    /// Only `last_applied` is taken from storage; gating statuses are
    /// recomputed in dependency order so they can never disagree with the
    /// applied updates. Unknown item ids are skipped.
    pub fn restore(&mut self, saved: Vec<DependencyNode>) {
        for node in saved {
            match self.index.get(&node.item_id) {
                Some(&i) => self.nodes[i].last_applied = node.last_applied,
                None => warn!(item_id = %node.item_id, "Ignoring persisted state for unknown item"),
            }
        }

        for pos in 0..self.topo_order.len() {
            let i = self.topo_order[pos];
            self.nodes[i].status = if self.nodes[i].item_status() == ItemStatus::Completed {
                NodeStatus::Completed
            } else {
                self.gate(i)
            };
        }
    }

    /// Gate status for a not-completed node
    fn gate(&self, i: usize) -> NodeStatus {
        if self.dependencies[i]
            .iter()
            .all(|&d| self.nodes[d].status == NodeStatus::Completed)
        {
            NodeStatus::Pending
        } else {
            NodeStatus::Blocked
        }
    }

    /// Can `item_id` proceed? Suggestions use the default prompt wording.
    ///
    /// Unknown items may always proceed: no dependency information means no gating.
    pub fn validate(&self, item_id: &str) -> Validation {
        self.validate_with(item_id, &DefaultPromptSelector)
    }

    /// Same as [`validate`](Self::validate) with caller-supplied prompt wording
    pub fn validate_with(&self, item_id: &str, prompts: &dyn PromptSelector) -> Validation {
        let Some(&i) = self.index.get(item_id) else {
            return Validation::proceed();
        };

        let blockers: Vec<usize> = self.dependencies[i]
            .iter()
            .copied()
            .filter(|&d| self.nodes[d].status != NodeStatus::Completed)
            .collect();

        if blockers.is_empty() {
            return Validation::proceed();
        }

        let suggestions = blockers
            .iter()
            .map(|&d| {
                let blocker = &self.nodes[d].item_id;
                let description = &self.descriptions[d];
                let message = prompts.select_prompt(&PromptContext {
                    prompt_type: PromptType::Dependency,
                    item_id: blocker.clone(),
                    description: (!description.is_empty()).then(|| description.clone()),
                    requested_item: item_id.to_string(),
                });
                ContextualPrompt::dependency(blocker, message)
            })
            .collect();

        Validation {
            can_proceed: false,
            blockers: blockers
                .into_iter()
                .map(|d| self.nodes[d].item_id.clone())
                .collect(),
            suggestions,
        }
    }

    /// Mark a node completed
    ///
    /// Must only be called after the state machine accepted a completion for
    /// this item. Returns false for unknown items or already-completed nodes.
    pub fn apply_completion(&mut self, item_id: &str) -> bool {
        let Some(&i) = self.index.get(item_id) else {
            return false;
        };
        if self.nodes[i].status == NodeStatus::Completed {
            return false;
        }
        self.nodes[i].status = NodeStatus::Completed;
        true
    }

    /// Re-evaluate every direct dependent of a newly completed item
    ///
    /// Returns the dependents that moved `blocked -> pending`.
    pub fn on_dependency_completed(&mut self, item_id: &str) -> Vec<String> {
        let Some(&i) = self.index.get(item_id) else {
            return Vec::new();
        };

        let mut unblocked = Vec::new();
        for pos in 0..self.dependents[i].len() {
            let dependent = self.dependents[i][pos];
            if self.nodes[dependent].status == NodeStatus::Blocked
                && self.gate(dependent) == NodeStatus::Pending
            {
                self.nodes[dependent].status = NodeStatus::Pending;
                unblocked.push(self.nodes[dependent].item_id.clone());
            }
        }
        unblocked
    }

    /// Record an accepted update as the node's last applied update
    pub fn record_applied(&mut self, update: &ProgressUpdate) {
        if let Some(&i) = self.index.get(&update.item_id) {
            self.nodes[i].last_applied = Some(update.clone());
        }
    }

    /// Explicit external reset of an item back to `pending`
    ///
    /// Clears the last applied update, re-gates the item and re-blocks any
    /// direct dependent that is not itself completed. Returns the dependents
    /// that moved `pending -> blocked`.
    pub fn reset(&mut self, item_id: &str) -> Vec<String> {
        let Some(&i) = self.index.get(item_id) else {
            return Vec::new();
        };

        self.nodes[i].last_applied = None;
        self.nodes[i].status = self.gate(i);

        let mut blocked = Vec::new();
        for pos in 0..self.dependents[i].len() {
            let dependent = self.dependents[i][pos];
            if self.nodes[dependent].status == NodeStatus::Pending {
                self.nodes[dependent].status = NodeStatus::Blocked;
                blocked.push(self.nodes[dependent].item_id.clone());
            }
        }
        blocked
    }

    pub fn contains(&self, item_id: &str) -> bool {
        self.index.contains_key(item_id)
    }

    /// Constant-time item lookup in the checklist this graph was built from
    pub fn item<'c>(&self, checklist: &'c Checklist, item_id: &str) -> Option<&'c ChecklistItem> {
        self.index
            .get(item_id)
            .and_then(|&i| checklist.items.get(i))
            .filter(|item| item.id == item_id)
    }

    pub fn node(&self, item_id: &str) -> Option<&DependencyNode> {
        self.index.get(item_id).map(|&i| &self.nodes[i])
    }

    pub fn status(&self, item_id: &str) -> Option<NodeStatus> {
        self.node(item_id).map(|n| n.status)
    }

    pub fn item_status(&self, item_id: &str) -> Option<ItemStatus> {
        self.node(item_id).map(DependencyNode::item_status)
    }

    pub fn last_applied(&self, item_id: &str) -> Option<&ProgressUpdate> {
        self.node(item_id).and_then(|n| n.last_applied.as_ref())
    }

    /// Item ids in an order where every item follows its dependencies
    pub fn topological_order(&self) -> Vec<&str> {
        self.topo_order
            .iter()
            .map(|&i| self.nodes[i].item_id.as_str())
            .collect()
    }

    /// Copy of all nodes, for persistence
    pub fn snapshot(&self) -> Vec<DependencyNode> {
        self.nodes.clone()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
