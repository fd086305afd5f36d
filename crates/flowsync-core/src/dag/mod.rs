//! Workflow DAG model and validation.
//!
//! The JSON wire shape is the only format that crosses the API boundary:
//! a [`WorkflowDefinition`] is `{ nodes: [...], edges: [...] }` where edges
//! may carry a `conditionBranch` label of `"true"` or `"false"`.

mod validator;

pub use validator::{validate, ValidationReport};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// The nine executable node kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Start,
    End,
    Action,
    Condition,
    Delay,
    Fork,
    Join,
    Transform,
    WebhookResponse,
}

impl NodeType {
    /// Wire name of the node type, e.g. `"webhook_response"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Start => "start",
            NodeType::End => "end",
            NodeType::Action => "action",
            NodeType::Condition => "condition",
            NodeType::Delay => "delay",
            NodeType::Fork => "fork",
            NodeType::Join => "join",
            NodeType::Transform => "transform",
            NodeType::WebhookResponse => "webhook_response",
        }
    }
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Editor canvas position. Ignored by the engine, preserved on round-trips.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// A single node in a workflow definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub label: String,
    #[serde(default)]
    pub config: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

// ---------------------------------------------------------------------------
// Edge
// ---------------------------------------------------------------------------

/// Branch label on an edge leaving a condition node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConditionBranch {
    True,
    False,
}

impl ConditionBranch {
    /// The branch a condition outcome selects.
    pub fn from_outcome(outcome: bool) -> Self {
        if outcome {
            ConditionBranch::True
        } else {
            ConditionBranch::False
        }
    }
}

/// A dependency from `source`'s completion to `target`'s eligibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(
        rename = "conditionBranch",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub condition_branch: Option<ConditionBranch>,
}

// ---------------------------------------------------------------------------
// WorkflowDefinition
// ---------------------------------------------------------------------------

/// An immutable workflow graph: nodes plus directed edges.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl WorkflowDefinition {
    /// Look up a node by id.
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// All edges leaving the given node.
    pub fn outgoing(&self, node_id: &str) -> Vec<&Edge> {
        self.edges.iter().filter(|e| e.source == node_id).collect()
    }

    /// All edges entering the given node.
    pub fn incoming(&self, node_id: &str) -> Vec<&Edge> {
        self.edges.iter().filter(|e| e.target == node_id).collect()
    }

    /// Nodes with no incoming edges: the initial wave of an execution.
    pub fn initial_nodes(&self) -> Vec<&Node> {
        self.nodes
            .iter()
            .filter(|n| !self.edges.iter().any(|e| e.target == n.id))
            .collect()
    }
}
