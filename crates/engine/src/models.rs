//! Core domain models for the approval workflow engine.
//!
//! These types are the source of truth for what a flow definition and a
//! running flow instance look like in memory.  They double as the JSON wire
//! shapes (snake_case field names, ISO-8601 UTC timestamps).

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::EngineError;

// ---------------------------------------------------------------------------
// FlowNodeType
// ---------------------------------------------------------------------------

/// Behaviour of a single node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowNodeType {
    /// Waits for a human decision.
    #[default]
    Approval,
    /// Auto-transitioning step. Advanced like any other node by the engine.
    Auto,
}

impl FlowNodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approval => "approval",
            Self::Auto => "auto",
        }
    }
}

// Missing, null and blank values all mean `approval`.
impl<'de> Deserialize<'de> for FlowNodeType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        match raw.as_deref().map(str::trim) {
            None | Some("") | Some("approval") => Ok(Self::Approval),
            Some("auto") => Ok(Self::Auto),
            Some(other) => Err(serde::de::Error::unknown_variant(
                other,
                &["approval", "auto"],
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// FlowNode
// ---------------------------------------------------------------------------

/// One step of a flow definition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowNode {
    /// Unique within the owning definition; assigned on registration when blank.
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub node_type: FlowNodeType,
    /// Opaque to the engine; interpreted by the host authorization layer.
    #[serde(default)]
    pub approver_role: String,
    /// Successor node id. Empty ends the flow after this node.
    #[serde(default)]
    pub next_node_id: String,
}

impl FlowNode {
    /// Convenience constructor used by tests and fixtures.
    pub fn new(id: impl Into<String>, next_node_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            next_node_id: next_node_id.into(),
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// FlowDefinition
// ---------------------------------------------------------------------------

/// A reusable approval template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowDefinition {
    pub id: String,
    /// Business key, unique across definitions.
    pub code: String,
    pub name: String,
    pub description: String,
    pub nodes: Vec<FlowNode>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FlowDefinition {
    /// Id of the node every new instance starts at.
    pub fn first_node_id(&self) -> &str {
        self.nodes.first().map(|n| n.id.as_str()).unwrap_or_default()
    }

    /// Resolve the successor of `current_id`.
    ///
    /// The first node whose id matches wins and its `next_node_id` is
    /// returned as is. An empty result means the flow ends here, which is
    /// also what an unknown cursor resolves to.
    pub fn find_next_node(&self, current_id: &str) -> &str {
        successor(&self.nodes, current_id)
    }
}

/// Successor resolution over a bare node list; see [`FlowDefinition::find_next_node`].
pub fn successor<'a>(nodes: &'a [FlowNode], current_id: &str) -> &'a str {
    nodes
        .iter()
        .find(|n| n.id == current_id)
        .map(|n| n.next_node_id.as_str())
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// InstanceStatus
// ---------------------------------------------------------------------------

/// Lifecycle state of a flow instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl InstanceStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InstanceStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending"  => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other      => Err(format!("unknown instance status: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// TaskAction
// ---------------------------------------------------------------------------

/// A decision an approver can take on the current node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskAction {
    Approve,
    Reject,
}

impl TaskAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
        }
    }
}

impl fmt::Display for TaskAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskAction {
    type Err = EngineError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approve" => Ok(Self::Approve),
            "reject"  => Ok(Self::Reject),
            _         => Err(EngineError::UnsupportedAction),
        }
    }
}

// ---------------------------------------------------------------------------
// InstanceAction / FlowInstance
// ---------------------------------------------------------------------------

/// One recorded decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceAction {
    pub id: String,
    pub instance_id: String,
    /// The cursor at the moment the decision was applied.
    pub node_id: String,
    pub actor_id: String,
    pub action: TaskAction,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

/// A live run of a definition against a business resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowInstance {
    pub id: String,
    pub definition_id: String,
    pub business_id: String,
    pub space_id: String,
    pub status: InstanceStatus,
    /// Node awaiting a decision; empty once terminal.
    pub current_node_id: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Append-only, in time order.
    #[serde(default)]
    pub history: Vec<InstanceAction>,
}

impl FlowInstance {
    pub fn last_action(&self) -> Option<&InstanceAction> {
        self.history.last()
    }
}
