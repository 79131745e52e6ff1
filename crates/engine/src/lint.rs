//! Definition inspection. Run this before registering a flow definition.
//!
//! Registration deliberately accepts structurally odd node lists, so nothing
//! here is fatal.  The findings are logged by the definition service and
//! reported by the `validate` CLI command.
//!
//! Checks:
//! 1. Node IDs should be unique within the definition.
//! 2. Every explicit `next_node_id` should name a node of the definition.
//! 3. Following successors from the first node should end (no cycle).
//! 4. Every node should be reachable from the first node.

use std::collections::HashSet;
use std::fmt;

use crate::models::{successor, FlowNode};

/// A structural finding about a node list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefinitionIssue {
    /// Two or more nodes share the same ID; only the first is ever visited.
    DuplicateNodeId(String),
    /// `next_node_id` names no node; an approval there closes the instance.
    DanglingNext { node_id: String, next_node_id: String },
    /// Walking successors from the first node comes back to `node_id`.
    Cycle { node_id: String },
    /// No path from the first node leads here.
    Unreachable(String),
}

impl fmt::Display for DefinitionIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateNodeId(id) => write!(f, "duplicate node ID: '{id}'"),
            Self::DanglingNext { node_id, next_node_id } => write!(
                f,
                "node '{node_id}' points to unknown next node '{next_node_id}'"
            ),
            Self::Cycle { node_id } => write!(f, "flow loops back to node '{node_id}'"),
            Self::Unreachable(id) => write!(f, "node '{id}' is never reached"),
        }
    }
}

/// Inspect a node list and return every finding, in node order per check.
pub fn inspect_nodes(nodes: &[FlowNode]) -> Vec<DefinitionIssue> {
    let mut issues = Vec::new();

    // -----------------------------------------------------------------------
    // 1. Duplicate IDs
    // -----------------------------------------------------------------------
    let mut seen: HashSet<&str> = HashSet::new();
    let mut reported: HashSet<&str> = HashSet::new();
    for node in nodes {
        if !seen.insert(node.id.as_str()) && reported.insert(node.id.as_str()) {
            issues.push(DefinitionIssue::DuplicateNodeId(node.id.clone()));
        }
    }

    // -----------------------------------------------------------------------
    // 2. Dangling successors
    // -----------------------------------------------------------------------
    for node in nodes {
        if !node.next_node_id.is_empty() && !seen.contains(node.next_node_id.as_str()) {
            issues.push(DefinitionIssue::DanglingNext {
                node_id: node.id.clone(),
                next_node_id: node.next_node_id.clone(),
            });
        }
    }

    // -----------------------------------------------------------------------
    // 3. Walk from the first node
    // -----------------------------------------------------------------------
    let mut visited: HashSet<&str> = HashSet::new();
    let mut cursor = nodes.first().map(|n| n.id.as_str()).unwrap_or_default();
    while !cursor.is_empty() && seen.contains(cursor) {
        if !visited.insert(cursor) {
            issues.push(DefinitionIssue::Cycle { node_id: cursor.to_owned() });
            break;
        }
        cursor = successor(nodes, cursor);
    }

    // -----------------------------------------------------------------------
    // 4. Unreachable nodes
    // -----------------------------------------------------------------------
    let mut unreachable_reported: HashSet<&str> = HashSet::new();
    for node in nodes {
        let id = node.id.as_str();
        if !visited.contains(id) && unreachable_reported.insert(id) {
            issues.push(DefinitionIssue::Unreachable(node.id.clone()));
        }
    }

    issues
}
