//! Row structs that map 1-to-1 onto the `wf_*` tables.
//!
//! These are *persistence* models; conversion into the engine's domain types
//! happens here so the repository functions stay pure SQL.

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::FromRow;

use engine::{FlowDefinition, FlowInstance, FlowNode, InstanceAction, InstanceStatus, TaskAction};

use crate::DbError;

// ---------------------------------------------------------------------------
// wf_definitions
// ---------------------------------------------------------------------------

/// A persisted flow definition row; `nodes` is stored as JSONB.
#[derive(Debug, Clone, FromRow)]
pub struct DefinitionRow {
    pub id: String,
    pub code: String,
    pub name: String,
    pub description: String,
    pub nodes: Json<Vec<FlowNode>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<DefinitionRow> for FlowDefinition {
    fn from(row: DefinitionRow) -> Self {
        Self {
            id: row.id,
            code: row.code,
            name: row.name,
            description: row.description,
            nodes: row.nodes.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

// ---------------------------------------------------------------------------
// wf_instances
// ---------------------------------------------------------------------------

/// A persisted instance header row (history lives in `wf_history`).
#[derive(Debug, Clone, FromRow)]
pub struct InstanceRow {
    pub id: String,
    pub definition_id: String,
    pub business_id: String,
    pub space_id: String,
    pub status: String,
    pub current_node_id: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl InstanceRow {
    /// Combine the header with its history rows (already in `seq` order).
    pub fn into_instance(self, history: Vec<HistoryRow>) -> Result<FlowInstance, DbError> {
        let status: InstanceStatus = self
            .status
            .parse()
            .map_err(|e: String| DbError::decode("status", e))?;
        let history = history
            .into_iter()
            .map(InstanceAction::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(FlowInstance {
            id: self.id,
            definition_id: self.definition_id,
            business_id: self.business_id,
            space_id: self.space_id,
            status,
            current_node_id: self.current_node_id,
            created_by: self.created_by,
            created_at: self.created_at,
            updated_at: self.updated_at,
            completed_at: self.completed_at,
            history,
        })
    }
}

/// Header facts the write guard needs, read under `FOR UPDATE`.
#[derive(Debug, Clone, FromRow)]
pub struct InstanceLockRow {
    pub status: String,
    pub current_node_id: String,
    pub history_len: i64,
    pub last_action_id: Option<String>,
}

// ---------------------------------------------------------------------------
// wf_history
// ---------------------------------------------------------------------------

/// A persisted history entry; `seq` is its position in the instance history.
#[derive(Debug, Clone, FromRow)]
pub struct HistoryRow {
    pub id: String,
    pub instance_id: String,
    pub seq: i32,
    pub node_id: String,
    pub actor_id: String,
    pub action: String,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<HistoryRow> for InstanceAction {
    type Error = DbError;

    fn try_from(row: HistoryRow) -> Result<Self, Self::Error> {
        let action: TaskAction = row
            .action
            .parse()
            .map_err(|_| DbError::decode("action", format!("unknown action: {}", row.action)))?;
        Ok(Self {
            id: row.id,
            instance_id: row.instance_id,
            node_id: row.node_id,
            actor_id: row.actor_id,
            action,
            comment: row.comment,
            created_at: row.created_at,
        })
    }
}
