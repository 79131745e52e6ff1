//! The storage port: one async trait covering definitions and instances.
//!
//! The engine owns the trait and an in-memory implementation; the `db` crate
//! provides the Postgres one.  Both enforce the same write guards so the
//! services behave identically on either backend.

pub mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;

use crate::models::{FlowDefinition, FlowInstance, InstanceStatus};
use crate::EngineError;

/// Persistence contract for flow definitions and instances.
///
/// Lookups return `Ok(None)` for unknown keys.  Saves are upserts keyed by
/// `id`; an instance is always written together with its history.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    // -- Definitions --

    async fn get_definition(&self, id: &str) -> Result<Option<FlowDefinition>, EngineError>;

    async fn get_definition_by_code(&self, code: &str) -> Result<Option<FlowDefinition>, EngineError>;

    /// All definitions, oldest first.
    async fn list_definitions(&self) -> Result<Vec<FlowDefinition>, EngineError>;

    async fn save_definition(&self, definition: &FlowDefinition) -> Result<(), EngineError>;

    // -- Instances --

    async fn get_instance(&self, id: &str) -> Result<Option<FlowInstance>, EngineError>;

    async fn save_instance(&self, instance: &FlowInstance) -> Result<(), EngineError>;

    /// Instances started from `definition_id`, oldest first.
    async fn list_instances_by_definition(
        &self,
        definition_id: &str,
    ) -> Result<Vec<FlowInstance>, EngineError>;
}

/// What a backend knows about the currently stored copy of an instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredInstanceState {
    pub status: InstanceStatus,
    pub current_node_id: String,
    pub history_len: usize,
    pub last_action_id: Option<String>,
}

impl StoredInstanceState {
    pub fn of(instance: &FlowInstance) -> Self {
        Self {
            status: instance.status,
            current_node_id: instance.current_node_id.clone(),
            history_len: instance.history.len(),
            last_action_id: instance.last_action().map(|a| a.id.clone()),
        }
    }
}

/// Decide whether `incoming` may replace the stored copy of an instance.
///
/// Accepted writes:
/// - first write of a new id;
/// - a rewrite that keeps the stored history and status;
/// - an append of exactly one entry on top of the stored last entry, while
///   the stored copy is still pending, recorded at the stored cursor.
///
/// Anything else was computed from a stale or torn read.
pub fn guard_instance_write(
    stored: Option<&StoredInstanceState>,
    incoming: &FlowInstance,
) -> Result<(), EngineError> {
    let Some(stored) = stored else {
        return Ok(());
    };

    let len = incoming.history.len();
    let base_matches = |base_len: usize| {
        let base_last = base_len
            .checked_sub(1)
            .and_then(|i| incoming.history.get(i))
            .map(|a| a.id.as_str());
        base_last == stored.last_action_id.as_deref()
    };

    if len == stored.history_len {
        if base_matches(len) && incoming.status == stored.status {
            return Ok(());
        }
    } else if len == stored.history_len + 1 && base_matches(stored.history_len) {
        if stored.status.is_terminal() {
            return Err(EngineError::InstanceClosed);
        }
        let appended_at = incoming.history[stored.history_len].node_id.as_str();
        if appended_at == stored.current_node_id {
            return Ok(());
        }
    } else if len > stored.history_len && stored.status.is_terminal() {
        return Err(EngineError::InstanceClosed);
    }

    Err(EngineError::Conflict(incoming.id.clone()))
}
