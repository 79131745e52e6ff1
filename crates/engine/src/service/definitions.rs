//! Registration and lookup of flow definitions.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use crate::clock::Clock;
use crate::lint::inspect_nodes;
use crate::models::{FlowDefinition, FlowInstance, FlowNode, InstanceStatus};
use crate::store::WorkflowStore;
use crate::EngineError;

/// Validates and upserts definitions, keeping `id` and `created_at` stable
/// across re-registrations of the same code.
pub struct DefinitionService {
    store: Arc<dyn WorkflowStore>,
    clock: Arc<dyn Clock>,
    // Serializes the lookup-then-save of `register` so two first-time
    // registrations of one code cannot both mint an id.
    register_lock: Mutex<()>,
}

impl DefinitionService {
    pub fn new(store: Arc<dyn WorkflowStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            register_lock: Mutex::new(()),
        }
    }

    /// Register a new definition or update the one already owning `code`.
    ///
    /// Blank node ids get a fresh id.  Structural oddities (dangling
    /// successors, duplicate ids, loops) are logged but accepted.
    ///
    /// # Errors
    /// - [`EngineError::CodeRequired`] if `code` is blank.
    /// - [`EngineError::NodesRequired`] if `nodes` is empty.
    /// - Store errors from the lookup or the save.
    #[instrument(skip(self, name, description, nodes), fields(node_count = nodes.len()))]
    pub async fn register(
        &self,
        code: &str,
        name: &str,
        description: &str,
        nodes: Vec<FlowNode>,
    ) -> Result<FlowDefinition, EngineError> {
        if code.trim().is_empty() {
            return Err(EngineError::CodeRequired);
        }
        if nodes.is_empty() {
            return Err(EngineError::NodesRequired);
        }

        let nodes: Vec<FlowNode> = nodes
            .into_iter()
            .map(|mut node| {
                if node.id.trim().is_empty() {
                    node.id = self.clock.new_id();
                }
                node
            })
            .collect();

        for issue in inspect_nodes(&nodes) {
            warn!(code, %issue, "definition accepted with structural issue");
        }

        let _guard = self.register_lock.lock().await;

        let existing = self.store.get_definition_by_code(code).await?;
        let now = self.clock.now();
        let mut definition = FlowDefinition {
            id: self.clock.new_id(),
            code: code.to_owned(),
            name: name.to_owned(),
            description: description.to_owned(),
            nodes,
            created_at: now,
            updated_at: now,
        };

        if let Some(existing) = existing {
            definition.id = existing.id;
            definition.created_at = existing.created_at;

            let pending = self.pending_instances(&definition.id).await?;
            if pending > 0 {
                warn!(
                    code,
                    definition_id = %definition.id,
                    pending,
                    "definition nodes replaced while instances are still pending"
                );
            }
        }

        self.store.save_definition(&definition).await?;
        info!(code, definition_id = %definition.id, "definition registered");
        Ok(definition)
    }

    /// All registered definitions.
    pub async fn list(&self) -> Result<Vec<FlowDefinition>, EngineError> {
        self.store.list_definitions().await
    }

    /// Look a definition up by its business code.
    pub async fn get(&self, code: &str) -> Result<FlowDefinition, EngineError> {
        self.store
            .get_definition_by_code(code)
            .await?
            .ok_or(EngineError::DefinitionNotFound)
    }

    async fn pending_instances(&self, definition_id: &str) -> Result<usize, EngineError> {
        let instances: Vec<FlowInstance> =
            self.store.list_instances_by_definition(definition_id).await?;
        Ok(instances
            .iter()
            .filter(|i| i.status == InstanceStatus::Pending)
            .count())
    }
}
