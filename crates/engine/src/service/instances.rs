//! Starting flow instances and driving them through their nodes.
//!
//! `apply_action` is the state machine:
//!
//! ```text
//! pending --approve (successor exists)--> pending (cursor advanced)
//! pending --approve (no successor)------> approved
//! pending --reject----------------------> rejected
//! ```
//!
//! Every applied action appends exactly one history entry, and the entry and
//! the header change reach the store in a single save.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use tokio::sync::Mutex;
use tracing::{info, instrument};

use crate::clock::Clock;
use crate::models::{FlowInstance, InstanceAction, InstanceStatus, TaskAction};
use crate::store::WorkflowStore;
use crate::EngineError;

type InstanceLock = Arc<Mutex<()>>;

pub struct InstanceService {
    store: Arc<dyn WorkflowStore>,
    clock: Arc<dyn Clock>,
    // One async mutex per instance id; held across read, transition and save.
    locks: StdMutex<HashMap<String, InstanceLock>>,
}

impl InstanceService {
    pub fn new(store: Arc<dyn WorkflowStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            locks: StdMutex::new(HashMap::new()),
        }
    }

    /// Start a new instance of the definition registered under `definition_code`.
    ///
    /// # Errors
    /// - [`EngineError::DefinitionNotFound`] for an unknown code.
    /// - [`EngineError::BusinessIdRequired`] if `business_id` is blank.
    #[instrument(skip(self))]
    pub async fn start(
        &self,
        definition_code: &str,
        business_id: &str,
        space_id: &str,
        created_by: &str,
    ) -> Result<FlowInstance, EngineError> {
        let definition = self
            .store
            .get_definition_by_code(definition_code)
            .await?
            .ok_or(EngineError::DefinitionNotFound)?;

        if business_id.trim().is_empty() {
            return Err(EngineError::BusinessIdRequired);
        }

        let now = self.clock.now();
        let instance = FlowInstance {
            id: self.clock.new_id(),
            definition_id: definition.id.clone(),
            business_id: business_id.to_owned(),
            space_id: space_id.to_owned(),
            status: InstanceStatus::Pending,
            current_node_id: definition.first_node_id().to_owned(),
            created_by: created_by.to_owned(),
            created_at: now,
            updated_at: now,
            completed_at: None,
            history: Vec::new(),
        };

        self.store.save_instance(&instance).await?;
        info!(
            instance_id = %instance.id,
            definition_id = %instance.definition_id,
            node_id = %instance.current_node_id,
            "instance started"
        );
        Ok(instance)
    }

    /// Fetch an instance with its full history.
    pub async fn get(&self, id: &str) -> Result<FlowInstance, EngineError> {
        self.store
            .get_instance(id)
            .await?
            .ok_or(EngineError::InstanceNotFound)
    }

    /// Instances started from the definition registered under `definition_code`.
    pub async fn list(&self, definition_code: &str) -> Result<Vec<FlowInstance>, EngineError> {
        let definition = self
            .store
            .get_definition_by_code(definition_code)
            .await?
            .ok_or(EngineError::DefinitionNotFound)?;
        self.store.list_instances_by_definition(&definition.id).await
    }

    /// Record `action` against the instance's current node and advance it.
    ///
    /// Concurrent calls for the same instance are serialized; a caller that
    /// loses the race observes the winner's effect (or a closed instance).
    ///
    /// # Errors
    /// - [`EngineError::InstanceNotFound`] for an unknown id.
    /// - [`EngineError::InstanceClosed`] if the instance is no longer pending.
    /// - [`EngineError::DefinitionNotFound`] if the backing definition is gone.
    ///
    /// On error nothing is written.
    #[instrument(skip(self, comment))]
    pub async fn apply_action(
        &self,
        instance_id: &str,
        actor_id: &str,
        comment: &str,
        action: TaskAction,
    ) -> Result<FlowInstance, EngineError> {
        let lock = self.lock_for(instance_id);
        let _guard = lock.lock().await;

        let result = self.transition(instance_id, actor_id, comment, action).await;
        match &result {
            Ok(instance) if instance.status.is_terminal() => self.release(instance_id),
            Err(EngineError::InstanceNotFound | EngineError::InstanceClosed) => {
                self.release(instance_id)
            }
            _ => {}
        }
        result
    }

    async fn transition(
        &self,
        instance_id: &str,
        actor_id: &str,
        comment: &str,
        action: TaskAction,
    ) -> Result<FlowInstance, EngineError> {
        let mut instance = self
            .store
            .get_instance(instance_id)
            .await?
            .ok_or(EngineError::InstanceNotFound)?;

        if instance.status != InstanceStatus::Pending {
            return Err(EngineError::InstanceClosed);
        }

        let definition = self
            .store
            .get_definition(&instance.definition_id)
            .await?
            .ok_or(EngineError::DefinitionNotFound)?;

        let now = self.clock.now();
        let from_node = instance.current_node_id.clone();
        instance.history.push(InstanceAction {
            id: self.clock.new_id(),
            instance_id: instance.id.clone(),
            node_id: from_node.clone(),
            actor_id: actor_id.to_owned(),
            action,
            comment: comment.to_owned(),
            created_at: now,
        });

        match action {
            TaskAction::Approve => {
                let next = definition.find_next_node(&from_node).to_owned();
                if next.is_empty() {
                    instance.status = InstanceStatus::Approved;
                    instance.current_node_id.clear();
                    instance.completed_at = Some(now);
                } else {
                    instance.current_node_id = next;
                }
            }
            TaskAction::Reject => {
                instance.status = InstanceStatus::Rejected;
                instance.current_node_id.clear();
                instance.completed_at = Some(now);
            }
        }
        instance.updated_at = now;

        self.store.save_instance(&instance).await?;

        if instance.status.is_terminal() {
            info!(
                instance_id,
                status = %instance.status,
                from_node = %from_node,
                "instance closed"
            );
        } else {
            info!(
                instance_id,
                from_node = %from_node,
                to_node = %instance.current_node_id,
                "instance advanced"
            );
        }

        Ok(instance)
    }

    fn lock_for(&self, instance_id: &str) -> InstanceLock {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks
            .entry(instance_id.to_owned())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    // Only called once the instance is known to be closed or absent: a caller
    // that builds a fresh lock after this point cannot write anything.
    fn release(&self, instance_id: &str) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.remove(instance_id);
    }
}
