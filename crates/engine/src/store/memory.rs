//! Process-local [`WorkflowStore`] backed by `RwLock`-guarded maps.
//!
//! Every read hands out a clone so callers can never mutate stored records.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use super::{guard_instance_write, StoredInstanceState, WorkflowStore};
use crate::models::{FlowDefinition, FlowInstance};
use crate::EngineError;

#[derive(Debug, Default)]
pub struct MemoryStore {
    definitions: RwLock<HashMap<String, FlowDefinition>>,
    instances: RwLock<HashMap<String, FlowInstance>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

// A poisoned lock only means another task panicked mid-read or after a
// completed insert; the map itself is always consistent.
fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl WorkflowStore for MemoryStore {
    async fn get_definition(&self, id: &str) -> Result<Option<FlowDefinition>, EngineError> {
        Ok(read(&self.definitions).get(id).cloned())
    }

    async fn get_definition_by_code(&self, code: &str) -> Result<Option<FlowDefinition>, EngineError> {
        Ok(read(&self.definitions)
            .values()
            .find(|d| d.code == code)
            .cloned())
    }

    async fn list_definitions(&self) -> Result<Vec<FlowDefinition>, EngineError> {
        let mut defs: Vec<FlowDefinition> = read(&self.definitions).values().cloned().collect();
        defs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(defs)
    }

    async fn save_definition(&self, definition: &FlowDefinition) -> Result<(), EngineError> {
        if definition.id.is_empty() {
            return Err(EngineError::DefinitionIdRequired);
        }
        let mut defs = write(&self.definitions);
        let taken = defs
            .values()
            .any(|d| d.code == definition.code && d.id != definition.id);
        if taken {
            return Err(EngineError::DuplicateCode(definition.code.clone()));
        }
        defs.insert(definition.id.clone(), definition.clone());
        Ok(())
    }

    async fn get_instance(&self, id: &str) -> Result<Option<FlowInstance>, EngineError> {
        Ok(read(&self.instances).get(id).cloned())
    }

    async fn save_instance(&self, instance: &FlowInstance) -> Result<(), EngineError> {
        if instance.id.is_empty() {
            return Err(EngineError::InstanceIdRequired);
        }
        let mut instances = write(&self.instances);
        let stored = instances.get(&instance.id).map(StoredInstanceState::of);
        guard_instance_write(stored.as_ref(), instance)?;
        instances.insert(instance.id.clone(), instance.clone());
        Ok(())
    }

    async fn list_instances_by_definition(
        &self,
        definition_id: &str,
    ) -> Result<Vec<FlowInstance>, EngineError> {
        let mut list: Vec<FlowInstance> = read(&self.instances)
            .values()
            .filter(|i| i.definition_id == definition_id)
            .cloned()
            .collect();
        list.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(list)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FlowNode, InstanceStatus};
    use chrono::Utc;

    fn definition(id: &str, code: &str) -> FlowDefinition {
        let now = Utc::now();
        FlowDefinition {
            id: id.into(),
            code: code.into(),
            name: "n".into(),
            description: String::new(),
            nodes: vec![FlowNode::new("a", "")],
            created_at: now,
            updated_at: now,
        }
    }

    fn instance(id: &str, definition_id: &str) -> FlowInstance {
        let now = Utc::now();
        FlowInstance {
            id: id.into(),
            definition_id: definition_id.into(),
            business_id: "doc".into(),
            space_id: "s1".into(),
            status: InstanceStatus::Pending,
            current_node_id: "a".into(),
            created_by: "u1".into(),
            created_at: now,
            updated_at: now,
            completed_at: None,
            history: Vec::new(),
        }
    }

    #[tokio::test]
    async fn definitions_round_trip_by_id_and_code() {
        let store = MemoryStore::new();
        store.save_definition(&definition("d1", "x")).await.unwrap();

        assert_eq!(store.get_definition("d1").await.unwrap().unwrap().code, "x");
        assert_eq!(store.get_definition_by_code("x").await.unwrap().unwrap().id, "d1");
        assert!(store.get_definition_by_code("y").await.unwrap().is_none());
        assert_eq!(store.list_definitions().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn save_requires_ids() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.save_definition(&definition("", "x")).await,
            Err(EngineError::DefinitionIdRequired)
        ));
        assert!(matches!(
            store.save_instance(&instance("", "d1")).await,
            Err(EngineError::InstanceIdRequired)
        ));
    }

    #[tokio::test]
    async fn code_cannot_move_to_a_second_id() {
        let store = MemoryStore::new();
        store.save_definition(&definition("d1", "x")).await.unwrap();
        assert!(matches!(
            store.save_definition(&definition("d2", "x")).await,
            Err(EngineError::DuplicateCode(code)) if code == "x"
        ));
    }

    #[tokio::test]
    async fn reads_are_copies() {
        let store = MemoryStore::new();
        store.save_definition(&definition("d1", "x")).await.unwrap();

        let mut copy = store.get_definition("d1").await.unwrap().unwrap();
        copy.nodes.clear();

        assert_eq!(store.get_definition("d1").await.unwrap().unwrap().nodes.len(), 1);
    }

    #[tokio::test]
    async fn instances_are_filtered_by_definition() {
        let store = MemoryStore::new();
        store.save_instance(&instance("i1", "d1")).await.unwrap();
        store.save_instance(&instance("i2", "d2")).await.unwrap();
        store.save_instance(&instance("i3", "d1")).await.unwrap();

        let ids: Vec<String> = store
            .list_instances_by_definition("d1")
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.id)
            .collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&"i1".to_string()) && ids.contains(&"i3".to_string()));
    }
}
