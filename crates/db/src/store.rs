//! Postgres-backed [`WorkflowStore`].
//!
//! Instance writes run in one transaction: the header row is locked with
//! `FOR UPDATE`, checked against the shared write guard, then the header is
//! upserted and only the history entries the database has not seen yet are
//! inserted.  Concurrent writers from other processes therefore serialize on
//! the row lock and the loser gets a conflict instead of a lost update.
//!
//! Reads load the header and its history inside one `REPEATABLE READ`
//! snapshot, so a reader never pairs a header with history from a later
//! commit.

use async_trait::async_trait;
use sqlx::{PgConnection, Postgres, Transaction};
use tracing::{debug, instrument};

use engine::store::{guard_instance_write, StoredInstanceState};
use engine::{EngineError, FlowDefinition, FlowInstance, InstanceAction, WorkflowStore};

use crate::error::into_engine;
use crate::models::InstanceLockRow;
use crate::repository::{definitions, instances};
use crate::{DbError, DbPool};

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Open a read-only transaction whose queries all see one snapshot.
    async fn snapshot(&self) -> Result<Transaction<'static, Postgres>, DbError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await?;
        Ok(tx)
    }

    async fn load_instance(&self, id: &str) -> Result<Option<FlowInstance>, DbError> {
        let mut tx = self.snapshot().await?;
        let instance = read_instance(&mut tx, id).await?;
        tx.commit().await?;
        Ok(instance)
    }

    async fn load_instances(&self, definition_id: &str) -> Result<Vec<FlowInstance>, DbError> {
        let mut tx = self.snapshot().await?;
        let headers = instances::list_by_definition(&mut tx, definition_id).await?;
        let mut out = Vec::with_capacity(headers.len());
        for header in headers {
            let history = instances::load_history(&mut tx, &header.id).await?;
            out.push(header.into_instance(history)?);
        }
        tx.commit().await?;
        Ok(out)
    }

    async fn write_instance(&self, instance: &FlowInstance) -> Result<(), EngineError> {
        let mut tx = self.pool.begin().await.map_err(DbError::from)?;

        let locked = instances::lock_instance(&mut tx, &instance.id).await?;
        // Rolls back on drop when the plan is refused.
        let appended = plan_instance_write(locked, instance)?;

        instances::upsert_instance(&mut tx, instance).await?;
        for (seq, entry) in &appended {
            instances::insert_history(&mut tx, *seq, entry).await?;
        }

        tx.commit().await.map_err(DbError::from)?;
        debug!(instance_id = %instance.id, appended = appended.len(), "instance persisted");
        Ok(())
    }
}

async fn read_instance(
    conn: &mut PgConnection,
    id: &str,
) -> Result<Option<FlowInstance>, DbError> {
    let Some(header) = instances::get_instance(conn, id).await? else {
        return Ok(None);
    };
    let history = instances::load_history(conn, id).await?;
    header.into_instance(history).map(Some)
}

fn stored_state(row: InstanceLockRow) -> Result<StoredInstanceState, DbError> {
    Ok(StoredInstanceState {
        status: row
            .status
            .parse()
            .map_err(|e: String| DbError::decode("status", e))?,
        current_node_id: row.current_node_id,
        history_len: usize::try_from(row.history_len)
            .map_err(|e| DbError::decode("history_len", e.to_string()))?,
        last_action_id: row.last_action_id,
    })
}

/// Check `incoming` against the locked row and return the history entries
/// the database has not seen yet, each with the `seq` it must be stored at.
pub(crate) fn plan_instance_write<'a>(
    locked: Option<InstanceLockRow>,
    incoming: &'a FlowInstance,
) -> Result<Vec<(i32, &'a InstanceAction)>, EngineError> {
    let stored = locked.map(stored_state).transpose()?;
    guard_instance_write(stored.as_ref(), incoming)?;

    let known = stored.map(|s| s.history_len).unwrap_or(0);
    incoming
        .history
        .iter()
        .enumerate()
        .skip(known)
        .map(|(seq, entry)| {
            i32::try_from(seq)
                .map(|seq| (seq, entry))
                .map_err(|e| EngineError::from(DbError::decode("seq", e.to_string())))
        })
        .collect()
}

#[async_trait]
impl WorkflowStore for PgStore {
    async fn get_definition(&self, id: &str) -> Result<Option<FlowDefinition>, EngineError> {
        let row = definitions::get_definition(&self.pool, id).await?;
        Ok(row.map(FlowDefinition::from))
    }

    async fn get_definition_by_code(
        &self,
        code: &str,
    ) -> Result<Option<FlowDefinition>, EngineError> {
        let row = definitions::get_definition_by_code(&self.pool, code).await?;
        Ok(row.map(FlowDefinition::from))
    }

    async fn list_definitions(&self) -> Result<Vec<FlowDefinition>, EngineError> {
        let rows = definitions::list_definitions(&self.pool).await?;
        Ok(rows.into_iter().map(FlowDefinition::from).collect())
    }

    #[instrument(skip(self, definition), fields(definition_id = %definition.id, code = %definition.code))]
    async fn save_definition(&self, definition: &FlowDefinition) -> Result<(), EngineError> {
        if definition.id.is_empty() {
            return Err(EngineError::DefinitionIdRequired);
        }
        definitions::upsert_definition(&self.pool, definition)
            .await
            .map_err(|e| into_engine(e, Some(&definition.code)))
    }

    async fn get_instance(&self, id: &str) -> Result<Option<FlowInstance>, EngineError> {
        Ok(self.load_instance(id).await?)
    }

    #[instrument(skip(self, instance), fields(instance_id = %instance.id))]
    async fn save_instance(&self, instance: &FlowInstance) -> Result<(), EngineError> {
        if instance.id.is_empty() {
            return Err(EngineError::InstanceIdRequired);
        }
        self.write_instance(instance).await
    }

    async fn list_instances_by_definition(
        &self,
        definition_id: &str,
    ) -> Result<Vec<FlowInstance>, EngineError> {
        Ok(self.load_instances(definition_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use engine::{InstanceStatus, TaskAction};

    fn entry(id: &str, node_id: &str) -> InstanceAction {
        InstanceAction {
            id: id.into(),
            instance_id: "i1".into(),
            node_id: node_id.into(),
            actor_id: "u".into(),
            action: TaskAction::Approve,
            comment: String::new(),
            created_at: Utc::now(),
        }
    }

    fn instance(cursor: &str, history: Vec<InstanceAction>) -> FlowInstance {
        let now = Utc::now();
        FlowInstance {
            id: "i1".into(),
            definition_id: "d1".into(),
            business_id: "doc".into(),
            space_id: "s".into(),
            status: InstanceStatus::Pending,
            current_node_id: cursor.into(),
            created_by: "u".into(),
            created_at: now,
            updated_at: now,
            completed_at: None,
            history,
        }
    }

    fn locked(status: &str, cursor: &str, len: i64, last: Option<&str>) -> InstanceLockRow {
        InstanceLockRow {
            status: status.into(),
            current_node_id: cursor.into(),
            history_len: len,
            last_action_id: last.map(str::to_owned),
        }
    }

    fn seqs(plan: &[(i32, &InstanceAction)]) -> Vec<(i32, String)> {
        plan.iter().map(|(seq, e)| (*seq, e.id.clone())).collect()
    }

    #[test]
    fn new_instance_inserts_every_entry_from_zero() {
        let inst = instance("a", Vec::new());
        assert!(plan_instance_write(None, &inst).unwrap().is_empty());

        let inst = instance("b", vec![entry("h1", "a")]);
        let plan = plan_instance_write(None, &inst).unwrap();
        assert_eq!(seqs(&plan), vec![(0, "h1".to_string())]);
    }

    #[test]
    fn append_is_stored_after_the_known_history() {
        let inst = instance("c", vec![entry("h1", "a"), entry("h2", "b")]);
        let plan = plan_instance_write(Some(locked("pending", "b", 1, Some("h1"))), &inst).unwrap();
        assert_eq!(seqs(&plan), vec![(1, "h2".to_string())]);
    }

    #[test]
    fn unchanged_history_inserts_nothing() {
        let inst = instance("b", vec![entry("h1", "a")]);
        let plan = plan_instance_write(Some(locked("pending", "b", 1, Some("h1"))), &inst).unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn entry_on_a_stale_base_conflicts() {
        // Another writer appended h1' after this copy was read.
        let inst = instance("b", vec![entry("h1", "a")]);
        let err = plan_instance_write(Some(locked("pending", "b", 1, Some("other"))), &inst)
            .unwrap_err();
        assert!(matches!(err, EngineError::Conflict(_)));
    }

    #[test]
    fn torn_read_cannot_record_twice_at_one_cursor() {
        // Header read at cursor `a`, history read after h2 committed at `a`.
        // The locked row has already moved on to `b`.
        let inst = instance(
            "b",
            vec![entry("h1", "x"), entry("h2", "a"), entry("h3", "a")],
        );
        let err = plan_instance_write(Some(locked("pending", "b", 2, Some("h2"))), &inst)
            .unwrap_err();
        assert!(matches!(err, EngineError::Conflict(_)));
    }

    #[test]
    fn closed_row_refuses_appends() {
        let inst = instance("", vec![entry("h1", "a"), entry("h2", "b")]);
        let err = plan_instance_write(Some(locked("approved", "", 1, Some("h1"))), &inst)
            .unwrap_err();
        assert!(matches!(err, EngineError::InstanceClosed));
    }

    #[test]
    fn unreadable_locked_status_is_a_storage_error() {
        let inst = instance("a", Vec::new());
        let err = plan_instance_write(Some(locked("paused", "a", 0, None)), &inst).unwrap_err();
        assert!(matches!(err, EngineError::Storage(_)));
    }
}
