//! `wf_instances` and `wf_history` operations.
//!
//! Both paths work on a caller-owned connection: reads run inside one
//! snapshot so a header never pairs with history from a later commit, and
//! writes commit the header update and the new history rows together.

use sqlx::{PgConnection, Postgres, Transaction};

use engine::{FlowInstance, InstanceAction};

use crate::{
    models::{HistoryRow, InstanceLockRow, InstanceRow},
    DbError,
};

const COLUMNS: &str = "id, definition_id, business_id, space_id, status, current_node_id, \
                       created_by, created_at, updated_at, completed_at";

/// Fetch an instance header by primary key.
pub async fn get_instance(conn: &mut PgConnection, id: &str) -> Result<Option<InstanceRow>, DbError> {
    let row = sqlx::query_as::<_, InstanceRow>(&format!(
        "SELECT {COLUMNS} FROM wf_instances WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row)
}

/// Instance headers for one definition, oldest first.
pub async fn list_by_definition(
    conn: &mut PgConnection,
    definition_id: &str,
) -> Result<Vec<InstanceRow>, DbError> {
    let rows = sqlx::query_as::<_, InstanceRow>(&format!(
        "SELECT {COLUMNS} FROM wf_instances WHERE definition_id = $1 ORDER BY created_at ASC"
    ))
    .bind(definition_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows)
}

/// History rows of one instance in append order.
pub async fn load_history(
    conn: &mut PgConnection,
    instance_id: &str,
) -> Result<Vec<HistoryRow>, DbError> {
    let rows = sqlx::query_as::<_, HistoryRow>(
        r#"
        SELECT id, instance_id, seq, node_id, actor_id, action, comment, created_at
        FROM wf_history
        WHERE instance_id = $1
        ORDER BY seq ASC
        "#,
    )
    .bind(instance_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows)
}

/// Lock the instance header row and report what the write guard needs.
///
/// Returns `None` for an id that has never been saved.
pub async fn lock_instance(
    tx: &mut Transaction<'_, Postgres>,
    id: &str,
) -> Result<Option<InstanceLockRow>, DbError> {
    let row = sqlx::query_as::<_, InstanceLockRow>(
        r#"
        SELECT i.status,
               i.current_node_id,
               (SELECT COUNT(*) FROM wf_history h WHERE h.instance_id = i.id) AS history_len,
               (SELECT h.id FROM wf_history h WHERE h.instance_id = i.id
                 ORDER BY h.seq DESC LIMIT 1) AS last_action_id
        FROM wf_instances i
        WHERE i.id = $1
        FOR UPDATE
        "#,
    )
    .bind(id)
    .fetch_optional(&mut **tx)
    .await?;
    Ok(row)
}

/// Insert or update the instance header.
///
/// Identity columns (`definition_id`, `business_id`, `space_id`,
/// `created_by`, `created_at`) are written on insert only.
pub async fn upsert_instance(
    tx: &mut Transaction<'_, Postgres>,
    inst: &FlowInstance,
) -> Result<(), DbError> {
    sqlx::query(
        r#"
        INSERT INTO wf_instances
            (id, definition_id, business_id, space_id, status, current_node_id,
             created_by, created_at, updated_at, completed_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        ON CONFLICT (id) DO UPDATE
        SET status = EXCLUDED.status,
            current_node_id = EXCLUDED.current_node_id,
            updated_at = EXCLUDED.updated_at,
            completed_at = EXCLUDED.completed_at
        "#,
    )
    .bind(&inst.id)
    .bind(&inst.definition_id)
    .bind(&inst.business_id)
    .bind(&inst.space_id)
    .bind(inst.status.as_str())
    .bind(&inst.current_node_id)
    .bind(&inst.created_by)
    .bind(inst.created_at)
    .bind(inst.updated_at)
    .bind(inst.completed_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Append one history entry at position `seq`.
pub async fn insert_history(
    tx: &mut Transaction<'_, Postgres>,
    seq: i32,
    entry: &InstanceAction,
) -> Result<(), DbError> {
    sqlx::query(
        r#"
        INSERT INTO wf_history
            (id, instance_id, seq, node_id, actor_id, action, comment, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(&entry.id)
    .bind(&entry.instance_id)
    .bind(seq)
    .bind(&entry.node_id)
    .bind(&entry.actor_id)
    .bind(entry.action.as_str())
    .bind(&entry.comment)
    .bind(entry.created_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}
