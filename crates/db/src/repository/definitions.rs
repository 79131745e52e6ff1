//! `wf_definitions` operations.

use sqlx::types::Json;
use sqlx::PgPool;

use engine::FlowDefinition;

use crate::{models::DefinitionRow, DbError};

const COLUMNS: &str = "id, code, name, description, nodes, created_at, updated_at";

/// Fetch a definition by primary key.
pub async fn get_definition(pool: &PgPool, id: &str) -> Result<Option<DefinitionRow>, DbError> {
    let row = sqlx::query_as::<_, DefinitionRow>(&format!(
        "SELECT {COLUMNS} FROM wf_definitions WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Fetch a definition by its unique business code.
pub async fn get_definition_by_code(
    pool: &PgPool,
    code: &str,
) -> Result<Option<DefinitionRow>, DbError> {
    let row = sqlx::query_as::<_, DefinitionRow>(&format!(
        "SELECT {COLUMNS} FROM wf_definitions WHERE code = $1"
    ))
    .bind(code)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Return all definitions ordered by creation time (oldest first).
pub async fn list_definitions(pool: &PgPool) -> Result<Vec<DefinitionRow>, DbError> {
    let rows = sqlx::query_as::<_, DefinitionRow>(&format!(
        "SELECT {COLUMNS} FROM wf_definitions ORDER BY created_at ASC"
    ))
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Insert or update a definition keyed by `id`.
///
/// `created_at` is written on insert only.  A `code` owned by another id
/// trips the unique constraint.
pub async fn upsert_definition(pool: &PgPool, def: &FlowDefinition) -> Result<(), DbError> {
    sqlx::query(
        r#"
        INSERT INTO wf_definitions (id, code, name, description, nodes, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (id) DO UPDATE
        SET code = EXCLUDED.code,
            name = EXCLUDED.name,
            description = EXCLUDED.description,
            nodes = EXCLUDED.nodes,
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(&def.id)
    .bind(&def.code)
    .bind(&def.name)
    .bind(&def.description)
    .bind(Json(&def.nodes))
    .bind(def.created_at)
    .bind(def.updated_at)
    .execute(pool)
    .await?;
    Ok(())
}
