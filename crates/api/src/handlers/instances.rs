use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use serde::Deserialize;

use engine::{FlowInstance, TaskAction};

use crate::{error::ApiError, AppState};

/// `action` stays a string here so unknown verbs surface as
/// "unsupported action" rather than a JSON decode failure.
#[derive(Debug, Deserialize)]
pub struct ActionDto {
    #[serde(default)]
    pub actor_id: String,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub action: String,
}

pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<FlowInstance>, ApiError> {
    Ok(Json(state.instances.get(&id).await?))
}

pub async fn act(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<ActionDto>, JsonRejection>,
) -> Result<Json<FlowInstance>, ApiError> {
    let Json(dto) = payload?;
    let action: TaskAction = dto.action.parse()?;
    let instance = state
        .instances
        .apply_action(&id, &dto.actor_id, &dto.comment, action)
        .await?;
    Ok(Json(instance))
}
