use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use engine::{FlowDefinition, FlowInstance, FlowNode};

use crate::{error::ApiError, AppState};

#[derive(Debug, Deserialize)]
pub struct RegisterFlowDto {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub nodes: Vec<FlowNode>,
}

#[derive(Debug, Deserialize)]
pub struct StartInstanceDto {
    #[serde(default)]
    pub business_id: String,
    #[serde(default)]
    pub space_id: String,
    #[serde(default)]
    pub created_by: String,
}

pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<FlowDefinition>>, ApiError> {
    Ok(Json(state.definitions.list().await?))
}

pub async fn get(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<FlowDefinition>, ApiError> {
    Ok(Json(state.definitions.get(&code).await?))
}

pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterFlowDto>, JsonRejection>,
) -> Result<(StatusCode, Json<FlowDefinition>), ApiError> {
    let Json(dto) = payload?;
    let definition = state
        .definitions
        .register(&dto.code, &dto.name, &dto.description, dto.nodes)
        .await?;
    Ok((StatusCode::CREATED, Json(definition)))
}

pub async fn list_instances(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<Vec<FlowInstance>>, ApiError> {
    Ok(Json(state.instances.list(&code).await?))
}

pub async fn start_instance(
    State(state): State<AppState>,
    Path(code): Path<String>,
    payload: Result<Json<StartInstanceDto>, JsonRejection>,
) -> Result<(StatusCode, Json<FlowInstance>), ApiError> {
    let Json(dto) = payload?;
    let instance = state
        .instances
        .start(&code, &dto.business_id, &dto.space_id, &dto.created_by)
        .await?;
    Ok((StatusCode::CREATED, Json(instance)))
}
