use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ShareError;
use crate::lifecycle::CreateShare;
use crate::AppState;

/// Body for `POST /api/shares/{id}/access`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AccessShare {
    pub password: Option<String>,
}

pub async fn create_share(
    State(state): State<AppState>,
    Json(input): Json<CreateShare>,
) -> Result<Json<Value>, ShareError> {
    let id = state.lifecycle.create(input).await?;
    Ok(Json(json!({ "success": true, "id": id })))
}

pub async fn access_share(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<AccessShare>,
) -> Result<Json<Value>, ShareError> {
    let view = state.lifecycle.access(&id, body.password.as_deref()).await?;
    Ok(Json(json!({ "success": true, "data": view })))
}

pub async fn share_metadata(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ShareError> {
    let meta = state.lifecycle.metadata(&id).await?;
    Ok(Json(json!({ "success": true, "data": meta })))
}

/// Liveness probe. Does not touch storage.
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
