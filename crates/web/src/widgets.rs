//! Widget catalog and per-tile live status.

use crate::auth::CurrentUser;
use crate::dashboard::load_dashboard;
use crate::error::{ApiError, ApiResult};
use crate::server::SharedState;
use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Extension, Json,
};
use nexus_common::catalog::{widget_type, WIDGET_TYPES};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

#[derive(Debug, Serialize)]
pub struct TileStatus {
    pub tile_id: String,
    #[serde(rename = "type")]
    pub widget_type: String,
    pub integration_id: String,
    pub refresh_interval_secs: u64,
    pub fetched_at: i64,
    pub data: Value,
}

pub async fn list_handler() -> impl IntoResponse {
    Json(WIDGET_TYPES)
}

pub async fn tile_status_handler(
    State(state): State<SharedState>,
    Extension(current): Extension<CurrentUser>,
    Path(tile_id): Path<String>,
) -> ApiResult<Json<TileStatus>> {
    let dashboard = load_dashboard(&state, current.user.id)?;
    let tile = dashboard
        .tile(&tile_id)
        .ok_or_else(|| ApiError::not_found("tile not found"))?;
    let widget = widget_type(&tile.widget_type)
        .ok_or_else(|| ApiError::not_found(format!("unknown widget type '{}'", tile.widget_type)))?;

    let binding = dashboard
        .service_configs
        .get(&tile_id)
        .ok_or_else(|| ApiError::conflict("tile is not configured"))?;
    let integration = state
        .db
        .get_integration(current.user.id, &binding.integration_id)?
        .ok_or_else(|| ApiError::conflict("tile integration no longer exists"))?;
    if integration.kind != widget.integration {
        return Err(ApiError::conflict("tile integration has the wrong type"));
    }

    debug!("Fetching {} status for tile {}", widget.id, tile_id);
    let data = state
        .upstream
        .summary(&integration, binding.node.as_deref())
        .await?;

    Ok(Json(TileStatus {
        tile_id,
        widget_type: widget.id.to_string(),
        integration_id: integration.id,
        refresh_interval_secs: widget.refresh_interval_secs,
        fetched_at: chrono::Utc::now().timestamp(),
        data,
    }))
}
