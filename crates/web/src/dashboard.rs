//! Per-user dashboard layout storage.

use crate::auth::CurrentUser;
use crate::error::{ApiJson, ApiResult};
use crate::server::SharedState;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use nexus_common::layout::{normalize_for_user, Normalized};
use nexus_common::DashboardConfig;
use serde_json::json;
use tracing::info;

/// Validate against the caller's integrations.
fn normalize_for(state: &SharedState, user_id: i64, config: DashboardConfig, strict: bool) -> ApiResult<Normalized> {
    Ok(normalize_for_user(&state.db, user_id, config, strict)?)
}

pub(crate) fn load_dashboard(state: &SharedState, user_id: i64) -> ApiResult<DashboardConfig> {
    Ok(state
        .db
        .get_dashboard(user_id)?
        .map(|(config, _)| config)
        .unwrap_or_default())
}

pub async fn get_handler(
    State(state): State<SharedState>,
    Extension(current): Extension<CurrentUser>,
) -> ApiResult<Json<DashboardConfig>> {
    Ok(Json(load_dashboard(&state, current.user.id)?))
}

pub async fn put_handler(
    State(state): State<SharedState>,
    Extension(current): Extension<CurrentUser>,
    ApiJson(config): ApiJson<DashboardConfig>,
) -> ApiResult<Json<DashboardConfig>> {
    let normalized = normalize_for(&state, current.user.id, config, true)?;
    state.db.save_dashboard(current.user.id, &normalized.config)?;
    Ok(Json(normalized.config))
}

pub async fn delete_handler(
    State(state): State<SharedState>,
    Extension(current): Extension<CurrentUser>,
) -> ApiResult<StatusCode> {
    state.db.delete_dashboard(current.user.id)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn export_handler(
    State(state): State<SharedState>,
    Extension(current): Extension<CurrentUser>,
) -> ApiResult<impl IntoResponse> {
    let config = load_dashboard(&state, current.user.id)?;
    let body = serde_json::to_string_pretty(&config).map_err(nexus_common::Error::from)?;
    Ok((
        [
            (header::CONTENT_TYPE, "application/json"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"nexus-dashboard.json\""),
        ],
        body,
    ))
}

pub async fn import_handler(
    State(state): State<SharedState>,
    Extension(current): Extension<CurrentUser>,
    ApiJson(config): ApiJson<DashboardConfig>,
) -> ApiResult<impl IntoResponse> {
    let normalized = normalize_for(&state, current.user.id, config, false)?;
    state.db.save_dashboard(current.user.id, &normalized.config)?;

    info!(
        "User {} imported a dashboard with {} tiles ({} bindings dropped)",
        current.user.id,
        normalized.config.tiles.len(),
        normalized.dropped_bindings.len()
    );
    Ok(Json(json!({
        "dashboard": normalized.config,
        "dropped_bindings": normalized.dropped_bindings,
    })))
}
