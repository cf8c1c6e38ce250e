//! Integration CRUD, credential tests and the integration type catalog.
//!
//! Responses never carry stored secrets; see [`Integration::redacted`].

use crate::auth::CurrentUser;
use crate::error::{ApiError, ApiJson, ApiResult};
use crate::server::SharedState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use nexus_common::catalog::integration_types;
use nexus_common::{Integration, IntegrationConfig, IntegrationKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

const MAX_NAME_LEN: usize = 100;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateIntegrationRequest {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub config: Value,
}

#[derive(Debug, Deserialize)]
pub struct UpdateIntegrationRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub config: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestUnsavedRequest {
    #[serde(rename = "type")]
    pub kind: String,
    pub config: Value,
    /// When editing, redacted secrets are filled in from this integration.
    #[serde(default)]
    pub integration_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TestResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn parse_kind(kind: &str) -> ApiResult<IntegrationKind> {
    kind.trim().parse().map_err(ApiError::bad_request)
}

fn validate_name(name: &str) -> ApiResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ApiError::bad_request("name is required"));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(ApiError::bad_request(format!(
            "name must be at most {} characters",
            MAX_NAME_LEN
        )));
    }
    Ok(name.to_string())
}

pub(crate) fn load_owned(state: &SharedState, user_id: i64, id: &str) -> ApiResult<Integration> {
    state
        .db
        .get_integration(user_id, id)?
        .ok_or_else(|| ApiError::not_found("integration not found"))
}

async fn run_test(state: &SharedState, integration_id: Option<&str>, config: &IntegrationConfig) -> TestResult {
    match state.upstream.test(integration_id, config).await {
        Ok(()) => TestResult {
            success: true,
            error: None,
        },
        Err(e) => {
            debug!("{} connection test failed: {}", config.kind(), e);
            TestResult {
                success: false,
                error: Some(e.to_string()),
            }
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn list_handler(
    State(state): State<SharedState>,
    Extension(current): Extension<CurrentUser>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<Integration>>> {
    let kind = query
        .kind
        .as_deref()
        .filter(|k| !k.is_empty())
        .map(parse_kind)
        .transpose()?;
    let list = state.db.list_integrations(current.user.id, kind)?;
    Ok(Json(list.iter().map(Integration::redacted).collect()))
}

pub async fn create_handler(
    State(state): State<SharedState>,
    Extension(current): Extension<CurrentUser>,
    ApiJson(req): ApiJson<CreateIntegrationRequest>,
) -> ApiResult<impl IntoResponse> {
    let name = validate_name(&req.name)?;
    let kind = parse_kind(&req.kind)?;
    let config = IntegrationConfig::from_value(kind, req.config)?;

    let integration = state.db.create_integration(current.user.id, &name, config)?;
    info!("User {} created {} integration {}", current.user.id, kind, integration.id);
    Ok((StatusCode::CREATED, Json(integration.redacted())))
}

pub async fn get_handler(
    State(state): State<SharedState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> ApiResult<Json<Integration>> {
    Ok(Json(load_owned(&state, current.user.id, &id)?.redacted()))
}

pub async fn update_handler(
    State(state): State<SharedState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<UpdateIntegrationRequest>,
) -> ApiResult<Json<Integration>> {
    let existing = load_owned(&state, current.user.id, &id)?;

    let name = match req.name.as_deref() {
        Some(name) => validate_name(name)?,
        None => existing.name.clone(),
    };
    let config = match req.config {
        Some(value) => {
            let mut config = IntegrationConfig::from_value_unchecked(existing.kind, value)?;
            config.merge_secrets_from(&existing.config);
            config.validate()?;
            config
        }
        None => existing.config.clone(),
    };

    let updated = state.db.update_integration(current.user.id, &id, &name, config)?;
    state.upstream.forget(&id);
    Ok(Json(updated.redacted()))
}

pub async fn delete_handler(
    State(state): State<SharedState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    if !state.db.delete_integration(current.user.id, &id)? {
        return Err(ApiError::not_found("integration not found"));
    }
    state.upstream.forget(&id);
    info!("User {} deleted integration {}", current.user.id, id);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn test_handler(
    State(state): State<SharedState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> ApiResult<Json<TestResult>> {
    let integration = load_owned(&state, current.user.id, &id)?;
    Ok(Json(run_test(&state, Some(&integration.id), &integration.config).await))
}

pub async fn test_unsaved_handler(
    State(state): State<SharedState>,
    Extension(current): Extension<CurrentUser>,
    ApiJson(req): ApiJson<TestUnsavedRequest>,
) -> ApiResult<Json<TestResult>> {
    let kind = parse_kind(&req.kind)?;
    let mut config = IntegrationConfig::from_value_unchecked(kind, req.config)?;
    if let Some(id) = req.integration_id.as_deref() {
        let existing = load_owned(&state, current.user.id, id)?;
        config.merge_secrets_from(&existing.config);
    }
    config.validate()?;

    // Unsaved credentials never populate the token cache.
    Ok(Json(run_test(&state, None, &config).await))
}

pub async fn nodes_handler(
    State(state): State<SharedState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<String>>> {
    let integration = load_owned(&state, current.user.id, &id)?;
    let IntegrationConfig::Proxmox(cfg) = &integration.config else {
        return Err(ApiError::bad_request("only Proxmox integrations have nodes"));
    };
    let nodes = crate::upstream::ProxmoxClient::new(&state.upstream, cfg)
        .nodes()
        .await?;
    Ok(Json(nodes))
}

pub async fn types_handler() -> impl IntoResponse {
    Json(integration_types())
}
