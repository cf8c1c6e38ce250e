//! Vendor relays: `POST /api/<vendor>/{query,action}`.
//!
//! The body names a stored integration and a relative endpoint; credentials
//! are attached server side. `query` is always a GET, `action` defaults to
//! POST.

use crate::auth::CurrentUser;
use crate::error::{ApiError, ApiJson, ApiResult};
use crate::integrations::load_owned;
use crate::server::SharedState;
use crate::upstream::{parse_method, validate_endpoint};
use axum::{extract::State, Extension, Json};
use nexus_common::IntegrationKind;
use reqwest::Method;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyRequest {
    pub integration_id: String,
    pub endpoint: String,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub body: Option<Value>,
}

#[derive(Clone, Copy)]
enum RelayMode {
    Query,
    Action,
}

async fn relay(
    state: SharedState,
    current: CurrentUser,
    kind: IntegrationKind,
    mode: RelayMode,
    req: ProxyRequest,
) -> ApiResult<Json<Value>> {
    validate_endpoint(&req.endpoint)?;
    let method = match mode {
        RelayMode::Query => {
            let method = parse_method(req.method.as_deref(), Method::GET)?;
            if method != Method::GET {
                return Err(ApiError::bad_request("query only supports GET; use action"));
            }
            method
        }
        RelayMode::Action => parse_method(req.method.as_deref(), Method::POST)?,
    };

    let integration = load_owned(&state, current.user.id, &req.integration_id)?;
    if integration.kind != kind {
        return Err(ApiError::bad_request(format!(
            "integration {} is not a {} integration",
            integration.id, kind
        )));
    }

    debug!(
        "User {} relaying {} {} to {}",
        current.user.id, method, req.endpoint, integration.id
    );
    let body = if method == Method::GET { None } else { req.body };
    let value = state
        .upstream
        .relay(&integration, method, &req.endpoint, body)
        .await?;
    Ok(Json(value))
}

pub async fn proxmox_query_handler(
    State(state): State<SharedState>,
    Extension(current): Extension<CurrentUser>,
    ApiJson(req): ApiJson<ProxyRequest>,
) -> ApiResult<Json<Value>> {
    relay(state, current, IntegrationKind::Proxmox, RelayMode::Query, req).await
}

pub async fn proxmox_action_handler(
    State(state): State<SharedState>,
    Extension(current): Extension<CurrentUser>,
    ApiJson(req): ApiJson<ProxyRequest>,
) -> ApiResult<Json<Value>> {
    relay(state, current, IntegrationKind::Proxmox, RelayMode::Action, req).await
}

pub async fn adguard_query_handler(
    State(state): State<SharedState>,
    Extension(current): Extension<CurrentUser>,
    ApiJson(req): ApiJson<ProxyRequest>,
) -> ApiResult<Json<Value>> {
    relay(state, current, IntegrationKind::AdGuard, RelayMode::Query, req).await
}

pub async fn adguard_action_handler(
    State(state): State<SharedState>,
    Extension(current): Extension<CurrentUser>,
    ApiJson(req): ApiJson<ProxyRequest>,
) -> ApiResult<Json<Value>> {
    relay(state, current, IntegrationKind::AdGuard, RelayMode::Action, req).await
}

pub async fn npm_query_handler(
    State(state): State<SharedState>,
    Extension(current): Extension<CurrentUser>,
    ApiJson(req): ApiJson<ProxyRequest>,
) -> ApiResult<Json<Value>> {
    relay(state, current, IntegrationKind::NginxProxyManager, RelayMode::Query, req).await
}

pub async fn npm_action_handler(
    State(state): State<SharedState>,
    Extension(current): Extension<CurrentUser>,
    ApiJson(req): ApiJson<ProxyRequest>,
) -> ApiResult<Json<Value>> {
    relay(state, current, IntegrationKind::NginxProxyManager, RelayMode::Action, req).await
}
