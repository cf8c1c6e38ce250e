//! Account API: status, register, login, logout, profile.

use super::CurrentUser;
use crate::error::{ApiError, ApiJson, ApiResult};
use crate::server::SharedState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Extension, Json};
use nexus_common::accounts::{validate_email, validate_password, validate_username};
use nexus_common::crypto::{generate_token, hash_password, hash_token, verify_password};
use nexus_common::{Error, User};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, warn};

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Username or email address
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileRequest {
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub current_password: Option<String>,
    #[serde(default)]
    pub new_password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: User,
    pub token: String,
    pub expires_at: i64,
}

/// Issue a session for `user` and return the raw token with its expiry.
fn issue_session(state: &SharedState, user: &User) -> ApiResult<(String, i64)> {
    let token = generate_token();
    let session = state
        .db
        .create_session(user.id, &hash_token(&token), state.config.auth.session_ttl_secs)?;
    Ok((token, session.expires_at))
}

/// Run argon2 work on the blocking pool.
async fn run_blocking<T, F>(f: F) -> ApiResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> nexus_common::Result<T> + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => Ok(result?),
        Err(e) => {
            error!("password hashing task failed: {}", e);
            Err(ApiError::internal())
        }
    }
}

async fn hash_blocking(password: String) -> ApiResult<String> {
    run_blocking(move || hash_password(&password)).await
}

async fn verify_blocking(password: String, phc: String) -> ApiResult<bool> {
    run_blocking(move || verify_password(&password, &phc)).await
}

/// Count a failed password check against `user_id`, logging when it locks.
fn record_failure(state: &SharedState, user_id: i64) -> ApiResult<()> {
    let auth = &state.config.auth;
    match state
        .db
        .record_failed_login(user_id, auth.max_failed_logins, auth.lockout_secs)?
    {
        Some(until) => warn!("Locked user {} until {} after repeated failures", user_id, until),
        None => info!("Password check failed for user {}", user_id),
    }
    Ok(())
}

// ============================================================================
// Public handlers
// ============================================================================

pub async fn status_handler(State(state): State<SharedState>) -> ApiResult<impl IntoResponse> {
    let user_count = state.db.count_users()?;
    Ok(Json(json!({
        "needs_setup": user_count == 0,
        "user_count": user_count,
        "registration_enabled": state.config.auth.registration_enabled,
    })))
}

pub async fn register_handler(
    State(state): State<SharedState>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> ApiResult<impl IntoResponse> {
    // The very first account may always be created.
    if !state.config.auth.registration_enabled && state.db.count_users()? > 0 {
        return Err(ApiError::forbidden("registration is disabled"));
    }

    let username = validate_username(&req.username)?;
    let email = validate_email(&req.email)?;
    validate_password(&req.password, state.config.auth.min_password_len)?;

    let user = state
        .db
        .create_user(&username, &email, &hash_blocking(req.password).await?, false)?;
    let (token, expires_at) = issue_session(&state, &user)?;

    info!("Registered user {} ({})", user.username, user.id);
    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            user,
            token,
            expires_at,
        }),
    ))
}

pub async fn login_handler(
    State(state): State<SharedState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    let identifier = req.username.trim();
    if identifier.is_empty() || req.password.is_empty() {
        return Err(ApiError::bad_request("username and password are required"));
    }

    let Some((user, password_hash)) = state.db.find_login(identifier)? else {
        // Unknown accounts pay the same argon2 cost as known ones.
        verify_blocking(req.password, state.dummy_password_hash.clone()).await?;
        info!("Login failed for unknown account '{}'", identifier);
        return Err(Error::InvalidCredentials.into());
    };

    if let Some(until) = state.db.locked_until(user.id)? {
        return Err(Error::Locked { until }.into());
    }

    if !verify_blocking(req.password, password_hash).await? {
        record_failure(&state, user.id)?;
        return Err(Error::InvalidCredentials.into());
    }

    state.db.reset_failed_logins(user.id)?;
    let (token, expires_at) = issue_session(&state, &user)?;

    info!("User {} logged in", user.id);
    Ok(Json(AuthResponse {
        user,
        token,
        expires_at,
    }))
}

// ============================================================================
// Protected handlers
// ============================================================================

pub async fn logout_handler(
    State(state): State<SharedState>,
    Extension(current): Extension<CurrentUser>,
) -> ApiResult<StatusCode> {
    state.db.delete_session(&current.token_hash)?;
    info!("User {} logged out", current.user.id);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn me_handler(Extension(current): Extension<CurrentUser>) -> impl IntoResponse {
    Json(json!({
        "user": current.user,
        "expires_at": current.expires_at,
    }))
}

pub async fn update_profile_handler(
    State(state): State<SharedState>,
    Extension(current): Extension<CurrentUser>,
    ApiJson(req): ApiJson<ProfileRequest>,
) -> ApiResult<impl IntoResponse> {
    let user_id = current.user.id;
    let username = validate_username(&req.username)?;
    let email = validate_email(&req.email)?;

    // Check the password change fully before touching anything.
    let new_hash = match req.new_password.filter(|p| !p.is_empty()) {
        Some(new_password) => {
            let current_password = req
                .current_password
                .filter(|p| !p.is_empty())
                .ok_or_else(|| ApiError::bad_request("currentPassword is required to change the password"))?;
            if let Some(until) = state.db.locked_until(user_id)? {
                return Err(Error::Locked { until }.into());
            }
            let stored = state
                .db
                .get_password_hash(user_id)?
                .ok_or_else(|| ApiError::unauthorized("invalid or expired session"))?;
            if !verify_blocking(current_password, stored).await? {
                record_failure(&state, user_id)?;
                return Err(ApiError::unauthorized("current password is incorrect"));
            }
            state.db.reset_failed_logins(user_id)?;
            validate_password(&new_password, state.config.auth.min_password_len)?;
            Some(hash_blocking(new_password).await?)
        }
        None => None,
    };

    let mut user = state.db.update_profile(user_id, &username, &email)?;

    if let Some(hash) = new_hash {
        state.db.set_password(user_id, &hash, false)?;
        let revoked = state.db.delete_other_sessions(user_id, &current.token_hash)?;
        user.must_change_password = false;
        info!("User {} changed password, revoked {} other sessions", user_id, revoked);
    }

    Ok(Json(json!({ "user": user })))
}
