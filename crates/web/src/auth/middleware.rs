//! Authentication middleware for Axum.

use crate::error::ApiError;
use crate::server::SharedState;
use axum::{
    extract::Request,
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use nexus_common::crypto::hash_token;
use nexus_common::User;
use tracing::warn;

/// Extension holding the caller's account and session.
#[derive(Clone, Debug)]
pub struct CurrentUser {
    pub user: User,
    pub token_hash: String,
    pub expires_at: i64,
}

pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Resolve the bearer token to a live session and its user.
pub fn authenticate(state: &SharedState, headers: &HeaderMap) -> Result<CurrentUser, ApiError> {
    let token = extract_token(headers).ok_or_else(|| ApiError::unauthorized("missing bearer token"))?;
    let token_hash = hash_token(&token);

    let Some(session) = state.db.get_session(&token_hash)? else {
        // Expired rows are filtered out by the lookup; drop them on sight.
        state.db.delete_session(&token_hash)?;
        return Err(ApiError::unauthorized("invalid or expired session"));
    };

    let user = state
        .db
        .get_user(session.user_id)?
        .ok_or_else(|| ApiError::unauthorized("invalid or expired session"))?;

    if let Err(e) = state.db.touch_session(&token_hash) {
        warn!("failed to touch session for user {}: {}", user.id, e);
    }

    Ok(CurrentUser {
        user,
        token_hash,
        expires_at: session.expires_at,
    })
}

/// Middleware that requires authentication
pub async fn auth_middleware(state: SharedState, mut req: Request, next: Next) -> Response {
    match authenticate(&state, req.headers()) {
        Ok(current) => {
            req.extensions_mut().insert(current);
            next.run(req).await
        }
        Err(e) => e.into_response(),
    }
}
