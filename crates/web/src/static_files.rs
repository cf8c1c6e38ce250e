//! Static file serving for the frontend bundle

use crate::error::ApiError;
use crate::server::SharedState;
use axum::{
    extract::State,
    http::{header, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use std::path::Path;

/// Router fallback: unknown `/api` paths get a JSON 404, everything else is
/// the SPA (real files first, then `index.html` for client-side routes).
pub async fn fallback_handler(State(state): State<SharedState>, uri: Uri) -> Response {
    let path = uri.path();
    if path == "/api" || path.starts_with("/api/") {
        return ApiError::not_found("no such endpoint").into_response();
    }

    let Some(dir) = state.config.server.static_dir.as_deref() else {
        return (StatusCode::NOT_FOUND, "Frontend not configured").into_response();
    };

    let rel = path.trim_start_matches('/');
    let rel = if rel.is_empty() { "index.html" } else { rel };
    let res = serve_path(dir, rel).await;
    if res.status() != StatusCode::NOT_FOUND {
        return res;
    }
    // SPA fallback: unknown routes map to index.html
    serve_path(dir, "index.html").await
}

async fn serve_path(dir: &Path, rel: &str) -> Response {
    let requested = dir.join(rel);

    // Prevent path traversal: canonicalize and ensure the requested path stays within dir.
    let Ok(canon_dir) = dir.canonicalize() else {
        return (StatusCode::INTERNAL_SERVER_ERROR, "Bad static dir").into_response();
    };
    let Ok(canon_req) = requested.canonicalize() else {
        return (StatusCode::NOT_FOUND, "Not found").into_response();
    };
    if !canon_req.starts_with(&canon_dir) {
        return (StatusCode::FORBIDDEN, "Forbidden").into_response();
    }
    if !canon_req.is_file() {
        return (StatusCode::NOT_FOUND, "Not found").into_response();
    }

    match tokio::fs::read(&canon_req).await {
        Ok(bytes) => {
            let mime = mime_guess::from_path(&canon_req).first_or_octet_stream();
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, mime.essence_str().to_string())],
                bytes,
            )
                .into_response()
        }
        Err(_) => (StatusCode::NOT_FOUND, "Not found").into_response(),
    }
}
