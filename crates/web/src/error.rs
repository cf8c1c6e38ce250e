//! HTTP error responses
//!
//! Every failure leaves the API as `{"error": "..."}` plus optional extra
//! fields (`locked_until`, `upstream_status`).

use crate::upstream::UpstreamError;
use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{Map, Value};
use tracing::error;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    extra: Map<String, Value>,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            extra: Map::new(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.extra.insert(key.to_string(), value.into());
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<nexus_common::Error> for ApiError {
    fn from(e: nexus_common::Error) -> Self {
        use nexus_common::Error;
        match e {
            Error::NotFound { kind, .. } => ApiError::not_found(format!("{} not found", kind)),
            Error::AlreadyExists { field, .. } => ApiError::conflict(format!("{} is already taken", field)),
            Error::InvalidInput(msg) => ApiError::bad_request(msg),
            Error::InvalidCredentials => ApiError::unauthorized("invalid username or password"),
            Error::Locked { until } => {
                ApiError::new(StatusCode::TOO_MANY_REQUESTS, "too many failed logins, try again later")
                    .with("locked_until", until)
            }
            other => {
                error!("request failed: {}", other);
                ApiError::internal()
            }
        }
    }
}

impl From<UpstreamError> for ApiError {
    fn from(e: UpstreamError) -> Self {
        match e {
            UpstreamError::InvalidEndpoint(_) | UpstreamError::InvalidMethod(_) => {
                ApiError::bad_request(e.to_string())
            }
            UpstreamError::Status { status, .. } => {
                ApiError::new(StatusCode::BAD_GATEWAY, e.to_string()).with("upstream_status", status)
            }
            UpstreamError::Timeout => ApiError::new(StatusCode::GATEWAY_TIMEOUT, e.to_string()),
            _ => ApiError::new(StatusCode::BAD_GATEWAY, e.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::bad_request(rejection.body_text())
    }
}

/// `Json` extractor whose rejections use the `{"error": ...}` shape.
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = self.extra;
        body.insert("error".to_string(), Value::String(self.message));
        (self.status, Json(Value::Object(body))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_common_error_mapping() {
        let e: ApiError = nexus_common::Error::not_found("integration", "x").into();
        assert_eq!(e.status(), StatusCode::NOT_FOUND);

        let e: ApiError = nexus_common::Error::Locked { until: 42 }.into();
        assert_eq!(e.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(e.extra["locked_until"], 42);

        let e: ApiError = nexus_common::Error::Internal("boom".into()).into();
        assert_eq!(e.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(e.message(), "internal server error");
    }

    #[test]
    fn test_upstream_error_mapping() {
        let e: ApiError = UpstreamError::Status { status: 500, body: String::new() }.into();
        assert_eq!(e.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(e.extra["upstream_status"], 500);

        let e: ApiError = UpstreamError::Timeout.into();
        assert_eq!(e.status(), StatusCode::GATEWAY_TIMEOUT);

        let e: ApiError = UpstreamError::InvalidEndpoint("x".into()).into();
        assert_eq!(e.status(), StatusCode::BAD_REQUEST);
    }
}
