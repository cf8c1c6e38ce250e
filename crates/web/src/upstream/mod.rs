//! Outbound clients for the vendor APIs tiles poll.
//!
//! Every call is made with credentials loaded from a stored integration;
//! the browser only ever names the integration and a relative endpoint.

pub mod adguard;
pub mod npm;
pub mod proxmox;

use nexus_common::config::UpstreamConfig;
use nexus_common::{Integration, IntegrationConfig};
use reqwest::{Method, RequestBuilder};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

pub use adguard::AdGuardClient;
pub use npm::{NpmClient, NpmTokenCache};
pub use proxmox::ProxmoxClient;

/// Longest upstream error body echoed back to the caller.
const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("unsupported method: {0}")]
    InvalidMethod(String),

    #[error("upstream returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("upstream request timed out")]
    Timeout,

    #[error("could not reach upstream: {0}")]
    Connect(String),

    #[error("upstream authentication failed: {0}")]
    Auth(String),

    #[error("unexpected upstream response: {0}")]
    Decode(String),

    #[error("upstream request failed: {0}")]
    Request(String),
}

impl From<reqwest::Error> for UpstreamError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            UpstreamError::Timeout
        } else if e.is_connect() {
            UpstreamError::Connect(e.to_string())
        } else if e.is_decode() {
            UpstreamError::Decode(e.to_string())
        } else {
            UpstreamError::Request(e.to_string())
        }
    }
}

pub type UpstreamResult<T> = Result<T, UpstreamError>;

/// Reject anything that is not a plain relative API path.
pub fn validate_endpoint(endpoint: &str) -> UpstreamResult<&str> {
    if !endpoint.starts_with('/') {
        return Err(UpstreamError::InvalidEndpoint("must start with '/'".into()));
    }
    if endpoint.contains("..")
        || endpoint.contains("://")
        || endpoint.contains('#')
        || endpoint.contains('\\')
        || endpoint.chars().any(|c| c.is_whitespace() || c.is_control())
    {
        return Err(UpstreamError::InvalidEndpoint(format!("'{}' is not allowed", endpoint)));
    }
    Ok(endpoint)
}

/// Parse a relay method, defaulting when absent. Only GET/POST/PUT/DELETE pass.
pub fn parse_method(method: Option<&str>, default: Method) -> UpstreamResult<Method> {
    match method.map(|m| m.trim().to_ascii_uppercase()) {
        None => Ok(default),
        Some(m) => match m.as_str() {
            "GET" => Ok(Method::GET),
            "POST" => Ok(Method::POST),
            "PUT" => Ok(Method::PUT),
            "DELETE" => Ok(Method::DELETE),
            _ => Err(UpstreamError::InvalidMethod(m)),
        },
    }
}

/// Shared HTTP client plus per-vendor state.
pub struct Upstream {
    http: reqwest::Client,
    npm_tokens: NpmTokenCache,
}

impl Upstream {
    pub fn new(cfg: &UpstreamConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .danger_accept_invalid_certs(cfg.accept_invalid_certs)
            .user_agent(concat!("nexus/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            npm_tokens: NpmTokenCache::new(cfg.npm_token_refresh_margin_secs),
        })
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn npm_tokens(&self) -> &NpmTokenCache {
        &self.npm_tokens
    }

    /// Check that the credentials work. `integration_id` enables token caching.
    pub async fn test(
        &self,
        integration_id: Option<&str>,
        config: &IntegrationConfig,
    ) -> UpstreamResult<()> {
        match config {
            IntegrationConfig::Proxmox(c) => ProxmoxClient::new(self, c).test().await,
            IntegrationConfig::AdGuard(c) => AdGuardClient::new(self, c).test().await,
            IntegrationConfig::NginxProxyManager(c) => {
                NpmClient::new(self, c, integration_id).test().await
            }
        }
    }

    /// Vendor summary shown by a tile bound to `integration`.
    pub async fn summary(&self, integration: &Integration, node: Option<&str>) -> UpstreamResult<Value> {
        match &integration.config {
            IntegrationConfig::Proxmox(c) => ProxmoxClient::new(self, c).summary(node).await,
            IntegrationConfig::AdGuard(c) => AdGuardClient::new(self, c).summary().await,
            IntegrationConfig::NginxProxyManager(c) => {
                NpmClient::new(self, c, Some(&integration.id)).summary().await
            }
        }
    }

    /// Relay one call to the integration's API.
    pub async fn relay(
        &self,
        integration: &Integration,
        method: Method,
        endpoint: &str,
        body: Option<Value>,
    ) -> UpstreamResult<Value> {
        let endpoint = validate_endpoint(endpoint)?;
        match &integration.config {
            IntegrationConfig::Proxmox(c) => {
                ProxmoxClient::new(self, c).request(method, endpoint, body).await
            }
            IntegrationConfig::AdGuard(c) => {
                AdGuardClient::new(self, c).request(method, endpoint, body).await
            }
            IntegrationConfig::NginxProxyManager(c) => {
                NpmClient::new(self, c, Some(&integration.id))
                    .request(method, endpoint, body)
                    .await
            }
        }
    }

    /// Drop cached vendor state for an integration that changed or went away.
    pub fn forget(&self, integration_id: &str) {
        self.npm_tokens.remove(integration_id);
    }
}

/// Send a request and decode the body.
///
/// Non-2xx becomes [`UpstreamError::Status`]. Empty bodies decode to `null`
/// and non-JSON bodies (AdGuard answers some calls with plain `OK`) to a string.
pub(crate) async fn send_json(request: RequestBuilder) -> UpstreamResult<Value> {
    let response = request.send().await?;
    let status = response.status();
    let bytes = response.bytes().await?;

    if !status.is_success() {
        let mut body = String::from_utf8_lossy(&bytes).into_owned();
        if body.len() > MAX_ERROR_BODY {
            let mut cut = MAX_ERROR_BODY;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
        }
        return Err(UpstreamError::Status {
            status: status.as_u16(),
            body,
        });
    }

    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    match serde_json::from_slice(&bytes) {
        Ok(value) => Ok(value),
        Err(_) => Ok(Value::String(String::from_utf8_lossy(&bytes).trim().to_string())),
    }
}

fn http_scheme(https: bool) -> &'static str {
    if https {
        "https"
    } else {
        "http"
    }
}
