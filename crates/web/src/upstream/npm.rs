//! Nginx Proxy Manager API client.
//!
//! NPM issues short-lived bearer tokens from `POST /api/tokens`. Tokens are
//! cached per integration and refreshed shortly before they expire, or
//! immediately when the cached credentials no longer match the stored ones.

use super::{http_scheme, send_json, Upstream, UpstreamError, UpstreamResult};
use chrono::{DateTime, NaiveDateTime, Utc};
use nexus_common::NginxProxyManagerConfig;
use parking_lot::Mutex;
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::{debug, info};

/// Certificates expiring within this many days are flagged.
const CERT_EXPIRY_WARN_DAYS: i64 = 14;

/// Assumed lifetime when NPM omits or mangles `expires`.
const FALLBACK_TOKEN_TTL_SECS: i64 = 60 * 60;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
    #[serde(default)]
    expires: Option<String>,
}

#[derive(Clone)]
struct CachedToken {
    token: String,
    expires_at: i64,
    credentials: NginxProxyManagerConfig,
}

/// Per-integration NPM bearer tokens.
pub struct NpmTokenCache {
    tokens: Mutex<HashMap<String, CachedToken>>,
    refresh_margin_secs: i64,
}

impl NpmTokenCache {
    pub fn new(refresh_margin_secs: i64) -> Self {
        Self {
            tokens: Mutex::new(HashMap::new()),
            refresh_margin_secs,
        }
    }

    fn get(&self, integration_id: &str, credentials: &NginxProxyManagerConfig) -> Option<String> {
        let tokens = self.tokens.lock();
        let cached = tokens.get(integration_id)?;
        let fresh = cached.expires_at - self.refresh_margin_secs > Utc::now().timestamp();
        (fresh && cached.credentials == *credentials).then(|| cached.token.clone())
    }

    fn put(&self, integration_id: &str, credentials: &NginxProxyManagerConfig, token: String, expires_at: i64) {
        self.tokens.lock().insert(
            integration_id.to_string(),
            CachedToken {
                token,
                expires_at,
                credentials: credentials.clone(),
            },
        );
    }

    pub fn remove(&self, integration_id: &str) {
        self.tokens.lock().remove(integration_id);
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.tokens.lock().len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct NpmClient<'a> {
    http: &'a reqwest::Client,
    cache: &'a NpmTokenCache,
    cfg: &'a NginxProxyManagerConfig,
    integration_id: Option<&'a str>,
    base: String,
}

impl<'a> NpmClient<'a> {
    pub fn new(
        upstream: &'a Upstream,
        cfg: &'a NginxProxyManagerConfig,
        integration_id: Option<&'a str>,
    ) -> Self {
        let base = format!("{}://{}:{}", http_scheme(cfg.https), cfg.host.trim(), cfg.port);
        Self::with_base_url(upstream, cfg, integration_id, base)
    }

    pub fn with_base_url(
        upstream: &'a Upstream,
        cfg: &'a NginxProxyManagerConfig,
        integration_id: Option<&'a str>,
        base: String,
    ) -> Self {
        Self {
            http: upstream.http(),
            cache: upstream.npm_tokens(),
            cfg,
            integration_id,
            base: base.trim_end_matches('/').to_string(),
        }
    }

    /// Log in and return `(token, expires_at)`.
    async fn login(&self) -> UpstreamResult<(String, i64)> {
        let url = format!("{}/api/tokens", self.base);
        let req = self.http.post(&url).json(&json!({
            "identity": self.cfg.email,
            "secret": self.cfg.password,
        }));

        let value = match send_json(req).await {
            Ok(v) => v,
            Err(UpstreamError::Status { status, body }) if status == 400 || status == 401 => {
                return Err(UpstreamError::Auth(format!("HTTP {}: {}", status, body)));
            }
            Err(e) => return Err(e),
        };
        let parsed: TokenResponse = serde_json::from_value(value)
            .map_err(|e| UpstreamError::Decode(format!("token response: {}", e)))?;

        let expires_at = parsed
            .expires
            .as_deref()
            .and_then(parse_timestamp)
            .unwrap_or_else(|| Utc::now().timestamp() + FALLBACK_TOKEN_TTL_SECS);
        Ok((parsed.token, expires_at))
    }

    async fn token(&self) -> UpstreamResult<String> {
        if let Some(id) = self.integration_id {
            if let Some(token) = self.cache.get(id, self.cfg) {
                return Ok(token);
            }
        }

        let (token, expires_at) = self.login().await?;
        if let Some(id) = self.integration_id {
            debug!("Cached NPM token for {} until {}", id, expires_at);
            self.cache.put(id, self.cfg, token.clone(), expires_at);
        }
        Ok(token)
    }

    /// Authenticated call. A 401 with a cached token triggers one fresh login.
    pub async fn request(&self, method: Method, endpoint: &str, body: Option<Value>) -> UpstreamResult<Value> {
        let url = format!("{}{}", self.base, endpoint);
        debug!("npm {} {}", method, url);

        let build = |token: &str| {
            let mut req = self.http.request(method.clone(), &url).bearer_auth(token);
            if let Some(body) = &body {
                req = req.json(body);
            }
            req
        };

        let token = self.token().await?;
        match send_json(build(&token)).await {
            Err(UpstreamError::Status { status, .. })
                if status == StatusCode::UNAUTHORIZED.as_u16() && self.integration_id.is_some() =>
            {
                if let Some(id) = self.integration_id {
                    info!("NPM rejected cached token for {}, logging in again", id);
                    self.cache.remove(id);
                }
                let token = self.token().await?;
                send_json(build(&token)).await
            }
            other => other,
        }
    }

    pub async fn test(&self) -> UpstreamResult<()> {
        self.login().await.map(|_| ())
    }

    pub async fn summary(&self) -> UpstreamResult<Value> {
        // Warm the cache so both calls below share one login.
        self.token().await?;
        let (hosts, certs) = tokio::join!(
            self.request(Method::GET, "/api/nginx/proxy-hosts", None),
            self.request(Method::GET, "/api/nginx/certificates", None),
        );
        let (hosts, certs) = (hosts?, certs?);
        let hosts = hosts.as_array().cloned().unwrap_or_default();
        let certs = certs.as_array().cloned().unwrap_or_default();

        let enabled = hosts.iter().filter(|h| is_enabled(h)).count();
        let now = Utc::now().timestamp();
        let soon = now + CERT_EXPIRY_WARN_DAYS * 24 * 60 * 60;
        let expiring = certs
            .iter()
            .filter_map(|c| c.get("expires_on").and_then(Value::as_str).and_then(parse_timestamp))
            .filter(|exp| *exp <= soon)
            .count();

        let host_list: Vec<Value> = hosts
            .iter()
            .map(|h| {
                json!({
                    "id": h.get("id").cloned().unwrap_or(Value::Null),
                    "domains": h.get("domain_names").cloned().unwrap_or_else(|| json!([])),
                    "enabled": is_enabled(h),
                    "forward": format!(
                        "{}:{}",
                        h.get("forward_host").and_then(Value::as_str).unwrap_or_default(),
                        h.get("forward_port").and_then(Value::as_u64).unwrap_or(0)
                    ),
                })
            })
            .collect();

        Ok(json!({
            "proxy_hosts": hosts.len(),
            "enabled_hosts": enabled,
            "disabled_hosts": hosts.len() - enabled,
            "certificates": certs.len(),
            "certificates_expiring": expiring,
            "hosts": host_list,
        }))
    }
}

/// NPM reports `enabled` as a bool or as 0/1.
fn is_enabled(host: &Value) -> bool {
    match host.get("enabled") {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_i64().unwrap_or(0) != 0,
        _ => false,
    }
}

/// RFC 3339 (`expires` on tokens) or `YYYY-MM-DD HH:MM:SS` UTC (`expires_on`).
fn parse_timestamp(s: &str) -> Option<i64> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp());
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|dt| dt.and_utc().timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_common::config::UpstreamConfig;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config() -> NginxProxyManagerConfig {
        NginxProxyManagerConfig {
            host: "127.0.0.1".into(),
            port: 81,
            email: "admin@example.com".into(),
            password: "changeme".into(),
            https: false,
        }
    }

    fn far_future() -> String {
        (Utc::now() + chrono::Duration::days(1)).to_rfc3339()
    }

    #[test]
    fn test_parse_timestamp_formats() {
        assert_eq!(parse_timestamp("1970-01-01T00:01:00Z"), Some(60));
        assert_eq!(parse_timestamp("1970-01-01 00:02:00"), Some(120));
        assert_eq!(parse_timestamp("soon"), None);
    }

    #[tokio::test]
    async fn test_token_is_cached_per_integration() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/tokens"))
            .and(body_json(json!({"identity": "admin@example.com", "secret": "changeme"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "token": "tok-1", "expires": far_future()
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/nginx/proxy-hosts"))
            .and(header("authorization", "Bearer tok-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": 1, "domain_names": ["a.lan"], "enabled": 1, "forward_host": "10.0.0.2", "forward_port": 8080},
                {"id": 2, "domain_names": ["b.lan"], "enabled": false}
            ])))
            .mount(&server)
            .await;
        let soon = (Utc::now() + chrono::Duration::days(3)).format("%Y-%m-%d %H:%M:%S").to_string();
        let later = (Utc::now() + chrono::Duration::days(60)).format("%Y-%m-%d %H:%M:%S").to_string();
        Mock::given(method("GET"))
            .and(path("/api/nginx/certificates"))
            .and(header("authorization", "Bearer tok-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": 1, "expires_on": soon},
                {"id": 2, "expires_on": later}
            ])))
            .mount(&server)
            .await;

        let upstream = Upstream::new(&UpstreamConfig::default()).unwrap();
        let cfg = config();
        let client = NpmClient::with_base_url(&upstream, &cfg, Some("npm-1"), server.uri());

        let summary = client.summary().await.unwrap();
        assert_eq!(summary["proxy_hosts"], 2);
        assert_eq!(summary["enabled_hosts"], 1);
        assert_eq!(summary["disabled_hosts"], 1);
        assert_eq!(summary["certificates"], 2);
        assert_eq!(summary["certificates_expiring"], 1);
        assert_eq!(summary["hosts"][0]["forward"], "10.0.0.2:8080");

        // Second round reuses the cached token; the mock expects one login.
        client.summary().await.unwrap();
        assert_eq!(upstream.npm_tokens().len(), 1);
    }

    #[tokio::test]
    async fn test_bad_credentials_are_an_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/tokens"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": {"message": "Invalid password"}})))
            .mount(&server)
            .await;

        let upstream = Upstream::new(&UpstreamConfig::default()).unwrap();
        let cfg = config();
        let client = NpmClient::with_base_url(&upstream, &cfg, None, server.uri());
        assert!(matches!(client.test().await, Err(UpstreamError::Auth(_))));
        assert!(upstream.npm_tokens().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_token_triggers_one_relogin() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/tokens"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "token": "tok-1", "expires": far_future()
            })))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/tokens"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "token": "tok-2", "expires": far_future()
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/nginx/proxy-hosts"))
            .and(header("authorization", "Bearer tok-1"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/nginx/proxy-hosts"))
            .and(header("authorization", "Bearer tok-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 7}])))
            .expect(1)
            .mount(&server)
            .await;

        let upstream = Upstream::new(&UpstreamConfig::default()).unwrap();
        let cfg = config();
        let client = NpmClient::with_base_url(&upstream, &cfg, Some("npm-1"), server.uri());

        let hosts = client.request(Method::GET, "/api/nginx/proxy-hosts", None).await.unwrap();
        assert_eq!(hosts[0]["id"], 7);
        assert_eq!(upstream.npm_tokens().get("npm-1", &cfg).as_deref(), Some("tok-2"));

        let logins = server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .filter(|r| r.url.path() == "/api/tokens")
            .count();
        assert_eq!(logins, 2);
    }

    #[tokio::test]
    async fn test_rejection_without_integration_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/tokens"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "token": "tok-1", "expires": far_future()
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/nginx/proxy-hosts"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let upstream = Upstream::new(&UpstreamConfig::default()).unwrap();
        let cfg = config();
        let client = NpmClient::with_base_url(&upstream, &cfg, None, server.uri());
        let err = client.request(Method::GET, "/api/nginx/proxy-hosts", None).await.unwrap_err();
        assert!(matches!(err, UpstreamError::Status { status: 401, .. }));
    }

    #[test]
    fn test_changed_credentials_bypass_cache() {
        let cache = NpmTokenCache::new(300);
        let cfg = config();
        let expires = Utc::now().timestamp() + 3600;
        cache.put("npm-1", &cfg, "tok".into(), expires);
        assert_eq!(cache.get("npm-1", &cfg).as_deref(), Some("tok"));

        let mut changed = cfg.clone();
        changed.password = "new".into();
        assert!(cache.get("npm-1", &changed).is_none());

        cache.put("npm-2", &cfg, "old".into(), Utc::now().timestamp() + 60);
        assert!(cache.get("npm-2", &cfg).is_none(), "inside refresh margin");
    }
}
