//! AdGuard Home API client (HTTP basic auth).

use super::proxmox::{percent, round1};
use super::{http_scheme, send_json, Upstream, UpstreamResult};
use nexus_common::AdGuardConfig;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::debug;

/// Entries kept from each "top" list.
const TOP_LIMIT: usize = 10;

pub struct AdGuardClient<'a> {
    http: &'a reqwest::Client,
    base: String,
    username: String,
    password: String,
}

impl<'a> AdGuardClient<'a> {
    pub fn new(upstream: &'a Upstream, cfg: &AdGuardConfig) -> Self {
        let base = format!("{}://{}:{}", http_scheme(cfg.https), cfg.host.trim(), cfg.port);
        Self::with_base_url(upstream, cfg, base)
    }

    pub fn with_base_url(upstream: &'a Upstream, cfg: &AdGuardConfig, base: String) -> Self {
        Self {
            http: upstream.http(),
            base: base.trim_end_matches('/').to_string(),
            username: cfg.username.clone(),
            password: cfg.password.clone(),
        }
    }

    pub async fn request(&self, method: Method, endpoint: &str, body: Option<Value>) -> UpstreamResult<Value> {
        let url = format!("{}{}", self.base, endpoint);
        debug!("adguard {} {}", method, url);

        let mut req = self
            .http
            .request(method, &url)
            .basic_auth(&self.username, Some(&self.password));
        if let Some(body) = body {
            req = req.json(&body);
        }
        send_json(req).await
    }

    pub async fn test(&self) -> UpstreamResult<()> {
        self.request(Method::GET, "/control/status", None).await.map(|_| ())
    }

    pub async fn summary(&self) -> UpstreamResult<Value> {
        let (status, stats) = tokio::join!(
            self.request(Method::GET, "/control/status", None),
            self.request(Method::GET, "/control/stats", None),
        );
        let (status, stats) = (status?, stats?);

        let queries = stats.get("num_dns_queries").and_then(Value::as_u64).unwrap_or(0);
        let blocked = stats.get("num_blocked_filtering").and_then(Value::as_u64).unwrap_or(0);
        let avg_secs = stats.get("avg_processing_time").and_then(Value::as_f64).unwrap_or(0.0);

        Ok(json!({
            "protection_enabled": status.get("protection_enabled").and_then(Value::as_bool).unwrap_or(false),
            "running": status.get("running").and_then(Value::as_bool).unwrap_or(false),
            "version": status.get("version").and_then(Value::as_str).unwrap_or_default(),
            "dns_queries": queries,
            "blocked": blocked,
            "block_ratio": percent(blocked, queries),
            "avg_processing_ms": round1(avg_secs * 1000.0),
            "top_queried_domains": flatten_top(stats.get("top_queried_domains")),
            "top_blocked_domains": flatten_top(stats.get("top_blocked_domains")),
            "top_clients": flatten_top(stats.get("top_clients")),
        }))
    }
}

/// `[{"example.com": 12}, ...]` into `[{"name": "example.com", "count": 12}, ...]`.
fn flatten_top(list: Option<&Value>) -> Vec<Value> {
    let Some(items) = list.and_then(Value::as_array) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(Value::as_object)
        .flat_map(|obj| obj.iter())
        .map(|(name, count)| json!({"name": name, "count": count.as_u64().unwrap_or(0)}))
        .take(TOP_LIMIT)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_common::config::UpstreamConfig;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_flatten_top() {
        let raw = json!([{"a.com": 5}, {"b.com": 3}, "junk"]);
        let flat = flatten_top(Some(&raw));
        assert_eq!(flat, vec![json!({"name": "a.com", "count": 5}), json!({"name": "b.com", "count": 3})]);
        assert!(flatten_top(None).is_empty());
    }

    #[tokio::test]
    async fn test_summary_uses_basic_auth_and_computes_ratio() {
        let server = MockServer::start().await;
        // admin:secret
        let auth = "Basic YWRtaW46c2VjcmV0";

        Mock::given(method("GET"))
            .and(path("/control/status"))
            .and(header("authorization", auth))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "protection_enabled": true, "running": true, "version": "v0.107.0"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/control/stats"))
            .and(header("authorization", auth))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "num_dns_queries": 200,
                "num_blocked_filtering": 50,
                "avg_processing_time": 0.0123,
                "top_queried_domains": [{"example.com": 40}],
                "top_blocked_domains": [{"ads.example": 30}]
            })))
            .mount(&server)
            .await;

        let upstream = Upstream::new(&UpstreamConfig::default()).unwrap();
        let cfg = AdGuardConfig {
            host: "127.0.0.1".into(),
            port: 80,
            username: "admin".into(),
            password: "secret".into(),
            https: false,
        };
        let client = AdGuardClient::with_base_url(&upstream, &cfg, server.uri());

        let summary = client.summary().await.unwrap();
        assert_eq!(summary["block_ratio"], 25.0);
        assert_eq!(summary["avg_processing_ms"], 12.3);
        assert_eq!(summary["protection_enabled"], true);
        assert_eq!(summary["top_blocked_domains"][0]["name"], "ads.example");
        assert_eq!(summary["top_clients"], json!([]));
    }

    #[tokio::test]
    async fn test_plain_text_reply_is_a_string() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/control/stats_reset"))
            .respond_with(ResponseTemplate::new(200).set_body_string("OK\n"))
            .mount(&server)
            .await;

        let upstream = Upstream::new(&UpstreamConfig::default()).unwrap();
        let cfg = AdGuardConfig {
            host: "127.0.0.1".into(),
            port: 80,
            username: "u".into(),
            password: "p".into(),
            https: false,
        };
        let client = AdGuardClient::with_base_url(&upstream, &cfg, server.uri());
        let reply = client.request(Method::POST, "/control/stats_reset", None).await.unwrap();
        assert_eq!(reply, json!("OK"));
    }
}
