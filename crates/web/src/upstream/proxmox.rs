//! Proxmox VE API client (API token auth).

use super::{http_scheme, send_json, Upstream, UpstreamError, UpstreamResult};
use nexus_common::layout::validate_node_name;
use nexus_common::ProxmoxConfig;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::debug;

pub struct ProxmoxClient<'a> {
    http: &'a reqwest::Client,
    base: String,
    auth: String,
}

impl<'a> ProxmoxClient<'a> {
    pub fn new(upstream: &'a Upstream, cfg: &ProxmoxConfig) -> Self {
        let base = format!("{}://{}:{}/api2/json", http_scheme(cfg.https), cfg.host.trim(), cfg.port);
        Self::with_base_url(upstream, cfg, base)
    }

    pub fn with_base_url(upstream: &'a Upstream, cfg: &ProxmoxConfig, base: String) -> Self {
        Self {
            http: upstream.http(),
            base: base.trim_end_matches('/').to_string(),
            auth: format!("PVEAPIToken={}={}", cfg.token_id.trim(), cfg.token_secret),
        }
    }

    /// Call an API path and unwrap the `data` envelope.
    pub async fn request(&self, method: Method, endpoint: &str, body: Option<Value>) -> UpstreamResult<Value> {
        let url = format!("{}{}", self.base, endpoint);
        debug!("proxmox {} {}", method, url);

        let mut req = self
            .http
            .request(method, &url)
            .header(reqwest::header::AUTHORIZATION, &self.auth);
        if let Some(body) = body {
            req = req.json(&body);
        }

        let value = send_json(req).await?;
        Ok(match value {
            Value::Object(mut map) if map.contains_key("data") => map.remove("data").unwrap_or(Value::Null),
            other => other,
        })
    }

    async fn get(&self, endpoint: &str) -> UpstreamResult<Value> {
        self.request(Method::GET, endpoint, None).await
    }

    pub async fn test(&self) -> UpstreamResult<()> {
        self.get("/nodes").await.map(|_| ())
    }

    /// Node names, sorted.
    pub async fn nodes(&self) -> UpstreamResult<Vec<String>> {
        let nodes = self.get("/nodes").await?;
        let mut names: Vec<String> = nodes
            .as_array()
            .ok_or_else(|| UpstreamError::Decode("/nodes is not a list".into()))?
            .iter()
            .filter_map(|n| n.get("node").and_then(Value::as_str).map(str::to_string))
            .collect();
        names.sort();
        Ok(names)
    }

    /// Node load plus its guests. Uses the first node when none is bound.
    pub async fn summary(&self, node: Option<&str>) -> UpstreamResult<Value> {
        let node = match node.filter(|n| !n.trim().is_empty()) {
            Some(n) => n.trim().to_string(),
            None => self
                .nodes()
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| UpstreamError::Decode("cluster reports no nodes".into()))?,
        };
        validate_node_name(&node).map_err(|e| UpstreamError::InvalidEndpoint(e.to_string()))?;

        let status_path = format!("/nodes/{}/status", node);
        let qemu_path = format!("/nodes/{}/qemu", node);
        let lxc_path = format!("/nodes/{}/lxc", node);
        let (status, qemu, lxc) = tokio::join!(
            self.get(&status_path),
            self.get(&qemu_path),
            self.get(&lxc_path),
        );
        let status = status?;

        // A node without containers (or without the permission to list them)
        // still gets a tile.
        let mut guests = Vec::new();
        for (kind, list) in [("qemu", qemu), ("lxc", lxc)] {
            match list {
                Ok(Value::Array(items)) => guests.extend(items.iter().map(|g| guest_summary(kind, g))),
                Ok(_) => {}
                Err(e) => debug!("proxmox {} list on {} failed: {}", kind, node, e),
            }
        }
        guests.sort_by_key(|g| g["vmid"].as_u64().unwrap_or(u64::MAX));

        let running = guests.iter().filter(|g| g["status"] == "running").count();
        let mem_used = status.pointer("/memory/used").and_then(Value::as_u64).unwrap_or(0);
        let mem_total = status.pointer("/memory/total").and_then(Value::as_u64).unwrap_or(0);

        Ok(json!({
            "node": node,
            "cpu_percent": round1(status.get("cpu").and_then(Value::as_f64).unwrap_or(0.0) * 100.0),
            "memory": {
                "used": mem_used,
                "total": mem_total,
                "percent": percent(mem_used, mem_total),
            },
            "uptime": status.get("uptime").and_then(Value::as_u64).unwrap_or(0),
            "guests_running": running,
            "guests_total": guests.len(),
            "guests": guests,
        }))
    }
}

fn guest_summary(kind: &str, guest: &Value) -> Value {
    let vmid = guest
        .get("vmid")
        .and_then(|v| v.as_u64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
        .unwrap_or(0);
    json!({
        "vmid": vmid,
        "name": guest.get("name").and_then(Value::as_str).unwrap_or_default(),
        "type": kind,
        "status": guest.get("status").and_then(Value::as_str).unwrap_or("unknown"),
        "cpu_percent": round1(guest.get("cpu").and_then(Value::as_f64).unwrap_or(0.0) * 100.0),
        "mem": guest.get("mem").and_then(Value::as_u64).unwrap_or(0),
        "maxmem": guest.get("maxmem").and_then(Value::as_u64).unwrap_or(0),
    })
}

pub(crate) fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

pub(crate) fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        round1(part as f64 * 100.0 / whole as f64)
    }
}
