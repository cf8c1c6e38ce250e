//! Core types for users, integrations and dashboards

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Placeholder returned in place of stored secrets.
pub const REDACTED: &str = "********";

// ============================================================================
// Users
// ============================================================================

/// Public view of a user account. Never carries the password hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub must_change_password: bool,
    pub created_at: i64,
}

/// Session data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub token_hash: String,
    pub user_id: i64,
    pub created_at: i64,
    pub expires_at: i64,
    pub last_seen_at: i64,
}

// ============================================================================
// Integrations
// ============================================================================

/// Supported third-party services
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntegrationKind {
    #[serde(rename = "proxmox")]
    Proxmox,
    #[serde(rename = "adguard")]
    AdGuard,
    #[serde(rename = "nginx-proxy-manager")]
    NginxProxyManager,
}

impl IntegrationKind {
    pub const ALL: [IntegrationKind; 3] = [
        IntegrationKind::Proxmox,
        IntegrationKind::AdGuard,
        IntegrationKind::NginxProxyManager,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Proxmox => "proxmox",
            Self::AdGuard => "adguard",
            Self::NginxProxyManager => "nginx-proxy-manager",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Proxmox => "Proxmox",
            Self::AdGuard => "AdGuard Home",
            Self::NginxProxyManager => "Nginx Proxy Manager",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            Self::Proxmox => 8006,
            Self::AdGuard => 80,
            Self::NginxProxyManager => 81,
        }
    }
}

impl std::fmt::Display for IntegrationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for IntegrationKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "proxmox" => Ok(Self::Proxmox),
            "adguard" => Ok(Self::AdGuard),
            "nginx-proxy-manager" => Ok(Self::NginxProxyManager),
            _ => Err(format!("unknown integration type: {}", s)),
        }
    }
}

/// Proxmox VE API token credentials
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxmoxConfig {
    pub host: String,
    #[serde(default = "default_proxmox_port", deserialize_with = "de_port")]
    pub port: u16,
    pub token_id: String,
    pub token_secret: String,
    /// Plain HTTP only for installs behind a TLS-terminating proxy.
    #[serde(default = "default_true")]
    pub https: bool,
}

/// AdGuard Home basic-auth credentials
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdGuardConfig {
    pub host: String,
    #[serde(default = "default_adguard_port", deserialize_with = "de_port")]
    pub port: u16,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub https: bool,
}

/// Nginx Proxy Manager login credentials
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NginxProxyManagerConfig {
    pub host: String,
    #[serde(default = "default_npm_port", deserialize_with = "de_port")]
    pub port: u16,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub https: bool,
}

fn default_true() -> bool {
    true
}

fn default_proxmox_port() -> u16 {
    IntegrationKind::Proxmox.default_port()
}

fn default_adguard_port() -> u16 {
    IntegrationKind::AdGuard.default_port()
}

fn default_npm_port() -> u16 {
    IntegrationKind::NginxProxyManager.default_port()
}

/// Browser forms send ports as strings ("8006"); accept both.
fn de_port<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum PortRepr {
        Num(u64),
        Str(String),
    }

    let port = match PortRepr::deserialize(deserializer)? {
        PortRepr::Num(n) => n,
        PortRepr::Str(s) => s
            .trim()
            .parse::<u64>()
            .map_err(|_| D::Error::custom(format!("invalid port '{}'", s)))?,
    };
    if port == 0 || port > u16::MAX as u64 {
        return Err(D::Error::custom(format!("port {} out of range", port)));
    }
    Ok(port as u16)
}

/// Kind-specific credential bundle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum IntegrationConfig {
    Proxmox(ProxmoxConfig),
    AdGuard(AdGuardConfig),
    NginxProxyManager(NginxProxyManagerConfig),
}

impl IntegrationConfig {
    /// Parse a config payload for a known kind. The kind decides the shape,
    /// so an untagged guess is never needed.
    pub fn from_value(kind: IntegrationKind, value: serde_json::Value) -> crate::Result<Self> {
        let config = Self::from_value_unchecked(kind, value)?;
        config.validate()?;
        Ok(config)
    }

    pub fn kind(&self) -> IntegrationKind {
        match self {
            Self::Proxmox(_) => IntegrationKind::Proxmox,
            Self::AdGuard(_) => IntegrationKind::AdGuard,
            Self::NginxProxyManager(_) => IntegrationKind::NginxProxyManager,
        }
    }

    pub fn host(&self) -> &str {
        match self {
            Self::Proxmox(c) => &c.host,
            Self::AdGuard(c) => &c.host,
            Self::NginxProxyManager(c) => &c.host,
        }
    }

    pub fn port(&self) -> u16 {
        match self {
            Self::Proxmox(c) => c.port,
            Self::AdGuard(c) => c.port,
            Self::NginxProxyManager(c) => c.port,
        }
    }

    pub fn validate(&self) -> crate::Result<()> {
        let host = self.host().trim();
        if host.is_empty() {
            return Err(crate::Error::invalid("host is required"));
        }
        if host.contains("://") || host.contains('/') || host.chars().any(char::is_whitespace) {
            return Err(crate::Error::invalid(
                "host must be a bare hostname or IP address",
            ));
        }
        let missing = match self {
            Self::Proxmox(c) if c.token_id.trim().is_empty() => Some("tokenId"),
            Self::Proxmox(c) if c.token_secret.is_empty() => Some("tokenSecret"),
            Self::AdGuard(c) if c.username.trim().is_empty() => Some("username"),
            Self::AdGuard(c) if c.password.is_empty() => Some("password"),
            Self::NginxProxyManager(c) if c.email.trim().is_empty() => Some("email"),
            Self::NginxProxyManager(c) if c.password.is_empty() => Some("password"),
            _ => None,
        };
        match missing {
            Some(field) => Err(crate::Error::invalid(format!("{} is required", field))),
            None => Ok(()),
        }
    }

    /// Copy with every secret replaced by [`REDACTED`].
    pub fn redacted(&self) -> Self {
        let mut out = self.clone();
        match &mut out {
            Self::Proxmox(c) => c.token_secret = REDACTED.to_string(),
            Self::AdGuard(c) => c.password = REDACTED.to_string(),
            Self::NginxProxyManager(c) => c.password = REDACTED.to_string(),
        }
        out
    }

    /// Keep the stored secret when the incoming one is empty or redacted.
    pub fn merge_secrets_from(&mut self, existing: &IntegrationConfig) {
        fn keep(incoming: &mut String, stored: &str) {
            if incoming.is_empty() || incoming == REDACTED {
                *incoming = stored.to_string();
            }
        }
        match (self, existing) {
            (Self::Proxmox(new), Self::Proxmox(old)) => keep(&mut new.token_secret, &old.token_secret),
            (Self::AdGuard(new), Self::AdGuard(old)) => keep(&mut new.password, &old.password),
            (Self::NginxProxyManager(new), Self::NginxProxyManager(old)) => {
                keep(&mut new.password, &old.password)
            }
            _ => {}
        }
    }

    /// Parse without validation, for secret merging before validating.
    pub fn from_value_unchecked(
        kind: IntegrationKind,
        value: serde_json::Value,
    ) -> crate::Result<Self> {
        fn parse<T: serde::de::DeserializeOwned>(value: serde_json::Value) -> crate::Result<T> {
            serde_json::from_value(value).map_err(|e| crate::Error::invalid(e.to_string()))
        }
        Ok(match kind {
            IntegrationKind::Proxmox => Self::Proxmox(parse(value)?),
            IntegrationKind::AdGuard => Self::AdGuard(parse(value)?),
            IntegrationKind::NginxProxyManager => Self::NginxProxyManager(parse(value)?),
        })
    }
}

/// A named, typed credential bundle owned by one user.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Integration {
    pub id: String,
    #[serde(skip)]
    pub user_id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: IntegrationKind,
    pub config: IntegrationConfig,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Integration {
    pub fn redacted(&self) -> Self {
        Self {
            config: self.config.redacted(),
            ..self.clone()
        }
    }
}

// ============================================================================
// Dashboards
// ============================================================================

/// A positioned, sized cell on the dashboard grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tile {
    pub i: String,
    pub x: u32,
    /// `None` means "append below the lowest tile" (the browser sends
    /// `Infinity`, which JSON serializes as `null`).
    pub y: Option<u32>,
    pub w: u32,
    pub h: u32,
    #[serde(default)]
    pub title: String,
    #[serde(rename = "type")]
    pub widget_type: String,
}

/// Which integration (and, for Proxmox, which node) a tile polls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceBinding {
    pub integration_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
}

/// The per-user dashboard blob.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardConfig {
    #[serde(default)]
    pub tiles: Vec<Tile>,
    #[serde(default)]
    pub service_configs: BTreeMap<String, ServiceBinding>,
}

impl DashboardConfig {
    pub fn tile(&self, id: &str) -> Option<&Tile> {
        self.tiles.iter().find(|t| t.i == id)
    }
}
