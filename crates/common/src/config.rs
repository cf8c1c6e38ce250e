//! Nexus configuration
//!
//! Loaded from a TOML file (missing file means defaults), then overridden by
//! `NEXUS_*` environment variables. Binaries apply CLI flags last.

use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NexusConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub upstream: UpstreamConfig,
}

/// HTTP listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address, e.g. 127.0.0.1:3001
    pub listen: String,

    /// Directory holding the built frontend (index.html + assets).
    pub static_dir: Option<PathBuf>,

    /// Allow cross-origin requests from any origin (frontend dev server).
    pub cors_allow_any: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:3001".to_string(),
            static_dir: None,
            cors_allow_any: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: crate::default_db_path(),
        }
    }
}

/// Account and session policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub session_ttl_secs: i64,
    pub session_sweep_secs: u64,
    pub min_password_len: usize,
    pub max_failed_logins: i64,
    pub lockout_secs: i64,
    pub registration_enabled: bool,
    pub bootstrap_admin: BootstrapAdmin,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_ttl_secs: 60 * 60 * 24 * 7, // 7 days
            session_sweep_secs: 60 * 10,
            min_password_len: 6,
            max_failed_logins: 10,
            lockout_secs: 5 * 60,
            registration_enabled: true,
            bootstrap_admin: BootstrapAdmin::default(),
        }
    }
}

/// Account created on first start when the user table is empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapAdmin {
    pub username: String,
    pub email: String,
    /// When unset a random password is generated and logged once.
    pub password: Option<String>,
}

impl Default for BootstrapAdmin {
    fn default() -> Self {
        Self {
            username: "admin".to_string(),
            email: "admin@nexus.local".to_string(),
            password: None,
        }
    }
}

/// Outbound vendor API client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub timeout_secs: u64,
    /// Homelab appliances (Proxmox in particular) ship self-signed certificates.
    pub accept_invalid_certs: bool,
    /// Refresh cached Nginx Proxy Manager tokens this long before they expire.
    pub npm_token_refresh_margin_secs: i64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            accept_invalid_certs: true,
            npm_token_refresh_margin_secs: 300,
        }
    }
}

impl NexusConfig {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    #[cfg(test)]
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply `NEXUS_*` environment overrides.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides<F>(&mut self, get: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| get(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = non_empty("NEXUS_LISTEN") {
            self.server.listen = v;
        }
        if let Some(v) = non_empty("NEXUS_STATIC_DIR") {
            self.server.static_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = non_empty("NEXUS_DB_PATH") {
            self.database.path = PathBuf::from(v);
        }
        if let Some(v) = non_empty("NEXUS_ADMIN_PASSWORD") {
            self.auth.bootstrap_admin.password = Some(v);
        }
        if let Some(v) = non_empty("NEXUS_REGISTRATION") {
            self.auth.registration_enabled = parse_bool(&v).ok_or_else(|| {
                crate::Error::InvalidConfig(format!("NEXUS_REGISTRATION: expected a boolean, got '{}'", v))
            })?;
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<()> {
        if self.auth.session_ttl_secs <= 0 {
            return Err(crate::Error::InvalidConfig("auth.session_ttl_secs must be positive".into()));
        }
        if self.auth.min_password_len == 0 {
            return Err(crate::Error::InvalidConfig("auth.min_password_len must be at least 1".into()));
        }
        if self.upstream.timeout_secs == 0 {
            return Err(crate::Error::InvalidConfig("upstream.timeout_secs must be positive".into()));
        }
        Ok(())
    }
}

fn parse_bool(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
