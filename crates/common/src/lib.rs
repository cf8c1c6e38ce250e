//! Nexus Common Library
//!
//! Shared types, storage, and configuration for the Nexus homelab dashboard.

pub mod accounts;
pub mod catalog;
pub mod config;
pub mod crypto;
pub mod db;
pub mod error;
pub mod layout;
pub mod types;

// Re-export commonly used types
pub use config::NexusConfig;
pub use db::Database;
pub use error::{Error, Result};
pub use types::*;

/// Nexus version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default store path
pub fn default_store_path() -> std::path::PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join(".nexus")
}

/// Default database path
pub fn default_db_path() -> std::path::PathBuf {
    default_store_path().join("nexus.db")
}

/// Default configuration file path
pub fn default_config_path() -> std::path::PathBuf {
    default_store_path().join("config.toml")
}

/// Home directory helper
mod dirs {
    pub fn home_dir() -> Option<std::path::PathBuf> {
        std::env::var_os("HOME").map(std::path::PathBuf::from)
    }
}
