//! Error types for Nexus

use thiserror::Error;

/// Result type alias using Nexus Error
pub type Result<T> = std::result::Result<T, Error>;

/// Nexus error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Resource not found: {kind} with id {id}")]
    NotFound { kind: String, id: String },

    #[error("Resource already exists: {kind} {field} '{value}'")]
    AlreadyExists {
        kind: String,
        field: String,
        value: String,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Account locked until {until}")]
    Locked { until: i64 },

    #[error("Password hashing error: {0}")]
    PasswordHash(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn not_found(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Error::NotFound {
            kind: kind.into(),
            id: id.into(),
        }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidInput(msg.into())
    }
}

impl From<argon2::password_hash::Error> for Error {
    fn from(e: argon2::password_hash::Error) -> Self {
        Error::PasswordHash(e.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::InvalidConfig(e.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(e: toml::ser::Error) -> Self {
        Error::InvalidConfig(e.to_string())
    }
}
