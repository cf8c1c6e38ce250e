//! Nexus Web Server
//!
//! JSON API for accounts, integrations and dashboards, relays to the vendor
//! APIs tiles poll, and static serving of the frontend bundle.

pub mod auth;
pub mod dashboard;
pub mod error;
pub mod integrations;
pub mod proxy;
pub mod server;
pub mod static_files;
pub mod upstream;
pub mod widgets;

pub use error::{ApiError, ApiJson, ApiResult};
pub use server::{AppState, SharedState, WebServer};
