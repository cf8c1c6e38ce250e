//! Local account authentication.
//!
//! Passwords are argon2 hashed; sessions are opaque bearer tokens stored as
//! sha256 hashes, sent as `Authorization: Bearer <token>`.

pub mod middleware;
pub mod routes;

pub use middleware::CurrentUser;
