//! CLI Commands

pub mod dashboard;
pub mod health;
pub mod integration;
pub mod user;

use anyhow::{anyhow, Result};
use nexus_common::{Database, User};

/// Look up an account by username or fail with a readable error.
pub(crate) fn find_user(db: &Database, username: &str) -> Result<User> {
    db.get_user_by_username(username)?
        .ok_or_else(|| anyhow!("no user named '{}'", username))
}
