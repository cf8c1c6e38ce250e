//! Account rules shared by the HTTP API and the admin CLI.

use crate::config::BootstrapAdmin;
use crate::crypto::{generate_password, hash_password};
use crate::types::User;
use crate::{Database, Error, Result};
use tracing::{info, warn};

const USERNAME_MIN: usize = 3;
const USERNAME_MAX: usize = 32;

/// Trim and check a username: 3-32 chars of `[A-Za-z0-9_.-]`.
pub fn validate_username(username: &str) -> Result<String> {
    let username = username.trim();
    let len = username.chars().count();
    if !(USERNAME_MIN..=USERNAME_MAX).contains(&len) {
        return Err(Error::invalid(format!(
            "username must be {}-{} characters",
            USERNAME_MIN, USERNAME_MAX
        )));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
    {
        return Err(Error::invalid(
            "username may only contain letters, digits, '_', '.' and '-'",
        ));
    }
    Ok(username.to_string())
}

pub fn validate_email(email: &str) -> Result<String> {
    let email = email.trim();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => {
            if email.chars().any(char::is_whitespace) {
                return Err(Error::invalid("email must not contain whitespace"));
            }
            Ok(email.to_string())
        }
        _ => Err(Error::invalid("email must be a valid address")),
    }
}

pub fn validate_password(password: &str, min_len: usize) -> Result<()> {
    if password.chars().count() < min_len {
        return Err(Error::invalid(format!(
            "password must be at least {} characters",
            min_len
        )));
    }
    Ok(())
}

/// Create the first administrator when the user table is empty.
///
/// Returns the created user, or `None` when users already exist. When no
/// password is configured a random one is generated and logged once.
pub fn ensure_bootstrap_admin(db: &Database, admin: &BootstrapAdmin) -> Result<Option<User>> {
    if db.count_users()? > 0 {
        return Ok(None);
    }

    let username = validate_username(&admin.username)?;
    let email = validate_email(&admin.email)?;
    let (password, generated) = match admin.password.as_deref() {
        Some(p) if !p.is_empty() => (p.to_string(), false),
        _ => (generate_password(), true),
    };

    let user = db.create_user(&username, &email, &hash_password(&password)?, true)?;
    if generated {
        warn!(
            "Created initial admin '{}' with generated password: {} (change it after first login)",
            username, password
        );
    } else {
        info!("Created initial admin '{}' from configured credentials", username);
    }
    Ok(Some(user))
}
