//! User Commands

use anyhow::Result;
use clap::Subcommand;
use serde::Serialize;
use tracing::info;

use nexus_common::accounts::{validate_email, validate_password, validate_username};
use nexus_common::crypto::{generate_password, hash_password};
use nexus_common::{Database, NexusConfig, User};

use super::find_user;
use crate::output::{format_time, print_item, print_list, print_success, print_warning, OutputFormat, TableDisplay};

#[derive(Subcommand)]
pub enum UserCommands {
    /// List all accounts
    List,

    /// Create an account
    Create {
        /// Username
        #[arg(short, long)]
        username: String,

        /// Email address
        #[arg(short, long)]
        email: String,

        /// Password (generated and printed when omitted)
        #[arg(short, long, env = "NEXUS_NEW_PASSWORD")]
        password: Option<String>,

        /// Force a password change on first login
        #[arg(long)]
        must_change: bool,
    },

    /// Set a new password and sign the user out everywhere
    ResetPassword {
        /// Username
        username: String,

        /// New password (generated and printed when omitted)
        #[arg(short, long, env = "NEXUS_NEW_PASSWORD")]
        password: Option<String>,
    },

    /// Delete an account with its integrations and dashboard
    Delete {
        /// Username
        username: String,
    },
}

/// User display wrapper for serialization
#[derive(Serialize)]
pub struct UserDisplay {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub must_change_password: bool,
    pub created_at: i64,
}

impl From<User> for UserDisplay {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            must_change_password: user.must_change_password,
            created_at: user.created_at,
        }
    }
}

impl TableDisplay for UserDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["ID", "Username", "Email", "Must change password", "Created"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            self.username.clone(),
            self.email.clone(),
            if self.must_change_password { "yes" } else { "no" }.to_string(),
            format_time(self.created_at),
        ]
    }
}

/// Validate a supplied password, or generate one. The flag says whether it
/// was generated and must be shown to the operator.
fn resolve_password(password: Option<String>, min_len: usize) -> Result<(String, bool)> {
    match password {
        Some(password) => {
            validate_password(&password, min_len)?;
            Ok((password, false))
        }
        None => Ok((generate_password(), true)),
    }
}

pub fn execute(cmd: UserCommands, db: &Database, config: &NexusConfig, format: OutputFormat) -> Result<()> {
    match cmd {
        UserCommands::List => {
            let users: Vec<UserDisplay> = db.list_users()?.into_iter().map(UserDisplay::from).collect();
            print_list(&users, format);
        }

        UserCommands::Create {
            username,
            email,
            password,
            must_change,
        } => {
            let username = validate_username(&username)?;
            let email = validate_email(&email)?;
            let (password, generated) = resolve_password(password, config.auth.min_password_len)?;

            let user = db.create_user(&username, &email, &hash_password(&password)?, must_change || generated)?;
            info!("Created user {} ({})", user.id, user.username);
            print_success(&format!("User '{}' created", user.username));
            if generated {
                print_warning(&format!("Generated password: {}", password));
            }
            print_item(&UserDisplay::from(user), format);
        }

        UserCommands::ResetPassword { username, password } => {
            let user = find_user(db, &username)?;
            let (password, generated) = resolve_password(password, config.auth.min_password_len)?;

            db.set_password(user.id, &hash_password(&password)?, generated)?;
            db.reset_failed_logins(user.id)?;
            let revoked = db.delete_user_sessions(user.id)?;
            info!("Reset password for user {} ({} sessions revoked)", user.id, revoked);

            print_success(&format!(
                "Password for '{}' reset, {} session(s) revoked",
                user.username, revoked
            ));
            if generated {
                print_warning(&format!(
                    "Generated password: {} (must be changed at next login)",
                    password
                ));
            }
        }

        UserCommands::Delete { username } => {
            let user = find_user(db, &username)?;
            db.delete_user(user.id)?;
            info!("Deleted user {}", user.id);
            print_success(&format!("User '{}' deleted", user.username));
        }
    }

    Ok(())
}
