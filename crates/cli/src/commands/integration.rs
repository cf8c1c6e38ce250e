//! Integration Commands

use std::collections::HashMap;

use anyhow::Result;
use clap::Subcommand;
use serde::Serialize;

use nexus_common::{Database, Integration, IntegrationConfig};

use super::find_user;
use crate::output::{format_time, print_list, OutputFormat, TableDisplay};

#[derive(Subcommand)]
pub enum IntegrationCommands {
    /// List integrations (secrets redacted)
    List {
        /// Only show integrations owned by this user
        #[arg(short, long)]
        user: Option<String>,
    },
}

/// Integration display wrapper for serialization
#[derive(Serialize)]
pub struct IntegrationDisplay {
    pub id: String,
    pub owner: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub endpoint: String,
    pub config: IntegrationConfig,
    pub updated_at: i64,
}

impl IntegrationDisplay {
    fn new(integration: Integration, owner: String) -> Self {
        let integration = integration.redacted();
        Self {
            endpoint: format!("{}:{}", integration.config.host(), integration.config.port()),
            id: integration.id,
            owner,
            name: integration.name,
            kind: integration.kind.to_string(),
            config: integration.config,
            updated_at: integration.updated_at,
        }
    }
}

impl TableDisplay for IntegrationDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["ID", "Owner", "Name", "Type", "Endpoint", "Updated"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            self.owner.clone(),
            self.name.clone(),
            self.kind.clone(),
            self.endpoint.clone(),
            format_time(self.updated_at),
        ]
    }
}

pub fn execute(cmd: IntegrationCommands, db: &Database, format: OutputFormat) -> Result<()> {
    match cmd {
        IntegrationCommands::List { user } => {
            let displays: Vec<IntegrationDisplay> = match user {
                Some(username) => {
                    let user = find_user(db, &username)?;
                    db.list_integrations(user.id, None)?
                        .into_iter()
                        .map(|i| IntegrationDisplay::new(i, user.username.clone()))
                        .collect()
                }
                None => {
                    let owners: HashMap<i64, String> = db
                        .list_users()?
                        .into_iter()
                        .map(|u| (u.id, u.username))
                        .collect();
                    db.list_all_integrations()?
                        .into_iter()
                        .map(|i| {
                            let owner = owners.get(&i.user_id).cloned().unwrap_or_default();
                            IntegrationDisplay::new(i, owner)
                        })
                        .collect()
                }
            };
            print_list(&displays, format);
        }
    }

    Ok(())
}
