//! Dashboard Commands

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Subcommand;
use tracing::info;

use nexus_common::layout::normalize_for_user;
use nexus_common::{Database, DashboardConfig};

use super::find_user;
use crate::output::{print_success, print_value, print_warning, OutputFormat};

#[derive(Subcommand)]
pub enum DashboardCommands {
    /// Write a user's dashboard as JSON
    Export {
        /// Owner of the dashboard
        #[arg(short, long)]
        user: String,

        /// Output file (stdout when omitted)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Replace a user's dashboard from a JSON export
    Import {
        /// Owner of the dashboard
        #[arg(short, long)]
        user: String,

        /// Exported dashboard file
        file: PathBuf,
    },
}

pub fn execute(cmd: DashboardCommands, db: &Database, format: OutputFormat) -> Result<()> {
    match cmd {
        DashboardCommands::Export { user, out } => {
            let user = find_user(db, &user)?;
            let dashboard = db
                .get_dashboard(user.id)?
                .map(|(config, _)| config)
                .unwrap_or_default();

            match out {
                Some(path) => {
                    let json = serde_json::to_string_pretty(&dashboard)?;
                    std::fs::write(&path, json)
                        .with_context(|| format!("writing {}", path.display()))?;
                    print_success(&format!(
                        "Exported {} tile(s) for '{}' to {}",
                        dashboard.tiles.len(),
                        user.username,
                        path.display()
                    ));
                }
                None => print_value(&dashboard, format),
            }
        }

        DashboardCommands::Import { user, file } => {
            let user = find_user(db, &user)?;
            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let dashboard: DashboardConfig = serde_json::from_str(&content)
                .with_context(|| format!("{} is not a dashboard export", file.display()))?;

            let normalized = normalize_for_user(db, user.id, dashboard, false)?;
            db.save_dashboard(user.id, &normalized.config)?;
            info!(
                "Imported dashboard for user {} ({} tiles)",
                user.id,
                normalized.config.tiles.len()
            );

            print_success(&format!(
                "Imported {} tile(s) for '{}'",
                normalized.config.tiles.len(),
                user.username
            ));
            if !normalized.dropped_bindings.is_empty() {
                print_warning(&format!(
                    "Unbound tiles referencing unknown integrations: {}",
                    normalized.dropped_bindings.join(", ")
                ));
            }
        }
    }

    Ok(())
}
