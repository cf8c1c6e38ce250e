//! Health check against a running server

use std::time::Duration;

use anyhow::{bail, Result};
use clap::Args;
use serde::Deserialize;

use crate::output::{print_success, print_warning};

#[derive(Args)]
pub struct HealthArgs {
    /// Base URL of the Nexus server
    #[arg(long, env = "NEXUS_URL", default_value = "http://127.0.0.1:3001")]
    pub url: String,

    /// Request timeout in seconds
    #[arg(long, default_value = "5")]
    pub timeout: u64,
}

#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
    #[serde(default)]
    version: String,
}

pub async fn execute(args: HealthArgs) -> Result<()> {
    let url = format!("{}/api/health", args.url.trim_end_matches('/'));
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(args.timeout))
        .build()?;

    let response = match client.get(&url).send().await {
        Ok(response) => response,
        Err(e) => {
            print_warning(&format!("Cannot reach {}: {}", args.url, e));
            bail!("server unreachable");
        }
    };
    if !response.status().is_success() {
        print_warning(&format!("{} returned {}", url, response.status()));
        bail!("server unhealthy");
    }

    let health: HealthResponse = response.json().await?;
    if health.status != "ok" {
        bail!("server reported status '{}'", health.status);
    }
    print_success(&format!("Nexus {} is running at {}", health.version, args.url));
    Ok(())
}
