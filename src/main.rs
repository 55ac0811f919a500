//! Business Central token utility
//!
//! Entry point for the token-printing binary: loads configuration and
//! credentials, retrieves a token, and prints it to stdout.

use anyhow::Context;
use bc_odata_client::auth::BcTokenClient;
use bc_odata_client::config::{Config, Credentials};
use std::io;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Log to stderr so stdout carries only the token
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    if let Err(e) = run().await {
        tracing::error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let config = Config::load_default().context("failed to load configuration")?;
    let runtime = config.to_runtime()?;
    let credentials = Credentials::from_env().context("failed to load credentials")?;

    let client = BcTokenClient::new(
        runtime.token_host,
        runtime.timeout_secs,
        runtime.insecure_ssl,
    );

    let token = client
        .get_token(&credentials.username, &credentials.password)
        .await
        .context("failed to retrieve token")?;

    println!("Token: {}", token);
    Ok(())
}
