// HTTP API server binary for the takonbini storefront

use anyhow::Result;
use takonbini::api::ApiServer;
use takonbini::config;
use takonbini::logging::init_tracing;

#[actix_web::main]
async fn main() -> Result<()> {
    // Load dotenv/env once (safe to call multiple times)
    config::init_env();
    init_tracing("info,actix_web=info")?;

    tracing::info!("Initializing takonbini API server");

    let server = ApiServer::from_env()?;
    server.run().await?;

    Ok(())
}
