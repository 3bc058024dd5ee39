mod cli;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

/// MASTER_URL:
/// - En Docker: http://master:8080
/// - Local: default http://localhost:8080
#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("client=info,common=info")),
        )
        .init();

    cli::run().await
}
