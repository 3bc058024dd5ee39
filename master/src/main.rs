mod handlers;
mod scheduler;
mod state;

use crate::state::AppState;
use common::{PipelineConfig, PipelineService, RetailPipeline};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "master=debug,common=info,tower_http=info";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let config = PipelineConfig::from_env();
    info!(?config, "configuración cargada");

    let (pipeline, sink) = RetailPipeline::open(config.clone())?;
    let service = PipelineService::new(pipeline);
    let state = AppState::new(service.clone(), sink);

    // router HTTP
    let app = handlers::build_router(state);

    // scheduler periódico en segundo plano
    tokio::spawn(scheduler::run_schedule(service, config.schedule_period));

    let listener = TcpListener::bind(config.bind_addr.as_str()).await?;
    info!("master escuchando en {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
