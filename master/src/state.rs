// master/src/state.rs

use common::{PipelineService, SqliteSink};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    /// Disparo y registro de runs
    pub service: PipelineService,
    /// Misma conexión que usa el load; sólo lectura desde acá
    pub sink: Arc<SqliteSink>,
}

impl AppState {
    pub fn new(service: PipelineService, sink: Arc<SqliteSink>) -> Self {
        Self { service, sink }
    }
}

/// Estado armado sobre un directorio temporal, para los tests del master.
#[cfg(test)]
pub fn test_state(sub: &str) -> AppState {
    use common::{PipelineConfig, RetailPipeline};
    use std::{env, fs};

    let base = env::temp_dir().join("master_tests").join(sub);
    let _ = fs::remove_dir_all(&base);
    fs::create_dir_all(&base).unwrap();
    let base = base.display().to_string();

    let config = PipelineConfig::from_lookup(|key| match key {
        "SOURCE_DB_PATH" => Some(format!("{base}/source/online_sales.db")),
        "SOURCE_CSV_PATH" => Some(format!("{base}/input/in_store_sales.csv")),
        "SINK_DB_PATH" => Some(format!("{base}/sink/sales_aggregated.db")),
        "DATA_DIR" => Some(format!("{base}/runs")),
        "RETRY_DELAY_SECS" => Some("0".into()),
        _ => None,
    });

    let (pipeline, sink) = RetailPipeline::open(config).unwrap();
    AppState::new(PipelineService::new(pipeline), sink)
}
