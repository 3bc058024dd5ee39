use std::{env, path::PathBuf, str::FromStr, time::Duration};

use serde::Serialize;

use crate::coordinator::DEFAULT_MAX_CONCURRENCY;
use crate::mock::DEFAULT_SEED;
use crate::task::RetryPolicy;

pub const DEFAULT_SCHEDULE_PERIOD_SECS: u64 = 24 * 60 * 60;
pub const DEFAULT_TASK_RETRIES: u32 = 1;
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 5 * 60;
pub const DEFAULT_SOURCE_DB_PATH: &str = "/data/source/online_sales.db";
pub const DEFAULT_SOURCE_CSV_PATH: &str = "/data/input/in_store_sales.csv";
pub const DEFAULT_SINK_DB_PATH: &str = "/data/sink/sales_aggregated.db";
pub const DEFAULT_DATA_DIR: &str = "/data/runs";
pub const DEFAULT_RUN_RETENTION: usize = 30;
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_MASTER_URL: &str = "http://localhost:8080";

/// Todo lo que el pipeline recibe de afuera. Se lee una vez al arrancar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineConfig {
    pub schedule_period: Duration,
    pub task_retries: u32,
    pub retry_delay: Duration,
    pub max_concurrency: usize,
    pub source_db_path: PathBuf,
    pub source_csv_path: PathBuf,
    pub sink_db_path: PathBuf,
    pub data_dir: PathBuf,
    /// Runs terminados que se conservan (directorio y reporte en memoria).
    pub run_retention: usize,
    pub seed_mock_data: bool,
    pub mock_seed: u64,
    pub bind_addr: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

fn parse_or<T: FromStr>(value: Option<String>, default: T) -> T {
    value
        .and_then(|s| s.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn parse_bool(value: Option<String>, default: bool) -> bool {
    match value.as_deref().map(|s| s.trim().to_ascii_lowercase()) {
        Some(s) if matches!(s.as_str(), "1" | "true" | "yes" | "on") => true,
        Some(s) if matches!(s.as_str(), "0" | "false" | "no" | "off") => false,
        _ => default,
    }
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Arma la config con una función de búsqueda clave -> valor. Valores
    /// que no parsean caen al default.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let path = |key: &str, default: &str| {
            lookup(key)
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(default))
        };

        // periodo 0 dispararía en loop
        let period_secs = parse_or(lookup("SCHEDULE_PERIOD_SECS"), DEFAULT_SCHEDULE_PERIOD_SECS).max(1);

        Self {
            schedule_period: Duration::from_secs(period_secs),
            task_retries: parse_or(lookup("TASK_RETRIES"), DEFAULT_TASK_RETRIES),
            retry_delay: Duration::from_secs(parse_or(
                lookup("RETRY_DELAY_SECS"),
                DEFAULT_RETRY_DELAY_SECS,
            )),
            max_concurrency: parse_or(lookup("MAX_CONCURRENCY"), DEFAULT_MAX_CONCURRENCY).max(1),
            source_db_path: path("SOURCE_DB_PATH", DEFAULT_SOURCE_DB_PATH),
            source_csv_path: path("SOURCE_CSV_PATH", DEFAULT_SOURCE_CSV_PATH),
            sink_db_path: path("SINK_DB_PATH", DEFAULT_SINK_DB_PATH),
            data_dir: path("DATA_DIR", DEFAULT_DATA_DIR),
            run_retention: parse_or(lookup("RUN_RETENTION"), DEFAULT_RUN_RETENTION).max(1),
            seed_mock_data: parse_bool(lookup("SEED_MOCK_DATA"), true),
            mock_seed: parse_or(lookup("MOCK_SEED"), DEFAULT_SEED),
            bind_addr: lookup("BIND_ADDR")
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
        }
    }

    /// Política que se aplica a cada etapa del pipeline.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from_retries(self.task_retries, self.retry_delay)
    }
}

/// URL del master para el cliente.
pub fn master_url() -> String {
    env::var("MASTER_URL").unwrap_or_else(|_| DEFAULT_MASTER_URL.to_string())
}
