use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use common::{
    config::master_url, ApiResponse, PipelineConfig, PipelineService, RetailPipeline, RunReport,
    RunStatus, SalesMetrics, SalesRow, TriggerRequest, TriggerResponse,
};
use reqwest::Client;
use std::fmt::Write as _;

#[derive(Parser)]
#[command(name = "client")]
#[command(about = "CLI simple para hablar con el master del pipeline de ventas")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Dispara un run manual en el master
    Trigger {
        /// Instante lógico del run (RFC3339); default: ahora
        #[arg(long, value_name = "FECHA")]
        as_of: Option<DateTime<Utc>>,
    },
    /// Consulta el estado de un run
    Status {
        #[arg(value_name = "RUN_ID")]
        id: String,
    },
    /// Lista todos los runs conocidos por el master
    Runs,
    /// Ventas agregadas por producto (mayor monto primero)
    Summary,
    /// Totales del destino
    Metrics,
    /// Corre el pipeline completo en este proceso, sin master
    RunLocal {
        #[arg(long, value_name = "FECHA")]
        as_of: Option<DateTime<Utc>>,
    },
    /// Siembra los orígenes configurados con datos mock
    Seed,
}

/// Reporte de un run en texto, una tarea por línea.
pub fn format_report(report: &RunReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Run:");
    let _ = writeln!(out, "  id: {}", report.id);
    let _ = writeln!(out, "  estado: {:?}", report.status);
    let _ = writeln!(out, "  as_of: {}", report.as_of.to_rfc3339());
    let _ = writeln!(
        out,
        "  tareas: {}/{} completadas, {} fallidas, {} reintentos",
        report.completed_tasks, report.total_tasks, report.failed_tasks, report.retries
    );
    for task in &report.tasks {
        let _ = write!(out, "    - {} [{:?}] intentos={}", task.id, task.status, task.attempts);
        if let Some(err) = &task.error {
            let _ = write!(out, " error={err}");
        }
        out.push('\n');
    }
    if let Some(err) = &report.error {
        let _ = writeln!(out, "  error: {err}");
    }
    out
}

pub fn format_summary(rows: &[SalesRow]) -> String {
    if rows.is_empty() {
        return "No hay datos agregados todavía\n".to_string();
    }
    let mut out = format!("{:>10} {:>10} {:>12}\n", "producto", "cantidad", "monto");
    for row in rows {
        let _ = writeln!(
            out,
            "{:>10} {:>10} {:>12.2}",
            row.product_id, row.total_quantity, row.total_sale_amount
        );
    }
    out
}

pub fn format_metrics(m: &SalesMetrics) -> String {
    format!(
        "Métricas:\n  unidades vendidas: {}\n  ingresos: {:.2}\n  productos: {}\n",
        m.total_items_sold, m.total_revenue, m.total_products
    )
}

async fn get_json<T: serde::de::DeserializeOwned>(client: &Client, url: &str) -> Result<T> {
    let resp = client.get(url).send().await?;
    if !resp.status().is_success() {
        bail!("el master respondió {} para {url}", resp.status());
    }
    Ok(resp.json().await?)
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let client = Client::new();
    let base_url = master_url();

    match cli.command {
        Commands::Trigger { as_of } => {
            let url = format!("{}/api/v1/runs", base_url);
            let resp = client
                .post(&url)
                .json(&TriggerRequest { as_of })
                .send()
                .await?;
            if !resp.status().is_success() {
                bail!("el master rechazó el run: {}", resp.status());
            }
            let TriggerResponse { run_id } = resp.json().await?;

            println!("Run disparado:");
            println!("  id: {run_id}");
        }
        Commands::Status { id } => {
            let url = format!("{}/api/v1/runs/{id}", base_url);
            let resp = client.get(&url).send().await?;

            if resp.status().is_success() {
                let report: RunReport = resp.json().await?;
                print!("{}", format_report(&report));
            } else {
                println!("No se encontró el run con id {id}");
            }
        }
        Commands::Runs => {
            let url = format!("{}/api/v1/runs", base_url);
            let runs: Vec<RunReport> = get_json(&client, &url).await?;

            if runs.is_empty() {
                println!("No hay runs registrados");
            }
            for r in runs {
                println!(
                    "{}  {:?}  as_of={}  tareas={}/{}",
                    r.id,
                    r.status,
                    r.as_of.to_rfc3339(),
                    r.completed_tasks,
                    r.total_tasks
                );
            }
        }
        Commands::Summary => {
            let url = format!("{}/api/sales/summary", base_url);
            let body: ApiResponse<Vec<SalesRow>> = get_json(&client, &url).await?;
            print!("{}", format_summary(&body.data));
        }
        Commands::Metrics => {
            let url = format!("{}/api/sales/metrics", base_url);
            let body: ApiResponse<SalesMetrics> = get_json(&client, &url).await?;
            print!("{}", format_metrics(&body.data));
        }
        Commands::RunLocal { as_of } => {
            let config = PipelineConfig::from_env();
            let (pipeline, _sink) = RetailPipeline::open(config)?;
            let report = PipelineService::new(pipeline)
                .run_now(as_of.unwrap_or_else(Utc::now))
                .await;

            print!("{}", format_report(&report));
            if report.status != RunStatus::Succeeded {
                bail!("el run local terminó en {:?}", report.status);
            }
        }
        Commands::Seed => {
            let config = PipelineConfig::from_env();
            let (pipeline, _sink) = RetailPipeline::open(config.clone())?;
            pipeline.seed_sources(Utc::now())?;

            println!("Orígenes sembrados:");
            println!("  relacional: {}", config.source_db_path.display());
            println!("  archivo: {}", config.source_csv_path.display());
        }
    }

    Ok(())
}
