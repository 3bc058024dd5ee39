use std::{
    collections::HashMap,
    fs, io,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
};

use anyhow::Context;
use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use crate::config::PipelineConfig;
use crate::connector::{CsvFileSource, Load, Source};
use crate::coordinator::Coordinator;
use crate::dag::TaskGraph;
use crate::engine::{read_aggregated_csv, transform_files, write_sales_csv};
use crate::error::{ConnectorError, GraphError};
use crate::mock::{mock_in_store_sales, mock_sales};
use crate::run::{RunId, RunReport, RunStatus};
use crate::sqlite::{SqliteSink, SqliteSource, SINK_TABLE, SOURCE_TABLE};
use crate::task::{TaskInputs, TaskResult};

pub const GENERATE_MOCK_DATA: &str = "generate_mock_data";
pub const EXTRACT_FROM_POSTGRES: &str = "extract_from_postgres";
pub const EXTRACT_FROM_CSV: &str = "extract_from_csv";
pub const TRANSFORM_DATA: &str = "transform_data";
pub const LOAD_DATA: &str = "load_data_to_mysql";

pub const POSTGRES_EXTRACT_FILE: &str = "postgres_extract.csv";
pub const CSV_EXTRACT_FILE: &str = "csv_extract.csv";
pub const TRANSFORMED_FILE: &str = "transformed_data.csv";

/// Handle de la salida de un predecesor directo.
fn input<'a>(inputs: &'a TaskInputs, dep: &str) -> anyhow::Result<&'a TaskResult> {
    inputs
        .get(dep)
        .with_context(|| format!("falta la salida de '{dep}'"))
}

/// Conectores + config: de acá sale un grafo nuevo por cada run.
#[derive(Clone)]
pub struct RetailPipeline {
    config: PipelineConfig,
    relational: Arc<dyn Source>,
    file: Arc<dyn Source>,
    sink: Arc<dyn Load>,
}

impl RetailPipeline {
    pub fn new(
        config: PipelineConfig,
        relational: Arc<dyn Source>,
        file: Arc<dyn Source>,
        sink: Arc<dyn Load>,
    ) -> Self {
        Self {
            config,
            relational,
            file,
            sink,
        }
    }

    /// Abre los conectores reales de la config. Devuelve también el destino
    /// concreto, para que la capa de lectura use la misma conexión.
    pub fn open(config: PipelineConfig) -> Result<(Self, Arc<SqliteSink>), ConnectorError> {
        let relational = Arc::new(SqliteSource::open(&config.source_db_path)?);
        let file = Arc::new(CsvFileSource::new(config.source_csv_path.clone()));
        let sink = Arc::new(SqliteSink::open(&config.sink_db_path)?);

        let pipeline = Self::new(config, relational, file, Arc::clone(&sink) as Arc<dyn Load>);
        Ok((pipeline, sink))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Directorio de trabajo de un run: ahí quedan los archivos intermedios.
    pub fn run_dir(&self, run_id: &str) -> PathBuf {
        self.config.data_dir.join(run_id)
    }

    /// Borra los directorios de run más viejos y deja los `keep` más nuevos
    /// (por fecha de modificación). Devuelve cuántos borró.
    pub fn prune_run_dirs(&self, keep: usize) -> io::Result<usize> {
        let entries = match fs::read_dir(&self.config.data_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };

        let mut dirs = Vec::new();
        for entry in entries {
            let entry = entry?;
            let meta = entry.metadata()?;
            if meta.is_dir() {
                dirs.push((meta.modified()?, entry.path()));
            }
        }
        if dirs.len() <= keep {
            return Ok(0);
        }

        // más nuevo primero
        dirs.sort_by(|a, b| b.cmp(a));
        let mut removed = 0;
        for (_, dir) in dirs.into_iter().skip(keep) {
            fs::remove_dir_all(&dir)?;
            removed += 1;
        }
        info!(removed, keep, dir = %self.config.data_dir.display(), "directorios de runs viejos borrados");
        Ok(removed)
    }

    /// Siembra ambos orígenes con datos mock: el relacional siempre, el
    /// archivo sólo si no existe.
    pub fn seed_sources(&self, as_of: DateTime<Utc>) -> Result<(), ConnectorError> {
        seed(&*self.relational, &*self.file, self.config.mock_seed, as_of)
    }

    /// generate? -> {extract_pg, extract_csv} -> transform -> load
    pub fn build_graph(&self, run_dir: &Path, as_of: DateTime<Utc>) -> Result<TaskGraph, GraphError> {
        let retry = self.config.retry_policy();
        let mut b = TaskGraph::builder();
        let mut extract_deps: Vec<&str> = Vec::new();

        if self.config.seed_mock_data {
            let relational = Arc::clone(&self.relational);
            let file = Arc::clone(&self.file);
            let mock_seed = self.config.mock_seed;

            b.add_task(
                GENERATE_MOCK_DATA,
                move |_: &TaskInputs| {
                    seed(&*relational, &*file, mock_seed, as_of)?;
                    Ok(TaskResult::new(SOURCE_TABLE))
                },
                &[],
                retry,
            )?;
            extract_deps.push(GENERATE_MOCK_DATA);
        }

        b.add_task(
            EXTRACT_FROM_POSTGRES,
            extract_to(Arc::clone(&self.relational), run_dir.join(POSTGRES_EXTRACT_FILE)),
            &extract_deps,
            retry,
        )?;
        b.add_task(
            EXTRACT_FROM_CSV,
            extract_to(Arc::clone(&self.file), run_dir.join(CSV_EXTRACT_FILE)),
            &extract_deps,
            retry,
        )?;

        let transformed = run_dir.join(TRANSFORMED_FILE);
        b.add_task(
            TRANSFORM_DATA,
            move |inputs: &TaskInputs| {
                let pg = input(inputs, EXTRACT_FROM_POSTGRES)?;
                let csv = input(inputs, EXTRACT_FROM_CSV)?;
                let rows = transform_files(&[pg.as_str(), csv.as_str()], &transformed)?;
                info!(rows, output = %transformed.display(), "transformación escrita");
                Ok(TaskResult::new(transformed.display().to_string()))
            },
            &[EXTRACT_FROM_POSTGRES, EXTRACT_FROM_CSV],
            retry,
        )?;

        let sink = Arc::clone(&self.sink);
        b.add_task(
            LOAD_DATA,
            move |inputs: &TaskInputs| {
                let transformed = input(inputs, TRANSFORM_DATA)?;
                let rows = read_aggregated_csv(Path::new(transformed.as_str()))?;
                sink.load(&rows)?;
                Ok(TaskResult::new(SINK_TABLE))
            },
            &[TRANSFORM_DATA],
            retry,
        )?;

        b.build()
    }

    /// Un run completo, de punta a punta.
    pub async fn run(&self, run_id: RunId, as_of: DateTime<Utc>) -> RunReport {
        let run_dir = self.run_dir(&run_id);

        let graph = match self.build_graph(&run_dir, as_of) {
            Ok(g) => g,
            Err(e) => {
                error!(run = %run_id, "grafo inválido: {e}");
                let mut report = RunReport::not_started(run_id, as_of);
                report.status = RunStatus::Failed;
                report.error = Some(e.to_string());
                report.finished_at = Some(Utc::now());
                return report;
            }
        };

        Coordinator::new(graph, self.config.max_concurrency)
            .run(run_id, as_of)
            .await
    }
}

fn seed(
    relational: &dyn Source,
    file: &dyn Source,
    mock_seed: u64,
    as_of: DateTime<Utc>,
) -> Result<(), ConnectorError> {
    let today = as_of.date_naive();
    relational.bootstrap(&mock_sales(mock_seed, today))?;
    if !file.is_bootstrapped()? {
        file.bootstrap(&mock_in_store_sales(mock_seed, today))?;
    }
    Ok(())
}

/// Etapa de extract: vuelca el origen completo a un CSV intermedio.
fn extract_to(
    source: Arc<dyn Source>,
    output: PathBuf,
) -> impl Fn(&TaskInputs) -> anyhow::Result<TaskResult> + Send + Sync + 'static {
    move |_: &TaskInputs| {
        let rows = source.extract()?;
        write_sales_csv(&output, &rows)?;
        info!(source = source.name(), rows = rows.len(), output = %output.display(), "extract escrito");
        Ok(TaskResult::new(output.display().to_string()))
    }
}

/* =========================
   Interfaz de disparo
   ========================= */

struct Inner {
    pipeline: RetailPipeline,
    runs: Mutex<HashMap<RunId, RunReport>>,
    // a lo sumo un run toca el destino a la vez
    gate: tokio::sync::Mutex<()>,
}

impl Inner {
    fn runs(&self) -> std::sync::MutexGuard<'_, HashMap<RunId, RunReport>> {
        self.runs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn register(&self, as_of: DateTime<Utc>) -> RunId {
        let id = uuid::Uuid::new_v4().to_string();
        let report = RunReport::not_started(id.clone(), as_of);
        self.runs().insert(id.clone(), report);
        info!(run = %id, %as_of, "run registrado");
        id
    }

    async fn execute(&self, id: RunId, as_of: DateTime<Utc>) -> RunReport {
        let _turn = self.gate.lock().await;

        let submitted_at = {
            let mut runs = self.runs();
            let entry = runs
                .entry(id.clone())
                .or_insert_with(|| RunReport::not_started(id.clone(), as_of));
            entry.status = RunStatus::Running;
            entry.started_at = Some(Utc::now());
            entry.submitted_at
        };

        let mut report = self.pipeline.run(id.clone(), as_of).await;
        report.submitted_at = submitted_at;

        self.runs().insert(id, report.clone());

        // todavía con el turno tomado: ningún otro run está escribiendo
        let keep = self.pipeline.config.run_retention;
        self.prune_registry(keep);
        if let Err(e) = self.pipeline.prune_run_dirs(keep) {
            warn!(run = %report.id, "no se pudieron borrar runs viejos: {e}");
        }
        report
    }

    /// Descarta del registro los runs terminados más viejos, dejando `keep`.
    fn prune_registry(&self, keep: usize) {
        let mut runs = self.runs();
        let mut finished: Vec<(DateTime<Utc>, RunId)> = runs
            .values()
            .filter(|r| r.status.is_terminal())
            .map(|r| (r.submitted_at, r.id.clone()))
            .collect();
        if finished.len() <= keep {
            return;
        }

        finished.sort();
        let excess = finished.len() - keep;
        for (_, id) in finished.into_iter().take(excess) {
            runs.remove(&id);
        }
    }
}

/// Lo que usa el scheduler y la API: dispara runs y guarda sus reportes
/// (en memoria).
#[derive(Clone)]
pub struct PipelineService {
    inner: Arc<Inner>,
}

impl PipelineService {
    pub fn new(pipeline: RetailPipeline) -> Self {
        Self {
            inner: Arc::new(Inner {
                pipeline,
                runs: Mutex::new(HashMap::new()),
                gate: tokio::sync::Mutex::new(()),
            }),
        }
    }

    pub fn pipeline(&self) -> &RetailPipeline {
        &self.inner.pipeline
    }

    /// Registra un run y lo lanza en segundo plano. Vuelve enseguida.
    pub fn trigger_run(&self, as_of: DateTime<Utc>) -> RunId {
        let id = self.inner.register(as_of);

        let inner = Arc::clone(&self.inner);
        let run_id = id.clone();
        tokio::spawn(async move {
            inner.execute(run_id, as_of).await;
        });

        id
    }

    /// Igual que `trigger_run` pero espera el resultado.
    pub async fn run_now(&self, as_of: DateTime<Utc>) -> RunReport {
        let id = self.inner.register(as_of);
        self.inner.execute(id, as_of).await
    }

    pub fn get_run(&self, id: &str) -> Option<RunReport> {
        self.inner.runs().get(id).cloned()
    }

    /// Si hay algún run registrado que todavía no terminó.
    pub fn has_active_run(&self) -> bool {
        self.inner.runs().values().any(|r| !r.status.is_terminal())
    }

    /// Todos los runs, del más viejo al más nuevo.
    pub fn list_runs(&self) -> Vec<RunReport> {
        let mut runs: Vec<RunReport> = self.inner.runs().values().cloned().collect();
        runs.sort_by(|a, b| a.submitted_at.cmp(&b.submitted_at).then_with(|| a.id.cmp(&b.id)));
        runs
    }
}
