use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use chrono::{DateTime, Utc};
use tokio::{
    sync::Semaphore,
    task::{JoinError, JoinSet},
};
use tracing::{info, warn};

use crate::dag::TaskGraph;
use crate::error::TaskFailedError;
use crate::executor::{self, TaskOutcome};
use crate::run::{RunId, RunReport, RunStatus, TaskReport};
use crate::task::{TaskId, TaskInputs, TaskResult, TaskStatus};

pub const DEFAULT_MAX_CONCURRENCY: usize = 2;

/// Lo que devuelve cada tarea despachada al loop del coordinador.
struct Completion {
    task_id: TaskId,
    outcome: Result<TaskOutcome, TaskFailedError>,
}

/// Estado mutable de un run. Sólo lo toca el loop del coordinador.
#[derive(Default)]
struct RunState {
    statuses: HashMap<TaskId, TaskStatus>,
    attempts: HashMap<TaskId, u32>,
    errors: HashMap<TaskId, String>,
    completed: HashSet<TaskId>,
    outputs: HashMap<TaskId, TaskResult>,
    first_error: Option<String>,
}

impl RunState {
    /// Una tarea que murió sin reportar queda `Running`; al cerrar el run
    /// cuenta como fallida.
    fn abandon_running(&mut self) {
        for (id, status) in self.statuses.iter_mut() {
            if *status == TaskStatus::Running {
                *status = TaskStatus::Failed;
                self.errors
                    .entry(id.clone())
                    .or_insert_with(|| "la tarea terminó sin reportar resultado".to_string());
            }
        }
    }
}

/// Aplica una finalización al estado del run. Devuelve `true` si el run
/// tiene que fallar.
fn record_completion(
    run_id: &str,
    state: &mut RunState,
    joined: Result<Completion, JoinError>,
) -> bool {
    let done = match joined {
        Ok(done) => done,
        Err(err) => {
            warn!(run = %run_id, "tarea abortada sin resultado: {err}");
            state
                .first_error
                .get_or_insert_with(|| format!("tarea abortada: {err}"));
            return true;
        }
    };

    match done.outcome {
        Ok(outcome) => {
            info!(
                run = %run_id,
                task = %done.task_id,
                attempts = outcome.attempts,
                output = %outcome.result,
                "tarea completada"
            );
            state.statuses.insert(done.task_id.clone(), TaskStatus::Succeeded);
            state.attempts.insert(done.task_id.clone(), outcome.attempts);
            state.outputs.insert(done.task_id.clone(), outcome.result);
            state.completed.insert(done.task_id);
            false
        }
        Err(err) => {
            warn!(run = %run_id, task = %done.task_id, "run marcado como FAILED: {err}");
            state.statuses.insert(done.task_id.clone(), TaskStatus::Failed);
            state.attempts.insert(done.task_id.clone(), err.attempts);
            let msg = err.to_string();
            state.errors.insert(done.task_id, msg.clone());
            state.first_error.get_or_insert(msg);
            true
        }
    }
}

/// Recorre el grafo, despacha tareas listas en paralelo (hasta
/// `max_concurrency` a la vez) y decide el resultado del run.
pub struct Coordinator {
    graph: Arc<TaskGraph>,
    max_concurrency: usize,
}

impl Coordinator {
    pub fn new(graph: TaskGraph, max_concurrency: usize) -> Self {
        Self {
            graph: Arc::new(graph),
            max_concurrency: max_concurrency.max(1),
        }
    }

    pub fn graph(&self) -> &TaskGraph {
        &self.graph
    }

    /// Ejecuta el grafo completo una vez.
    ///
    /// Fail-fast: en cuanto una tarea agota sus reintentos el run queda
    /// `Failed`; las tareas en vuelo terminan pero no se despacha ninguna más.
    pub async fn run(&self, run_id: RunId, as_of: DateTime<Utc>) -> RunReport {
        let mut report = RunReport::not_started(run_id.clone(), as_of);
        report.total_tasks = self.graph.len() as u32;
        report.started_at = Some(Utc::now());
        report.status = RunStatus::Running;

        info!(run = %run_id, tasks = self.graph.len(), "iniciando run");

        let mut state = RunState::default();
        for task in self.graph.tasks() {
            state.statuses.insert(task.id.clone(), TaskStatus::Pending);
        }

        let mut running: JoinSet<Completion> = JoinSet::new();
        let slots = Arc::new(Semaphore::new(self.max_concurrency));
        let mut failed = false;

        self.dispatch_ready(&run_id, &mut state, &mut running, &slots);

        // el JoinSet vacío marca el fin: no queda nada en vuelo
        while let Some(joined) = running.join_next().await {
            if record_completion(&run_id, &mut state, joined) {
                failed = true;
            }
            if !failed {
                self.dispatch_ready(&run_id, &mut state, &mut running, &slots);
            }
        }

        state.abandon_running();
        self.finish(report, state, failed)
    }

    /// Despacha tareas `Pending` con todas sus dependencias completas
    /// mientras haya lugar en el pool. Las que no consiguen permiso quedan
    /// `Pending` y se reintentan cuando termine alguna en vuelo.
    fn dispatch_ready(
        &self,
        run_id: &str,
        state: &mut RunState,
        running: &mut JoinSet<Completion>,
        slots: &Arc<Semaphore>,
    ) {
        let ready: Vec<_> = self
            .graph
            .ready_tasks(&state.completed)
            .into_iter()
            .filter(|t| state.statuses.get(&t.id) == Some(&TaskStatus::Pending))
            .cloned()
            .collect();

        for task in ready {
            let Ok(permit) = Arc::clone(slots).try_acquire_owned() else {
                break;
            };

            state.statuses.insert(task.id.clone(), TaskStatus::Running);

            // sólo las salidas de los predecesores directos
            let inputs: TaskInputs = task
                .depends_on
                .iter()
                .filter_map(|dep| state.outputs.get(dep).map(|r| (dep.clone(), r.clone())))
                .collect();

            info!(run = %run_id, task = %task.id, deps = task.depends_on.len(), "despachando tarea");

            running.spawn(async move {
                let outcome = executor::run(&task, inputs).await;
                // el lugar se libera antes de que el loop vea la finalización
                drop(permit);
                Completion {
                    task_id: task.id,
                    outcome,
                }
            });
        }
    }

    fn finish(&self, mut report: RunReport, state: RunState, failed: bool) -> RunReport {
        report.tasks = self
            .graph
            .tasks()
            .iter()
            .map(|t| TaskReport {
                id: t.id.clone(),
                status: state.statuses.get(&t.id).copied().unwrap_or(TaskStatus::Pending),
                attempts: state.attempts.get(&t.id).copied().unwrap_or(0),
                error: state.errors.get(&t.id).cloned(),
            })
            .collect();

        report.completed_tasks = report
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Succeeded)
            .count() as u32;
        report.failed_tasks = report
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Failed)
            .count() as u32;
        report.retries = report
            .tasks
            .iter()
            .map(|t| t.attempts.saturating_sub(1))
            .sum();

        let all_succeeded = report.completed_tasks == report.total_tasks;
        report.status = if !failed && all_succeeded {
            RunStatus::Succeeded
        } else {
            RunStatus::Failed
        };
        report.error = state.first_error;
        report.finished_at = Some(Utc::now());

        info!(
            run = %report.id,
            status = ?report.status,
            completed = report.completed_tasks,
            failed = report.failed_tasks,
            retries = report.retries,
            "run finalizado"
        );

        report
    }
}
