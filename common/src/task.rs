use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt, sync::Arc, time::Duration};

pub type TaskId = String;

/// Handle opaco a la salida materializada de una tarea (ruta de archivo,
/// nombre de tabla...). El coordinador nunca mira dentro.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskResult(pub String);

impl TaskResult {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Salidas de los predecesores directos, por id de dependencia.
pub type TaskInputs = HashMap<TaskId, TaskResult>;

/// Unidad de trabajo de una etapa. Puede bloquear en I/O: se ejecuta en el
/// pool de bloqueo de tokio.
pub type Work = Arc<dyn Fn(&TaskInputs) -> anyhow::Result<TaskResult> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Invocaciones totales permitidas (la primera incluida).
    pub max_attempts: u32,
    /// Espera fija entre intentos.
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Estilo Airflow: `retries: 1` significa dos intentos en total.
    pub fn from_retries(retries: u32, delay: Duration) -> Self {
        Self::new(retries.saturating_add(1), delay)
    }

    /// Un solo intento, sin espera.
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::no_retry()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

/// Definición de una tarea dentro del grafo. No guarda estado de ejecución:
/// eso vive en el coordinador.
#[derive(Clone)]
pub struct Task {
    pub id: TaskId,
    pub depends_on: Vec<TaskId>,
    pub retry: RetryPolicy,
    pub work: Work,
}

impl Task {
    pub fn new<F>(id: impl Into<TaskId>, work: F) -> Self
    where
        F: Fn(&TaskInputs) -> anyhow::Result<TaskResult> + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            depends_on: Vec::new(),
            retry: RetryPolicy::default(),
            work: Arc::new(work),
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("depends_on", &self.depends_on)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}
