use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::task::{TaskId, TaskStatus};

pub type RunId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    NotStarted,
    Running,
    Failed,
    Succeeded,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Failed | RunStatus::Succeeded)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskReport {
    pub id: TaskId,
    pub status: TaskStatus,
    pub attempts: u32,
    pub error: Option<String>,
}

/// Una ejecución completa del grafo.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub id: RunId,
    pub status: RunStatus,

    /// Instante lógico que disparó el run (periodo del scheduler)
    pub as_of: DateTime<Utc>,

    /// Estado de cada tarea, en orden de registro
    pub tasks: Vec<TaskReport>,

    /// Primer error terminal, si lo hubo
    pub error: Option<String>,

    /// -------- Métricas del run --------
    pub submitted_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub total_tasks: u32,
    pub completed_tasks: u32,
    pub failed_tasks: u32,
    pub retries: u32,
}

impl RunReport {
    /// Run recién registrado, todavía sin despachar.
    pub fn not_started(id: RunId, as_of: DateTime<Utc>) -> Self {
        Self {
            id,
            status: RunStatus::NotStarted,
            as_of,
            tasks: Vec::new(),
            error: None,
            submitted_at: Utc::now(),
            started_at: None,
            finished_at: None,
            total_tasks: 0,
            completed_tasks: 0,
            failed_tasks: 0,
            retries: 0,
        }
    }

    pub fn task(&self, id: &str) -> Option<&TaskReport> {
        self.tasks.iter().find(|t| t.id == id)
    }
}
