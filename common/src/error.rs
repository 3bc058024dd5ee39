use thiserror::Error;

use crate::task::TaskId;

/// Errores al declarar el grafo de tareas. Son fatales: ocurren antes de
/// que arranque cualquier run.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("la tarea '{0}' ya está registrada")]
    DuplicateTask(TaskId),

    #[error("la tarea '{task}' depende de '{dependency}', que no está registrada")]
    UnknownDependency { task: TaskId, dependency: TaskId },

    #[error("ciclo de dependencias entre las tareas {0:?}")]
    Cycle(Vec<TaskId>),
}

/// Fallos de acceso a orígenes y destinos de datos.
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("error de sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("error de csv: {0}")]
    Csv(#[from] csv::Error),

    #[error("error de i/o: {0}")]
    Io(#[from] std::io::Error),

    #[error("lock de conexión envenenado")]
    LockPoisoned,
}

/// Una tarea agotó todos sus intentos. Lleva el último error subyacente.
#[derive(Debug, Error)]
#[error("la tarea '{task_id}' falló tras {attempts} intento(s): {source:#}")]
pub struct TaskFailedError {
    pub task_id: TaskId,
    pub attempts: u32,
    #[source]
    pub source: anyhow::Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_error_lista_tareas() {
        let err = GraphError::Cycle(vec!["a".into(), "b".into()]);
        let msg = err.to_string();
        assert!(msg.contains("\"a\""), "got: {msg}");
        assert!(msg.contains("\"b\""), "got: {msg}");
    }

    #[test]
    fn task_failed_error_incluye_causa() {
        let err = TaskFailedError {
            task_id: "load".into(),
            attempts: 2,
            source: anyhow::anyhow!("sink caído"),
        };
        let msg = err.to_string();
        assert!(msg.contains("load"));
        assert!(msg.contains("2 intento"));
        assert!(msg.contains("sink caído"));
    }

    #[test]
    fn connector_error_envuelve_io() {
        let inner = std::io::Error::new(std::io::ErrorKind::NotFound, "no existe");
        let err = ConnectorError::from(inner);
        assert!(err.to_string().contains("i/o"));
    }
}
