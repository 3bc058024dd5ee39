use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::error::TaskFailedError;
use crate::task::{Task, TaskInputs, TaskResult};

/// Resultado de una tarea exitosa y cuántos intentos consumió.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOutcome {
    pub result: TaskResult,
    pub attempts: u32,
}

/// Ejecuta una tarea con sus entradas ya resueltas, aplicando la política de
/// reintentos (espera fija entre intentos).
///
/// Cada intento corre en el pool de bloqueo de tokio; un panic dentro de la
/// unidad de trabajo cuenta como intento fallido. Al agotar los intentos se
/// devuelve `TaskFailedError` con el último error.
pub async fn run(task: &Task, inputs: TaskInputs) -> Result<TaskOutcome, TaskFailedError> {
    let max_attempts = task.retry.max_attempts.max(1);
    let inputs = Arc::new(inputs);
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        debug!(task = %task.id, attempt, max_attempts, "ejecutando etapa");

        let work = Arc::clone(&task.work);
        let attempt_inputs = Arc::clone(&inputs);
        let handle = tokio::task::spawn_blocking(move || work(&attempt_inputs));

        let err = match handle.await {
            Ok(Ok(result)) => {
                return Ok(TaskOutcome {
                    result,
                    attempts: attempt,
                })
            }
            Ok(Err(e)) => e,
            Err(join_err) => anyhow::anyhow!("panic o join error en la etapa: {join_err}"),
        };

        if attempt >= max_attempts {
            error!(
                task = %task.id,
                attempt,
                max_attempts,
                "etapa agotó sus intentos: {err:#}"
            );
            return Err(TaskFailedError {
                task_id: task.id.clone(),
                attempts: attempt,
                source: err,
            });
        }

        warn!(
            task = %task.id,
            attempt,
            max_attempts,
            delay_ms = task.retry.delay.as_millis() as u64,
            "etapa falló, reintentando: {err:#}"
        );
        tokio::time::sleep(task.retry.delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::RetryPolicy;
    use std::{
        sync::atomic::{AtomicU32, Ordering},
        time::{Duration, Instant},
    };

    /// Tarea que falla las primeras `failures` invocaciones.
    fn flaky(failures: u32, max_attempts: u32) -> (Task, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let mut task = Task::new("flaky", move |_| {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= failures {
                anyhow::bail!("fallo simulado #{n}");
            }
            Ok(TaskResult::new("/tmp/out.csv"))
        });
        task.retry = RetryPolicy::new(max_attempts, Duration::ZERO);
        (task, calls)
    }

    #[tokio::test]
    async fn falla_dos_veces_y_exito_en_el_tercer_intento() {
        let (task, calls) = flaky(2, 3);

        let out = run(&task, TaskInputs::new()).await.unwrap();

        assert_eq!(out.attempts, 3);
        assert_eq!(out.result, TaskResult::new("/tmp/out.csv"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn con_dos_intentos_devuelve_task_failed_error() {
        let (task, calls) = flaky(2, 2);

        let err = run(&task, TaskInputs::new()).await.unwrap_err();

        assert_eq!(err.task_id, "flaky");
        assert_eq!(err.attempts, 2);
        assert!(err.source.to_string().contains("fallo simulado #2"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn panic_cuenta_como_intento_fallido() {
        let mut task = Task::new("boom", |_| -> anyhow::Result<TaskResult> {
            panic!("explotó");
        });
        task.retry = RetryPolicy::new(2, Duration::ZERO);

        let err = run(&task, TaskInputs::new()).await.unwrap_err();
        assert_eq!(err.attempts, 2);
    }

    #[tokio::test]
    async fn espera_el_delay_entre_intentos() {
        let (mut task, _) = flaky(2, 3);
        task.retry.delay = Duration::from_millis(20);

        let start = Instant::now();
        run(&task, TaskInputs::new()).await.unwrap();

        // dos esperas fijas de 20ms
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[tokio::test]
    async fn la_unidad_de_trabajo_recibe_las_entradas() {
        let task = Task::new("transform", |inputs: &TaskInputs| {
            let pg = inputs
                .get("extract_pg")
                .ok_or_else(|| anyhow::anyhow!("falta extract_pg"))?;
            Ok(TaskResult::new(format!("{pg}+transformado")))
        });

        let mut inputs = TaskInputs::new();
        inputs.insert("extract_pg".into(), TaskResult::new("pg.csv"));

        let out = run(&task, inputs).await.unwrap();
        assert_eq!(out.result.as_str(), "pg.csv+transformado");
        assert_eq!(out.attempts, 1);
    }
}
