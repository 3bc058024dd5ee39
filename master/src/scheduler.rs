use chrono::{DateTime, Utc};
use common::{PipelineService, RunId};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

/// Un tick del scheduler. Si el run anterior sigue en curso, el periodo se
/// saltea: no hay backfill de periodos perdidos.
pub fn tick(service: &PipelineService, as_of: DateTime<Utc>) -> Option<RunId> {
    if service.has_active_run() {
        warn!(%as_of, "run anterior todavía en curso, se saltea el periodo");
        return None;
    }

    let run_id = service.trigger_run(as_of);
    info!(run = %run_id, %as_of, "run programado disparado");
    Some(run_id)
}

/// Dispara un run por periodo. El primer tick es inmediato; los ticks
/// perdidos (p.ej. el proceso estuvo suspendido) se descartan.
pub async fn run_schedule(service: PipelineService, period: Duration) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(period_secs = period.as_secs(), "scheduler iniciado (catchup deshabilitado)");

    loop {
        interval.tick().await;
        tick(&service, Utc::now());
    }
}
