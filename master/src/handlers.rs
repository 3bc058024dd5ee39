use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use common::{
    ApiError, ApiResponse, RunReport, SalesMetrics, SalesRow, TriggerRequest, TriggerResponse,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

use crate::state::AppState;

type ApiResult<T> = Result<Json<ApiResponse<T>>, (StatusCode, Json<ApiError>)>;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/runs", post(trigger_run).get(list_runs))
        .route("/api/v1/runs/:id", get(get_run))
        .route("/api/sales/summary", get(sales_summary))
        .route("/api/sales/metrics", get(sales_metrics))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn internal_error(err: impl std::fmt::Display) -> (StatusCode, Json<ApiError>) {
    error!("error leyendo el destino: {err}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiError::new(err.to_string())),
    )
}

/* ---------------- handlers HTTP ---------------- */

async fn health() -> &'static str {
    "ok"
}

// Dispara un run manual; el body es opcional
async fn trigger_run(
    State(state): State<AppState>,
    body: Option<Json<TriggerRequest>>,
) -> (StatusCode, Json<TriggerResponse>) {
    let as_of = body
        .and_then(|Json(req)| req.as_of)
        .unwrap_or_else(Utc::now);

    let run_id = state.service.trigger_run(as_of);
    info!(run = %run_id, %as_of, "run manual disparado");

    (StatusCode::ACCEPTED, Json(TriggerResponse { run_id }))
}

async fn list_runs(State(state): State<AppState>) -> Json<Vec<RunReport>> {
    Json(state.service.list_runs())
}

async fn get_run(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RunReport>, StatusCode> {
    state
        .service
        .get_run(&id)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

// Todas las filas agregadas, de mayor a menor monto
async fn sales_summary(State(state): State<AppState>) -> ApiResult<Vec<SalesRow>> {
    let sink = Arc::clone(&state.sink);
    let rows = tokio::task::spawn_blocking(move || sink.sales_by_amount_desc())
        .await
        .map_err(internal_error)?
        .map_err(internal_error)?;

    Ok(Json(ApiResponse::success(
        rows.iter().map(SalesRow::from).collect(),
    )))
}

async fn sales_metrics(State(state): State<AppState>) -> ApiResult<SalesMetrics> {
    let sink = Arc::clone(&state.sink);
    let metrics = tokio::task::spawn_blocking(move || sink.metrics())
        .await
        .map_err(internal_error)?
        .map_err(internal_error)?;

    Ok(Json(ApiResponse::success(metrics.into())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_state;
    use axum::{
        body::Body,
        http::{header, Request},
        response::Response,
    };
    use common::{AggregatedRecord, Amount, Load};
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tower::ServiceExt;

    async fn send(app: Router, req: Request<Body>) -> Response {
        app.oneshot(req).await.unwrap()
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn json_body(resp: Response) -> Value {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_responde_ok() {
        let app = build_router(test_state("http_health"));
        let resp = send(app, get_req("/health")).await;

        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"ok");
    }

    #[tokio::test]
    async fn summary_y_metrics_con_destino_vacio() {
        let state = test_state("http_vacio");

        let resp = send(build_router(state.clone()), get_req("/api/sales/summary")).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        assert_eq!(body["status"], "success");
        assert_eq!(body["data"], Value::Array(vec![]));

        let body = json_body(send(build_router(state), get_req("/api/sales/metrics")).await).await;
        assert_eq!(body["data"]["total_items_sold"], 0);
        assert_eq!(body["data"]["total_revenue"], 0.0);
        assert_eq!(body["data"]["total_products"], 0);
    }

    #[tokio::test]
    async fn summary_ordena_por_monto_y_metrics_suma() {
        let state = test_state("http_datos");
        state
            .sink
            .load(&[
                AggregatedRecord::new(201, 3, Amount::from_cents(9_000)),
                AggregatedRecord::new(202, 1, Amount::from_cents(2_250)),
                AggregatedRecord::new(203, 8, Amount::from_cents(12_000)),
            ])
            .unwrap();

        let body = json_body(send(build_router(state.clone()), get_req("/api/sales/summary")).await).await;
        let ids: Vec<i64> = body["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["product_id"].as_i64().unwrap())
            .collect();
        assert_eq!(ids, vec![203, 201, 202]);
        assert_eq!(body["data"][2]["total_sale_amount"], 22.5);

        let body = json_body(send(build_router(state), get_req("/api/sales/metrics")).await).await;
        assert_eq!(body["status"], "success");
        assert_eq!(body["data"]["total_items_sold"], 12);
        assert_eq!(body["data"]["total_revenue"], 232.5);
        assert_eq!(body["data"]["total_products"], 3);
    }

    #[tokio::test]
    async fn run_desconocido_da_404() {
        let app = build_router(test_state("http_404"));
        let resp = send(app, get_req("/api/v1/runs/no-existe")).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn post_runs_dispara_y_se_puede_consultar() {
        let state = test_state("http_trigger");

        let req = Request::builder()
            .method("POST")
            .uri("/api/v1/runs")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"as_of":"2024-04-10T00:00:00Z"}"#))
            .unwrap();
        let resp = send(build_router(state.clone()), req).await;
        assert_eq!(resp.status(), StatusCode::ACCEPTED);

        let run_id = json_body(resp).await["run_id"].as_str().unwrap().to_string();

        let resp = send(
            build_router(state.clone()),
            get_req(&format!("/api/v1/runs/{run_id}")),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        assert_eq!(body["id"], run_id.as_str());
        assert_eq!(body["as_of"], "2024-04-10T00:00:00Z");

        let body = json_body(send(build_router(state), get_req("/api/v1/runs")).await).await;
        assert_eq!(body.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn post_runs_sin_body_usa_ahora() {
        let state = test_state("http_trigger_sin_body");

        let req = Request::builder()
            .method("POST")
            .uri("/api/v1/runs")
            .body(Body::empty())
            .unwrap();
        let resp = send(build_router(state.clone()), req).await;

        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        let run_id = json_body(resp).await["run_id"].as_str().unwrap().to_string();
        assert!(state.service.get_run(&run_id).is_some());
    }
}
