use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::AggregatedRecord;
use crate::run::RunId;
use crate::sqlite::SinkMetrics;

/* --------- Disparo de runs --------- */

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriggerRequest {
    /// Si falta, se usa el instante actual
    #[serde(default)]
    pub as_of: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerResponse {
    pub run_id: RunId,
}

/* --------- Lectura del destino --------- */

/// Una fila del resumen. Los montos viajan como número JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesRow {
    pub product_id: i64,
    pub total_quantity: i64,
    pub total_sale_amount: f64,
}

impl From<&AggregatedRecord> for SalesRow {
    fn from(rec: &AggregatedRecord) -> Self {
        Self {
            product_id: rec.product_id,
            total_quantity: rec.total_quantity,
            total_sale_amount: rec.total_sale_amount.to_f64(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesMetrics {
    pub total_items_sold: i64,
    pub total_revenue: f64,
    pub total_products: i64,
}

impl From<SinkMetrics> for SalesMetrics {
    fn from(m: SinkMetrics) -> Self {
        Self {
            total_items_sold: m.total_items_sold,
            total_revenue: m.total_revenue.to_f64(),
            total_products: m.total_products,
        }
    }
}

/// Sobre `{status, data}` de las respuestas de lectura.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub status: String,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            status: "success".to_string(),
            data,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub status: String,
    pub message: String,
}

impl ApiError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: message.into(),
        }
    }
}
