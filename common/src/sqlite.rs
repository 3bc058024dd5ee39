use std::{
    fs,
    path::Path,
    sync::{Mutex, MutexGuard},
    time::Duration,
};

use rusqlite::{params, types::ValueRef, Connection};
use tracing::{debug, info};

use crate::amount::Amount;
use crate::connector::{Bootstrap, Extract, Load};
use crate::engine::{AggregatedRecord, SaleRecord};
use crate::error::ConnectorError;

pub const SOURCE_TABLE: &str = "online_sales";
pub const SINK_TABLE: &str = "sales_aggregated";

const CREATE_SOURCE: &str = "
    CREATE TABLE online_sales (
        sale_id      INTEGER PRIMARY KEY,
        product_id   INTEGER,
        quantity     INTEGER,
        sale_amount  DECIMAL(10,2),
        sale_date    TEXT
    );";

const CREATE_SINK: &str = "
    CREATE TABLE sales_aggregated (
        product_id         INTEGER PRIMARY KEY,
        total_quantity     INTEGER,
        total_sale_amount  DECIMAL(10,2)
    );";

fn open_connection(path: &Path) -> Result<Connection, ConnectorError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let conn = Connection::open(path)?;
    // el master lee mientras un load escribe
    conn.busy_timeout(Duration::from_secs(5))?;
    Ok(conn)
}

fn lock(conn: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>, ConnectorError> {
    conn.lock().map_err(|_| ConnectorError::LockPoisoned)
}

fn table_exists(conn: &Connection, table: &str) -> Result<bool, ConnectorError> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        params![table],
        |row| row.get(0),
    )?;
    Ok(n > 0)
}

/// Celda cruda -> texto, tal como la vería un export a CSV.
fn cell_text(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(n) => Some(n.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
        ValueRef::Text(t) => Some(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(_) => None,
    }
}

/// DECIMAL(10,2) tiene afinidad NUMERIC: vuelve como INTEGER o REAL.
fn cell_amount(value: ValueRef<'_>) -> Option<Amount> {
    match value {
        ValueRef::Integer(n) => Some(Amount::from_integer(n)),
        ValueRef::Real(f) => Amount::from_f64(f).map(Amount::round_cents),
        ValueRef::Text(t) => Amount::parse(&String::from_utf8_lossy(t)),
        _ => None,
    }
}

/* =========================
   Origen relacional
   ========================= */

/// Tabla `online_sales` de ventas online.
pub struct SqliteSource {
    conn: Mutex<Connection>,
}

impl SqliteSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ConnectorError> {
        Ok(Self {
            conn: Mutex::new(open_connection(path.as_ref())?),
        })
    }

    pub fn in_memory() -> Result<Self, ConnectorError> {
        Ok(Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        })
    }
}

impl Extract for SqliteSource {
    fn name(&self) -> &str {
        "postgres"
    }

    fn extract(&self) -> Result<Vec<SaleRecord>, ConnectorError> {
        let conn = lock(&self.conn)?;
        let mut stmt = conn.prepare(
            "SELECT product_id, quantity, sale_amount, sale_date FROM online_sales ORDER BY sale_id",
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok(SaleRecord {
                    product_id: cell_text(row.get_ref(0)?),
                    quantity: cell_text(row.get_ref(1)?),
                    sale_amount: cell_text(row.get_ref(2)?),
                    sale_date: cell_text(row.get_ref(3)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        info!(table = SOURCE_TABLE, rows = rows.len(), "origen relacional leído");
        Ok(rows)
    }
}

impl Bootstrap for SqliteSource {
    fn bootstrap(&self, rows: &[SaleRecord]) -> Result<(), ConnectorError> {
        let mut conn = lock(&self.conn)?;
        let tx = conn.transaction()?;

        tx.execute_batch(&format!("DROP TABLE IF EXISTS {SOURCE_TABLE};{CREATE_SOURCE}"))?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO online_sales (product_id, quantity, sale_amount, sale_date)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for rec in rows {
                stmt.execute(params![
                    rec.product_id.as_deref(),
                    rec.quantity.as_deref(),
                    rec.sale_amount.as_deref(),
                    rec.sale_date.as_deref(),
                ])?;
            }
        }
        tx.commit()?;

        info!(table = SOURCE_TABLE, rows = rows.len(), "origen relacional sembrado");
        Ok(())
    }

    fn is_bootstrapped(&self) -> Result<bool, ConnectorError> {
        let conn = lock(&self.conn)?;
        table_exists(&conn, SOURCE_TABLE)
    }
}

/* =========================
   Destino relacional
   ========================= */

/// Totales sobre todo el destino.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SinkMetrics {
    pub total_items_sold: i64,
    pub total_revenue: Amount,
    pub total_products: i64,
}

/// Tabla de reporte `sales_aggregated`.
pub struct SqliteSink {
    conn: Mutex<Connection>,
}

impl SqliteSink {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ConnectorError> {
        Ok(Self {
            conn: Mutex::new(open_connection(path.as_ref())?),
        })
    }

    pub fn in_memory() -> Result<Self, ConnectorError> {
        Ok(Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        })
    }

    /// Todas las filas, de mayor a menor monto. Vacío si nunca hubo un load.
    pub fn sales_by_amount_desc(&self) -> Result<Vec<AggregatedRecord>, ConnectorError> {
        let conn = lock(&self.conn)?;
        if !table_exists(&conn, SINK_TABLE)? {
            return Ok(Vec::new());
        }

        let mut stmt = conn.prepare(
            "SELECT product_id, total_quantity, total_sale_amount
             FROM sales_aggregated
             ORDER BY total_sale_amount DESC, product_id ASC",
        )?;
        let rows = stmt
            .query_map([], |row| {
                let amount = cell_amount(row.get_ref(2)?).unwrap_or_default();
                Ok(AggregatedRecord::new(row.get(0)?, row.get(1)?, amount))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    /// Suma de cantidades, suma de montos y productos distintos.
    pub fn metrics(&self) -> Result<SinkMetrics, ConnectorError> {
        let conn = lock(&self.conn)?;
        if !table_exists(&conn, SINK_TABLE)? {
            return Ok(SinkMetrics::default());
        }

        let metrics = conn.query_row(
            "SELECT COALESCE(SUM(total_quantity), 0),
                    COALESCE(SUM(total_sale_amount), 0),
                    COUNT(DISTINCT product_id)
             FROM sales_aggregated",
            [],
            |row| {
                Ok(SinkMetrics {
                    total_items_sold: row.get(0)?,
                    total_revenue: cell_amount(row.get_ref(1)?)
                        .map(Amount::round_cents)
                        .unwrap_or_default(),
                    total_products: row.get(2)?,
                })
            },
        )?;

        Ok(metrics)
    }
}

impl Load for SqliteSink {
    /// Full refresh: DROP + CREATE + INSERTs en una sola transacción. Si
    /// cualquier fila falla, el rollback deja el snapshot anterior.
    fn load(&self, rows: &[AggregatedRecord]) -> Result<usize, ConnectorError> {
        let mut conn = lock(&self.conn)?;
        let tx = conn.transaction()?;

        tx.execute_batch(&format!("DROP TABLE IF EXISTS {SINK_TABLE};{CREATE_SINK}"))?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO sales_aggregated (product_id, total_quantity, total_sale_amount)
                 VALUES (?1, ?2, ?3)",
            )?;
            for rec in rows {
                debug!(product_id = rec.product_id, "insertando fila agregada");
                stmt.execute(params![
                    rec.product_id,
                    rec.total_quantity,
                    rec.total_sale_amount.to_string(),
                ])?;
            }
        }
        tx.commit()?;

        info!(table = SINK_TABLE, rows = rows.len(), "destino reemplazado");
        Ok(rows.len())
    }
}
