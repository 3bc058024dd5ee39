use std::path::{Path, PathBuf};

use tracing::info;

use crate::engine::{read_sales_csv, write_sales_csv, AggregatedRecord, SaleRecord};
use crate::error::ConnectorError;

/// Origen de ventas (relacional o archivo).
pub trait Extract: Send + Sync {
    /// Nombre corto para logs.
    fn name(&self) -> &str;

    fn extract(&self) -> Result<Vec<SaleRecord>, ConnectorError>;
}

/// Destino de la agregación. `load` reemplaza el contenido completo de forma
/// atómica: o queda el snapshot nuevo o el anterior, nunca una mezcla.
pub trait Load: Send + Sync {
    fn load(&self, rows: &[AggregatedRecord]) -> Result<usize, ConnectorError>;
}

/// Siembra un origen con filas sintéticas (sólo para corridas de prueba).
pub trait Bootstrap: Send + Sync {
    fn bootstrap(&self, rows: &[SaleRecord]) -> Result<(), ConnectorError>;

    /// Si el origen ya tiene datos que extraer.
    fn is_bootstrapped(&self) -> Result<bool, ConnectorError>;
}

/// Origen completo: se puede sembrar y extraer.
pub trait Source: Extract + Bootstrap {}

impl<T: Extract + Bootstrap> Source for T {}

/// Archivo CSV de ventas en tienda.
#[derive(Debug, Clone)]
pub struct CsvFileSource {
    path: PathBuf,
}

impl CsvFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }
}

impl Extract for CsvFileSource {
    fn name(&self) -> &str {
        "csv"
    }

    fn extract(&self) -> Result<Vec<SaleRecord>, ConnectorError> {
        let rows = read_sales_csv(&self.path)?;
        info!(path = %self.path.display(), rows = rows.len(), "CSV de origen leído");
        Ok(rows)
    }
}

impl Bootstrap for CsvFileSource {
    fn bootstrap(&self, rows: &[SaleRecord]) -> Result<(), ConnectorError> {
        write_sales_csv(&self.path, rows)?;
        info!(path = %self.path.display(), rows = rows.len(), "CSV de origen sembrado");
        Ok(())
    }

    fn is_bootstrapped(&self) -> Result<bool, ConnectorError> {
        Ok(self.exists())
    }
}
