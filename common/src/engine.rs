use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fs, path::Path};
use tracing::info;

use crate::amount::Amount;
use crate::error::ConnectorError;

/// Fila cruda tal como sale de un origen (o de un archivo intermedio).
/// Todo es texto opcional: la coerción a números pasa en el transform.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleRecord {
    #[serde(default)]
    pub product_id: Option<String>,
    #[serde(default)]
    pub quantity: Option<String>,
    #[serde(default)]
    pub sale_amount: Option<String>,
    #[serde(default)]
    pub sale_date: Option<String>,
}

impl SaleRecord {
    pub fn new(
        product_id: Option<&str>,
        quantity: Option<&str>,
        sale_amount: Option<&str>,
        sale_date: Option<&str>,
    ) -> Self {
        Self {
            product_id: product_id.map(str::to_string),
            quantity: quantity.map(str::to_string),
            sale_amount: sale_amount.map(str::to_string),
            sale_date: sale_date.map(str::to_string),
        }
    }
}

/// Fila que pasó la política de poison rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanRecord {
    pub product_id: i64,
    pub quantity: i64,
    pub amount: Amount,
    pub date: Option<String>,
}

/// Una fila por producto, con totales.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatedRecord {
    pub product_id: i64,
    pub total_quantity: i64,
    /// Siempre redondeado a centavos
    pub total_sale_amount: Amount,
}

impl AggregatedRecord {
    pub fn new(product_id: i64, total_quantity: i64, total_sale_amount: Amount) -> Self {
        Self {
            product_id,
            total_quantity,
            total_sale_amount: total_sale_amount.round_cents(),
        }
    }
}

/// Forma en disco de `AggregatedRecord` (el monto va como texto para no
/// perder la escala).
#[derive(Debug, Serialize, Deserialize)]
struct AggregatedRow {
    product_id: i64,
    total_quantity: i64,
    total_sale_amount: String,
}

/* =========================
   Coerción de tipos
   ========================= */

const NULL_LITERALS: [&str; 4] = ["nan", "null", "none", "nat"];

fn normalize(raw: Option<&str>) -> Option<&str> {
    let text = raw?.trim();
    if text.is_empty() || NULL_LITERALS.iter().any(|n| text.eq_ignore_ascii_case(n)) {
        return None;
    }
    Some(text)
}

/// Entero o null. Acepta texto decimal integral ("201.0"), que es lo que
/// deja un export de una columna entera con nulos.
pub fn coerce_integer(raw: Option<&str>) -> Option<i64> {
    let text = normalize(raw)?;
    if let Ok(v) = text.parse::<i64>() {
        return Some(v);
    }
    Amount::parse(text)?.as_integer()
}

/// Decimal o null.
pub fn coerce_amount(raw: Option<&str>) -> Option<Amount> {
    Amount::parse(normalize(raw)?)
}

/* =========================
   Limpieza (poison rows)
   ========================= */

/// Coerciona una fila; `None` si alguno de product_id, quantity o amount
/// queda null o si quantity/amount son negativos.
pub fn clean_record(rec: &SaleRecord) -> Option<CleanRecord> {
    let product_id = coerce_integer(rec.product_id.as_deref())?;
    let quantity = coerce_integer(rec.quantity.as_deref()).filter(|q| *q >= 0)?;
    let amount = coerce_amount(rec.sale_amount.as_deref()).filter(|a| !a.is_negative())?;

    Some(CleanRecord {
        product_id,
        quantity,
        amount,
        date: rec.sale_date.clone(),
    })
}

/// filter: deja pasar sólo las filas válidas.
pub fn clean(records: &[SaleRecord]) -> Vec<CleanRecord> {
    records.iter().filter_map(clean_record).collect()
}

/* =========================
   Agregación
   ========================= */

/// reduce_by_key sobre product_id: suma cantidades y montos por producto y
/// redondea cada total a 2 decimales. Salida ordenada por product_id.
pub fn reduce_by_product(records: Vec<CleanRecord>) -> Vec<AggregatedRecord> {
    let mut acc: BTreeMap<i64, (i64, Amount)> = BTreeMap::new();

    for rec in records {
        let entry = acc.entry(rec.product_id).or_default();
        entry.0 = entry.0.saturating_add(rec.quantity);
        entry.1 += rec.amount;
    }

    acc.into_iter()
        .map(|(product_id, (total_quantity, total))| {
            AggregatedRecord::new(product_id, total_quantity, total)
        })
        .collect()
}

/// Junta todos los datasets, descarta poison rows y agrega por producto.
/// El orden de salida no es parte del contrato.
pub fn aggregate(datasets: &[Vec<SaleRecord>]) -> Vec<AggregatedRecord> {
    let total: usize = datasets.iter().map(Vec::len).sum();
    let cleaned: Vec<CleanRecord> = datasets.iter().flat_map(|ds| clean(ds)).collect();
    let dropped = total - cleaned.len();

    info!(
        input_rows = total,
        kept_rows = cleaned.len(),
        dropped_rows = dropped,
        "filas descartadas por poison-row policy"
    );

    reduce_by_product(cleaned)
}

/* =========================
   Lectura / escritura CSV
   ========================= */

fn ensure_parent(path: &Path) -> Result<(), ConnectorError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Lee un CSV de ventas con encabezados. Columnas desconocidas se ignoran;
/// celdas vacías quedan como `None`.
pub fn read_sales_csv(path: &Path) -> Result<Vec<SaleRecord>, ConnectorError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)?;

    let mut out = Vec::new();
    for row in reader.deserialize() {
        let rec: SaleRecord = row?;
        out.push(rec);
    }
    Ok(out)
}

pub fn write_sales_csv(path: &Path, records: &[SaleRecord]) -> Result<(), ConnectorError> {
    ensure_parent(path)?;
    let mut writer = csv::Writer::from_path(path)?;
    if records.is_empty() {
        writer.write_record(["product_id", "quantity", "sale_amount", "sale_date"])?;
    }
    for rec in records {
        writer.serialize(rec)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn read_aggregated_csv(path: &Path) -> Result<Vec<AggregatedRecord>, ConnectorError> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut out = Vec::new();

    for row in reader.deserialize() {
        let row: AggregatedRow = row?;
        let amount = Amount::parse(&row.total_sale_amount).ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("monto inválido '{}' en {}", row.total_sale_amount, path.display()),
            )
        })?;
        out.push(AggregatedRecord::new(row.product_id, row.total_quantity, amount));
    }
    Ok(out)
}

pub fn write_aggregated_csv(path: &Path, records: &[AggregatedRecord]) -> Result<(), ConnectorError> {
    ensure_parent(path)?;
    let mut writer = csv::Writer::from_path(path)?;
    if records.is_empty() {
        writer.write_record(["product_id", "total_quantity", "total_sale_amount"])?;
    }
    for rec in records {
        writer.serialize(AggregatedRow {
            product_id: rec.product_id,
            total_quantity: rec.total_quantity,
            total_sale_amount: rec.total_sale_amount.to_string(),
        })?;
    }
    writer.flush()?;
    Ok(())
}

/// Etapa de transform completa sobre archivos: lee cada entrada, agrega y
/// escribe el resultado. Devuelve cuántas filas agregadas se escribieron.
pub fn transform_files<P: AsRef<Path>>(inputs: &[P], output: &Path) -> Result<usize, ConnectorError> {
    let mut datasets = Vec::with_capacity(inputs.len());
    for input in inputs {
        datasets.push(read_sales_csv(input.as_ref())?);
    }

    let aggregated = aggregate(&datasets);
    write_aggregated_csv(output, &aggregated)?;
    Ok(aggregated.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{env, io::Write, path::PathBuf};

    fn temp_dir(sub: &str) -> PathBuf {
        let base = env::temp_dir().join("engine_tests").join(sub);
        let _ = fs::remove_dir_all(&base);
        fs::create_dir_all(&base).unwrap();
        base
    }

    fn sale(p: Option<&str>, q: Option<&str>, a: Option<&str>, d: &str) -> SaleRecord {
        SaleRecord::new(p, q, a, Some(d))
    }

    fn amt(s: &str) -> Amount {
        Amount::parse(s).unwrap()
    }

    /* ============
       COERCIÓN
       ============ */

    #[test]
    fn monto_en_notacion_cientifica_se_conserva_al_agregar() {
        let rows = vec![
            sale(Some("201"), Some("1"), Some("3e1"), "2024-04-09"),
            sale(Some("201"), Some("2"), Some("60.00"), "2024-04-10"),
        ];
        let out = aggregate(&[rows]);
        assert_eq!(out, vec![AggregatedRecord::new(201, 3, amt("90"))]);
    }

    #[test]
    fn coerce_integer_acepta_enteros_y_decimales_integrales() {
        assert_eq!(coerce_integer(Some("201")), Some(201));
        assert_eq!(coerce_integer(Some(" 202 ")), Some(202));
        assert_eq!(coerce_integer(Some("201.0")), Some(201));
        assert_eq!(coerce_integer(Some("2.5")), None);
        assert_eq!(coerce_integer(Some("abc")), None);
        assert_eq!(coerce_integer(Some("")), None);
        assert_eq!(coerce_integer(Some("NaN")), None);
        assert_eq!(coerce_integer(None), None);
    }

    #[test]
    fn coerce_amount_parsea_decimales() {
        assert_eq!(coerce_amount(Some("60.00")), Some(amt("60")));
        assert_eq!(coerce_amount(Some("22.5")), Some(amt("22.50")));
        assert_eq!(coerce_amount(Some("3e1")), Some(amt("30")));
        assert_eq!(coerce_amount(Some("2.25E+1")), Some(amt("22.50")));
        assert_eq!(coerce_amount(Some("doce")), None);
        assert_eq!(coerce_amount(Some("null")), None);
        assert_eq!(coerce_amount(None), None);
    }

    /* ============
       POISON ROWS
       ============ */

    #[test]
    fn poison_rows_se_descartan() {
        let input = vec![
            sale(Some("201"), Some("2"), Some("60.00"), "d1"),
            sale(None, Some("2"), Some("60.00"), "d2"),
            sale(Some("201"), None, Some("30.00"), "d3"),
            sale(Some("202"), Some("3"), None, "d4"),
        ];

        let out = aggregate(&[input]);

        assert_eq!(out, vec![AggregatedRecord::new(201, 2, amt("60.00"))]);
    }

    #[test]
    fn valores_no_numericos_o_negativos_son_invalidos() {
        let input = vec![
            sale(Some("201"), Some("dos"), Some("60.00"), "d1"),
            sale(Some("201"), Some("-1"), Some("30.00"), "d2"),
            sale(Some("202"), Some("1"), Some("-22.50"), "d3"),
            sale(Some("x"), Some("1"), Some("22.50"), "d4"),
        ];

        assert!(clean(&input).is_empty());
    }

    #[test]
    fn todas_las_filas_envenenadas_da_salida_vacia() {
        let input = vec![sale(None, None, None, "d1")];
        assert!(aggregate(&[input]).is_empty());
        assert!(aggregate(&[]).is_empty());
    }

    /* ============
       AGREGACIÓN
       ============ */

    #[test]
    fn aggregate_junta_varios_origenes_y_suma_por_producto() {
        let online = vec![
            sale(Some("201"), Some("2"), Some("60.00"), "d1"),
            sale(Some("202"), Some("1"), Some("22.50"), "d1"),
        ];
        let in_store = vec![
            sale(Some("201.0"), Some("3"), Some("90"), "d2"),
            sale(Some("203"), Some("4"), Some("60.00"), "d2"),
        ];

        let mut out = aggregate(&[online, in_store]);
        out.sort_by_key(|r| r.product_id);

        assert_eq!(
            out,
            vec![
                AggregatedRecord::new(201, 5, amt("150.00")),
                AggregatedRecord::new(202, 1, amt("22.50")),
                AggregatedRecord::new(203, 4, amt("60.00")),
            ]
        );
        assert_eq!(out[0].total_sale_amount.to_string(), "150.00");
    }

    #[test]
    fn redondeo_se_aplica_sobre_la_suma() {
        // 0.005 + 0.010 = 0.015 -> 0.02 (par)
        let input = vec![
            sale(Some("1"), Some("1"), Some("0.005"), "d"),
            sale(Some("1"), Some("1"), Some("0.010"), "d"),
        ];
        let out = aggregate(&[input]);
        assert_eq!(out[0].total_sale_amount.to_string(), "0.02");
    }

    #[test]
    fn aggregate_es_idempotente_entre_corridas() {
        let tmp = temp_dir("idempotente");
        let input = vec![
            sale(Some("203"), Some("1"), Some("15.00"), "d1"),
            sale(Some("201"), Some("2"), Some("60.00"), "d1"),
            sale(None, Some("2"), Some("60.00"), "d2"),
            sale(Some("203"), Some("2"), Some("30.00"), "d3"),
        ];

        let a = tmp.join("a.csv");
        let b = tmp.join("b.csv");
        write_aggregated_csv(&a, &aggregate(&[input.clone()])).unwrap();
        write_aggregated_csv(&b, &aggregate(&[input])).unwrap();

        assert_eq!(fs::read(&a).unwrap(), fs::read(&b).unwrap());
    }

    /* ============
       CSV
       ============ */

    #[test]
    fn read_sales_csv_ignora_columnas_extra_y_celdas_vacias_son_none() {
        let tmp = temp_dir("read_sales");
        let path = tmp.join("in_store_sales.csv");
        let mut f = fs::File::create(&path).unwrap();
        writeln!(f, "sale_id,product_id,quantity,sale_amount,sale_date").unwrap();
        writeln!(f, "1,201,2,60.00,2024-04-01").unwrap();
        writeln!(f, "2,,2,60.00,2024-04-02").unwrap();

        let recs = read_sales_csv(&path).unwrap();
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].product_id.as_deref(), Some("201"));
        assert_eq!(recs[0].sale_date.as_deref(), Some("2024-04-01"));
        assert_eq!(recs[1].product_id, None);
    }

    #[test]
    fn read_sales_csv_falla_si_no_existe() {
        let tmp = temp_dir("read_missing");
        assert!(read_sales_csv(&tmp.join("no_existe.csv")).is_err());
    }

    #[test]
    fn write_aggregated_csv_crea_directorios_y_conserva_escala() {
        let tmp = temp_dir("write_agg");
        let path = tmp.join("sub1").join("transformed_data.csv");
        let rows = vec![AggregatedRecord::new(202, 1, amt("22.5"))];

        write_aggregated_csv(&path, &rows).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "product_id,total_quantity,total_sale_amount\n202,1,22.50\n"
        );
        assert_eq!(read_aggregated_csv(&path).unwrap(), rows);
    }

    #[test]
    fn archivos_vacios_conservan_encabezado() {
        let tmp = temp_dir("vacios");
        let sales = tmp.join("sales.csv");
        let agg = tmp.join("agg.csv");

        write_sales_csv(&sales, &[]).unwrap();
        write_aggregated_csv(&agg, &[]).unwrap();

        assert!(read_sales_csv(&sales).unwrap().is_empty());
        assert!(read_aggregated_csv(&agg).unwrap().is_empty());
    }

    #[test]
    fn transform_files_end_to_end() {
        let tmp = temp_dir("transform_files");
        let pg = tmp.join("postgres_extract.csv");
        let csv_in = tmp.join("csv_extract.csv");
        let out = tmp.join("transformed_data.csv");

        write_sales_csv(
            &pg,
            &[
                sale(Some("201"), Some("2"), Some("60.00"), "d1"),
                sale(None, Some("2"), Some("60.00"), "d2"),
            ],
        )
        .unwrap();
        write_sales_csv(&csv_in, &[sale(Some("201"), Some("1"), Some("30.00"), "d3")]).unwrap();

        let n = transform_files(&[&pg, &csv_in], &out).unwrap();

        assert_eq!(n, 1);
        assert_eq!(
            read_aggregated_csv(&out).unwrap(),
            vec![AggregatedRecord::new(201, 3, amt("90.00"))]
        );
    }
}
