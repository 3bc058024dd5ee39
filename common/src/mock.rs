use chrono::{Duration, NaiveDate};
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::amount::Amount;
use crate::engine::SaleRecord;

pub const DEFAULT_SEED: u64 = 42;

/// Catálogo fijo: producto y precio unitario en centavos.
pub const PRODUCT_PRICES: [(i64, i64); 3] = [(201, 3000), (202, 2250), (203, 1500)];

const WELL_FORMED_ROWS: usize = 12;

fn date_text(today: NaiveDate, days_back: i64) -> String {
    (today - Duration::days(days_back)).format("%Y-%m-%d").to_string()
}

/// Filas válidas: producto al azar, cantidad 1..=4, monto = cantidad *
/// precio, fecha dentro de los últimos 7 días.
fn well_formed(rng: &mut StdRng, today: NaiveDate) -> Vec<SaleRecord> {
    (0..WELL_FORMED_ROWS)
        .map(|_| {
            let (product_id, price_cents) = PRODUCT_PRICES[rng.gen_range(0..PRODUCT_PRICES.len())];
            let quantity: i64 = rng.gen_range(1..=4);
            let amount = Amount::from_cents(quantity * price_cents);
            let days_back: i64 = rng.gen_range(0..7);

            SaleRecord {
                product_id: Some(product_id.to_string()),
                quantity: Some(quantity.to_string()),
                sale_amount: Some(amount.to_string()),
                sale_date: Some(date_text(today, days_back)),
            }
        })
        .collect()
}

/// Datos del origen relacional: 12 ventas válidas + 3 filas envenenadas
/// (sin producto, sin cantidad, sin monto). Mismo seed, mismas filas.
pub fn mock_sales(seed: u64, today: NaiveDate) -> Vec<SaleRecord> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut rows = well_formed(&mut rng, today);

    rows.push(SaleRecord::new(None, Some("2"), Some("60.00"), Some(&date_text(today, 3))));
    rows.push(SaleRecord::new(Some("201"), None, Some("30.00"), Some(&date_text(today, 2))));
    rows.push(SaleRecord::new(Some("202"), Some("3"), None, Some(&date_text(today, 1))));
    rows
}

/// Variante para el archivo de ventas en tienda: misma forma, otra secuencia
/// aleatoria, y una cantidad no numérica.
pub fn mock_in_store_sales(seed: u64, today: NaiveDate) -> Vec<SaleRecord> {
    let mut rng = StdRng::seed_from_u64(seed.wrapping_add(1));
    let mut rows = well_formed(&mut rng, today);

    rows.push(SaleRecord::new(Some("203"), Some("dos"), Some("30.00"), Some(&date_text(today, 0))));
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{aggregate, clean};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 4, 10).unwrap()
    }

    #[test]
    fn mock_sales_es_determinista() {
        assert_eq!(mock_sales(42, today()), mock_sales(42, today()));
        assert_ne!(mock_sales(42, today()), mock_sales(7, today()));
    }

    #[test]
    fn mock_sales_tiene_doce_validas_y_tres_envenenadas() {
        let rows = mock_sales(DEFAULT_SEED, today());
        assert_eq!(rows.len(), 15);
        assert_eq!(clean(&rows).len(), 12);
    }

    #[test]
    fn filas_validas_respetan_catalogo_y_fechas() {
        let oldest = today() - Duration::days(6);
        for rec in clean(&mock_sales(DEFAULT_SEED, today())) {
            let (_, price) = PRODUCT_PRICES
                .iter()
                .find(|(id, _)| *id == rec.product_id)
                .expect("producto fuera de catálogo");
            assert!((1..=4).contains(&rec.quantity));
            assert_eq!(rec.amount, Amount::from_cents(rec.quantity * price));

            let date = NaiveDate::parse_from_str(rec.date.as_deref().unwrap(), "%Y-%m-%d").unwrap();
            assert!(date <= today() && date >= oldest);
        }
    }

    #[test]
    fn in_store_descarta_la_cantidad_no_numerica() {
        let rows = mock_in_store_sales(DEFAULT_SEED, today());
        assert_eq!(rows.len(), 13);
        assert_eq!(clean(&rows).len(), 12);
        assert!(!aggregate(&[rows]).is_empty());
    }
}
