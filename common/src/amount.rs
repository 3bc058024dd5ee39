use std::{
    fmt,
    iter::Sum,
    ops::{Add, AddAssign},
    str::FromStr,
};

/// Decimales implícitos con los que se guarda internamente un monto.
pub const AMOUNT_SCALE: u32 = 4;
const FACTOR: i128 = 10_i128.pow(AMOUNT_SCALE);

/// Dígitos máximos aceptados al parsear (i128 llega a ~38).
const MAX_DIGITS: usize = 36;

/// Monto en punto fijo: un entero `i128` con `AMOUNT_SCALE` decimales
/// implícitos, al estilo Decimal128. Sumar es exacto; el redondeo a
/// centavos se hace explícitamente con `round_cents`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(i128);

/// División entera redondeando mitad al par.
fn div_round_half_even(value: i128, divisor: i128) -> i128 {
    let q = value / divisor;
    let r = value % divisor;
    let twice = 2 * r.abs();
    if twice > divisor || (twice == divisor && q % 2 != 0) {
        q + value.signum()
    } else {
        q
    }
}

impl Amount {
    pub const ZERO: Amount = Amount(0);

    /// Desde unidades crudas (ya escaladas por `AMOUNT_SCALE`).
    pub fn from_units(units: i128) -> Self {
        Self(units)
    }

    pub fn units(self) -> i128 {
        self.0
    }

    pub fn from_integer(value: i64) -> Self {
        Self(i128::from(value) * FACTOR)
    }

    pub fn from_cents(cents: i64) -> Self {
        Self(i128::from(cents) * (FACTOR / 100))
    }

    /// Para valores que vuelven de la base como REAL.
    pub fn from_f64(value: f64) -> Option<Self> {
        if !value.is_finite() {
            return None;
        }
        let scaled = (value * FACTOR as f64).round();
        if scaled.abs() >= 1e36 {
            return None;
        }
        Some(Self(scaled as i128))
    }

    pub fn to_f64(self) -> f64 {
        self.0 as f64 / FACTOR as f64
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Redondea a 2 decimales, mitad al par (0.125 -> 0.12, 0.135 -> 0.14).
    pub fn round_cents(self) -> Self {
        let step = FACTOR / 100;
        Self(div_round_half_even(self.0, step) * step)
    }

    /// Parsea texto decimal: signo opcional, dígitos, parte fraccionaria
    /// opcional y exponente opcional (`1e3`, `2.5E-2`). Más de
    /// `AMOUNT_SCALE` decimales se redondean mitad al par. `NaN` o `inf` no
    /// son montos.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let (negative, body) = match text.as_bytes().first()? {
            b'-' => (true, &text[1..]),
            b'+' => (false, &text[1..]),
            _ => (false, text),
        };

        let (mantissa, exponent) = match body.split_once(['e', 'E']) {
            Some((m, e)) => (m, parse_exponent(e)?),
            None => (body, 0),
        };

        let (int_part, frac_part) = match mantissa.split_once('.') {
            Some((i, f)) => (i, f),
            None => (mantissa, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return None;
        }
        if !int_part.bytes().all(|b| b.is_ascii_digit())
            || !frac_part.bytes().all(|b| b.is_ascii_digit())
        {
            return None;
        }
        if int_part.len() + frac_part.len() > MAX_DIGITS {
            return None;
        }

        let mut digits: i128 = 0;
        for b in int_part.bytes().chain(frac_part.bytes()) {
            digits = digits * 10 + i128::from(b - b'0');
        }

        // corrimiento decimal hasta la escala interna
        let shift = i64::from(AMOUNT_SCALE) - frac_part.len() as i64 + exponent;
        let units = if shift >= 0 {
            let pow = 10_i128.checked_pow(u32::try_from(shift).ok()?)?;
            digits.checked_mul(pow)?
        } else if -shift > MAX_DIGITS as i64 {
            // más chico que la mitad de la unidad mínima
            0
        } else {
            div_round_half_even(digits, 10_i128.pow((-shift) as u32))
        };
        if units.unsigned_abs() >= 10_u128.pow(MAX_DIGITS as u32) {
            return None;
        }

        Some(Self(if negative { -units } else { units }))
    }

    /// `Some(n)` si el monto no tiene parte fraccionaria.
    pub fn as_integer(self) -> Option<i64> {
        if self.0 % FACTOR != 0 {
            return None;
        }
        i64::try_from(self.0 / FACTOR).ok()
    }
}

/// Exponente de la notación científica: signo opcional y hasta 4 dígitos.
fn parse_exponent(text: &str) -> Option<i64> {
    let digits = text.strip_prefix(['+', '-']).unwrap_or(text);
    if digits.is_empty() || digits.len() > 4 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

impl FromStr for Amount {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Amount::parse(s).ok_or_else(|| format!("monto inválido: '{s}'"))
    }
}

impl Add for Amount {
    type Output = Amount;

    fn add(self, rhs: Amount) -> Amount {
        Amount(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for Amount {
    fn add_assign(&mut self, rhs: Amount) {
        *self = *self + rhs;
    }
}

impl Sum for Amount {
    fn sum<I: Iterator<Item = Amount>>(iter: I) -> Amount {
        iter.fold(Amount::ZERO, Add::add)
    }
}

/// Siempre al menos 2 decimales; los dígitos extra sólo aparecen si el monto
/// no está redondeado a centavos.
impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let factor = FACTOR as u128;
        let int = abs / factor;
        let frac = abs % factor;
        let step = factor / 100;

        if frac % step == 0 {
            write!(f, "{sign}{int}.{:02}", frac / step)
        } else {
            write!(f, "{sign}{int}.{:0width$}", frac, width = AMOUNT_SCALE as usize)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn amt(s: &str) -> Amount {
        Amount::parse(s).unwrap()
    }

    #[test]
    fn parse_acepta_formatos_decimales_simples() {
        assert_eq!(amt("60.00"), Amount::from_cents(6000));
        assert_eq!(amt("22.5"), Amount::from_cents(2250));
        assert_eq!(amt("15"), Amount::from_cents(1500));
        assert_eq!(amt(".5"), Amount::from_cents(50));
        assert_eq!(amt("7."), Amount::from_cents(700));
        assert_eq!(amt("-3.10"), Amount::from_cents(-310));
        assert_eq!(amt(" +1.25 "), Amount::from_cents(125));
    }

    #[test]
    fn parse_rechaza_texto_no_numerico() {
        for bad in ["", ".", "-", "abc", "1.2.3", "NaN", "inf", "1e", "e3", "1e+", "1.5e2.0", "12,50", "1 000"] {
            assert_eq!(Amount::parse(bad), None, "'{bad}' no debería parsear");
        }
    }

    #[test]
    fn parse_acepta_notacion_cientifica() {
        assert_eq!(amt("1e3"), Amount::from_cents(100_000));
        assert_eq!(amt("2.5E-2").units(), 250);
        assert_eq!(amt("-1.5e1"), Amount::from_cents(-1500));
        assert_eq!(amt("6.0e+1"), Amount::from_cents(6000));
        // por debajo de la escala interna redondea mitad al par
        assert_eq!(amt("5e-5").units(), 0);
        assert_eq!(amt("1.5e-4").units(), 2);
        assert_eq!(amt("1e-9999").units(), 0);
        assert_eq!(Amount::parse("1e9999"), None);
    }

    #[test]
    fn parse_redondea_decimales_sobrantes_al_par() {
        // 0.00005 -> 0.0000 ; 0.00015 -> 0.0002
        assert_eq!(amt("0.00005").units(), 0);
        assert_eq!(amt("0.00015").units(), 2);
    }

    #[test]
    fn round_cents_es_mitad_al_par() {
        assert_eq!(amt("0.125").round_cents().to_string(), "0.12");
        assert_eq!(amt("0.135").round_cents().to_string(), "0.14");
        assert_eq!(amt("10.005").round_cents().to_string(), "10.00");
        assert_eq!(amt("-0.135").round_cents().to_string(), "-0.14");
        assert_eq!(amt("0.126").round_cents().to_string(), "0.13");
    }

    #[test]
    fn display_conserva_dos_decimales() {
        assert_eq!(amt("150").to_string(), "150.00");
        assert_eq!(amt("22.5").to_string(), "22.50");
        assert_eq!(amt("0.125").to_string(), "0.1250");
        assert_eq!(Amount::ZERO.to_string(), "0.00");
    }

    #[test]
    fn suma_exacta() {
        let total: Amount = ["0.1", "0.2", "0.3"].iter().map(|s| amt(s)).sum();
        assert_eq!(total, amt("0.6"));
    }

    #[test]
    fn as_integer_solo_para_montos_enteros() {
        assert_eq!(amt("201.0").as_integer(), Some(201));
        assert_eq!(amt("201.5").as_integer(), None);
    }

    #[test]
    fn from_f64_vuelve_de_real() {
        assert_eq!(Amount::from_f64(150.0), Some(amt("150")));
        assert_eq!(Amount::from_f64(22.5), Some(amt("22.50")));
        assert_eq!(Amount::from_f64(f64::NAN), None);
        assert!((amt("90.00").to_f64() - 90.0).abs() < f64::EPSILON);
    }
}
