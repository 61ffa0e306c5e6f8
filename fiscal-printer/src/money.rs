//! Amount scaling for command fields
//!
//! Documents carry `f64` amounts; every conversion to the fixed-point
//! strings the printers expect goes through `Decimal`.

use rust_decimal::prelude::*;

/// Convert f64 to Decimal; non-finite input becomes zero
#[inline]
pub fn to_decimal(value: f64) -> Decimal {
    Decimal::from_f64(value).unwrap_or_else(|| {
        tracing::error!(value = ?value, "Non-finite amount in command field, defaulting to zero");
        Decimal::ZERO
    })
}

/// `value * factor`, truncated toward zero
pub fn scaled(value: f64, factor: i64) -> i64 {
    (to_decimal(value) * Decimal::from(factor))
        .trunc()
        .to_i64()
        .unwrap_or_default()
}

/// `value * 100`, rounded half away from zero
pub fn round_cents(value: f64) -> i64 {
    cents(to_decimal(value))
}

/// Decimal amount in whole cents, rounded half away from zero
pub fn cents(value: Decimal) -> i64 {
    (value * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .unwrap_or_default()
}

/// Whole cents back into an amount
pub fn from_cents(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

/// Amount with the VAT at `rate` percent removed
pub fn net_of_vat(value: f64, rate: f64) -> Decimal {
    let divisor = Decimal::ONE + to_decimal(rate) / Decimal::ONE_HUNDRED;
    if divisor.is_zero() {
        return to_decimal(value);
    }
    to_decimal(value) / divisor
}

/// Rounded to `dp` places and rendered with exactly that many decimals
pub fn fixed(value: Decimal, dp: u32) -> String {
    let rounded = value.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero);
    format!("{:.*}", dp as usize, rounded)
}

/// Decimal rendering that always keeps a fractional part ("2.0", "1.25")
pub fn plain(value: f64) -> String {
    let d = to_decimal(value).normalize();
    if d.scale() == 0 {
        format!("{}.0", d)
    } else {
        d.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scaled_truncates() {
        assert_eq!(scaled(1.0, 1000), 1000);
        assert_eq!(scaled(2.5, 1000), 2500);
        assert_eq!(scaled(21.0, 100), 2100);
        assert_eq!(scaled(10.5, 100), 1050);
        assert_eq!(scaled(0.29, 100), 29);
        assert_eq!(scaled(1.2349, 1000), 1234);
    }

    #[test]
    fn test_round_cents() {
        assert_eq!(round_cents(0.125), 13);
        assert_eq!(round_cents(-0.125), -13);
        assert_eq!(round_cents(3.0), 300);
    }

    #[test]
    fn test_from_cents_keeps_sign() {
        assert_eq!(fixed(from_cents(-50), 2), "-0.50");
        assert_eq!(fixed(from_cents(1234), 2), "12.34");
    }

    #[test]
    fn test_net_of_vat() {
        assert_eq!(fixed(net_of_vat(121.0, 21.0), 4), "100.0000");
        assert_eq!(fixed(net_of_vat(100.0, 21.0), 4), "82.6446");
        assert_eq!(cents(net_of_vat(100.0, 21.0)), 8264);
    }

    #[test]
    fn test_fixed_and_plain() {
        assert_eq!(fixed(to_decimal(2.5), 4), "2.5000");
        assert_eq!(fixed(to_decimal(0.03125), 4), "0.0313");
        assert_eq!(plain(2.0), "2.0");
        assert_eq!(plain(1.25), "1.25");
        assert_eq!(plain(21.0), "21.0");
        assert_eq!(plain(10.5), "10.5");
    }

    #[test]
    fn test_non_finite_is_zero() {
        assert_eq!(scaled(f64::NAN, 100), 0);
        assert_eq!(plain(f64::INFINITY), "0.0");
    }
}
