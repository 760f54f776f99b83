use rust_decimal::Decimal;
use std::str::FromStr;

/// Fractional digits kept on a computed mean.
pub const MEAN_SCALE: u32 = 16;

/// Parses a response-time field. Surrounding whitespace is ignored; signs,
/// exponents and thousands separators are not accepted.
pub fn parse_decimal(input: &str) -> Option<Decimal> {
    let s = input.trim();
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit() || b == b'.') {
        return None;
    }
    Decimal::from_str(s).ok()
}

/// `sum / count`, rounded to [`MEAN_SCALE`] digits with trailing zeros removed.
pub fn mean(sum: Decimal, count: i64) -> Option<Decimal> {
    if count <= 0 {
        return None;
    }
    sum.checked_div(Decimal::from(count))
        .map(|m| m.round_dp(MEAN_SCALE).normalize())
}
