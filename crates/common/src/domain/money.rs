//! Fee amounts in minor currency units
//!
//! Amounts are kept as integer minor units (sen, cents) everywhere; the
//! decimal form only exists at the settings and email boundary.

/// Parse a decimal string such as `"300"`, `"300.5"` or `"300.00"` into
/// minor units. At most two fractional digits are accepted.
pub fn parse_minor_units(value: &str) -> Option<i64> {
    let value = value.trim();
    if value.is_empty() || value.starts_with('-') {
        return None;
    }

    let (whole, frac) = match value.split_once('.') {
        Some((whole, frac)) => (whole, frac),
        None => (value, ""),
    };

    if whole.is_empty() && frac.is_empty() {
        return None;
    }

    if frac.len() > 2 || !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let whole: i64 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let frac: i64 = match frac.len() {
        0 => 0,
        1 => frac.parse::<i64>().ok()? * 10,
        _ => frac.parse().ok()?,
    };

    whole.checked_mul(100)?.checked_add(frac)
}

/// Render minor units as a two-decimal string, e.g. `30000` -> `"300.00"`
pub fn format_minor_units(amount: i64) -> String {
    let sign = if amount < 0 { "-" } else { "" };
    let abs = amount.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minor_units() {
        assert_eq!(parse_minor_units("300.00"), Some(30000));
        assert_eq!(parse_minor_units("300"), Some(30000));
        assert_eq!(parse_minor_units("300.5"), Some(30050));
        assert_eq!(parse_minor_units(" 12.34 "), Some(1234));
        assert_eq!(parse_minor_units(".5"), Some(50));
        assert_eq!(parse_minor_units("5."), Some(500));
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert_eq!(parse_minor_units(""), None);
        assert_eq!(parse_minor_units("-1"), None);
        assert_eq!(parse_minor_units("1.234"), None);
        assert_eq!(parse_minor_units("abc"), None);
        assert_eq!(parse_minor_units("1,000"), None);
        assert_eq!(parse_minor_units("."), None);
        assert_eq!(parse_minor_units(" . "), None);
    }

    #[test]
    fn test_format_minor_units() {
        assert_eq!(format_minor_units(30000), "300.00");
        assert_eq!(format_minor_units(5), "0.05");
        assert_eq!(format_minor_units(-150), "-1.50");
    }
}
