//! Numeric token helpers for fixed-format input.

/// Parse a real number, accepting the Fortran shorthand exponent forms
/// (`1.5-3`, `2+4`) alongside the usual `1.5e-3`.
pub fn parse_real(text: &str) -> Option<f64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(v) = text.parse::<f64>() {
        return Some(v);
    }

    // Exponent sign without a letter: the first +/- after a digit or '.'.
    let bytes = text.as_bytes();
    let split = (1..bytes.len()).find(|&i| {
        (bytes[i] == b'-' || bytes[i] == b'+')
            && (bytes[i - 1].is_ascii_digit() || bytes[i - 1] == b'.')
    })?;

    let (mantissa, exponent) = text.split_at(split);
    let mantissa: f64 = mantissa.parse().ok()?;
    let exponent: i32 = exponent.parse().ok()?;
    Some(mantissa * 10f64.powi(exponent))
}

/// Parse a plain signed integer token (`12`, `-3`, `+4`).
pub fn parse_int(text: &str) -> Option<i64> {
    let digits = text
        .strip_prefix(|c: char| c == '-' || c == '+')
        .unwrap_or(text);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_real_standard_forms() {
        assert_eq!(parse_real("-7.8"), Some(-7.8));
        assert_eq!(parse_real("1e-3"), Some(1e-3));
        assert_eq!(parse_real("2"), Some(2.0));
    }

    #[test]
    fn parse_real_fortran_exponent() {
        let v = parse_real("1.5-3").unwrap();
        assert!((v - 1.5e-3).abs() < 1e-12);
        let v = parse_real("-2.0+2").unwrap();
        assert!((v + 200.0).abs() < 1e-9);
    }

    #[test]
    fn parse_real_rejects_garbage() {
        assert_eq!(parse_real("abc"), None);
        assert_eq!(parse_real(""), None);
    }

    #[test]
    fn parse_int_accepts_signs_only() {
        assert_eq!(parse_int("-3"), Some(-3));
        assert_eq!(parse_int("+4"), Some(4));
        assert_eq!(parse_int("3.0"), None);
        assert_eq!(parse_int("2r"), None);
        assert_eq!(parse_int("-"), None);
    }
}
