/// Turns monitor readings such as `"15,0 %"` or `"67,4 °C"` into numbers.
/// Anything unreadable, `"N/A"` included, becomes `0.0`.
pub fn normalize(raw: Option<&str>) -> f64 {
    let Some(raw) = raw else {
        return 0.0;
    };
    if raw.is_empty() || raw.contains("N/A") {
        return 0.0;
    }

    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, ',' | '.' | '-'))
        .map(|c| if c == ',' { '.' } else { c })
        .collect();

    match cleaned.parse::<f64>() {
        Ok(v) if v.is_finite() => v,
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_locale_formatted_readings() {
        assert_eq!(normalize(Some("15,0 %")), 15.0);
        assert_eq!(normalize(Some("67,4 °C")), 67.4);
        assert_eq!(normalize(Some("45.5 W")), 45.5);
        assert_eq!(normalize(Some("-3,5 °C")), -3.5);
    }

    #[test]
    fn invalid_input_becomes_zero() {
        assert_eq!(normalize(None), 0.0);
        assert_eq!(normalize(Some("")), 0.0);
        assert_eq!(normalize(Some("N/A")), 0.0);
        assert_eq!(normalize(Some("12 N/A")), 0.0);
        assert_eq!(normalize(Some("garbage")), 0.0);
        assert_eq!(normalize(Some("1,2,3")), 0.0);
    }
}
