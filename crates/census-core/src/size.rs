//! Byte sizes written for humans: `15000000`, `15 MB`, `512MiB`, `1.5GB`.

const UNITS: &[(&str, u64)] = &[
    ("B", 1),
    ("KB", 1000),
    ("MB", 1000 * 1000),
    ("GB", 1000 * 1000 * 1000),
    ("TB", 1000 * 1000 * 1000 * 1000),
    ("KIB", 1024),
    ("MIB", 1024 * 1024),
    ("GIB", 1024 * 1024 * 1024),
    ("TIB", 1024 * 1024 * 1024 * 1024),
];

/// Parses a byte size. Decimal units (`KB`, `MB`, ...) are powers of 1000,
/// binary units (`KiB`, `MiB`, ...) powers of 1024. Units are case-insensitive.
///
/// ```
/// use census_core::size::parse_byte_size;
///
/// assert_eq!(parse_byte_size("15000000"), Some(15_000_000));
/// assert_eq!(parse_byte_size("15 MB"), Some(15_000_000));
/// assert_eq!(parse_byte_size("512MiB"), Some(512 * 1024 * 1024));
/// assert_eq!(parse_byte_size("1.5kb"), Some(1500));
/// assert_eq!(parse_byte_size("-1"), None);
/// assert_eq!(parse_byte_size("12 parsecs"), None);
/// ```
pub fn parse_byte_size(input: &str) -> Option<u64> {
    let s = input.trim();
    if s.is_empty() {
        return None;
    }
    if s.bytes().all(|b| b.is_ascii_digit()) {
        return s.parse().ok();
    }

    let split = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s.len());
    let (number, unit) = s.split_at(split);
    if number.is_empty() || number.matches('.').count() > 1 {
        return None;
    }
    let value: f64 = number.parse().ok()?;

    let unit = unit.trim().to_ascii_uppercase();
    let multiplier = if unit.is_empty() {
        1
    } else {
        UNITS.iter().find(|(name, _)| *name == unit)?.1
    };

    let bytes = value * multiplier as f64;
    if !bytes.is_finite() || bytes < 0.0 || bytes > u64::MAX as f64 {
        return None;
    }
    Some(bytes as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_units() {
        assert_eq!(parse_byte_size("10B"), Some(10));
        assert_eq!(parse_byte_size("25 mb"), Some(25_000_000));
        assert_eq!(parse_byte_size("2 GiB"), Some(2 * 1024 * 1024 * 1024));
        assert_eq!(parse_byte_size(" 64KiB "), Some(65_536));
        assert_eq!(parse_byte_size(".5 KB"), Some(500));
    }

    #[test]
    fn test_rejects_garbage() {
        assert_eq!(parse_byte_size(""), None);
        assert_eq!(parse_byte_size("MB"), None);
        assert_eq!(parse_byte_size("1.2.3 MB"), None);
        assert_eq!(parse_byte_size("5 XB"), None);
        assert_eq!(parse_byte_size("5 M B"), None);
    }
}
