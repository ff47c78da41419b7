//! Permissive numeric parsers for route source text.
//!
//! Route files in the wild carry trailing junk ("25m"), embedded whitespace
//! ("1 200") and colon-joined unit groups. These parsers accept the longest
//! valid prefix after stripping all whitespace, which is what the historic
//! tooling the dialect grew up with accepted.

/// Parse a floating-point value, stripping whitespace and falling back to
/// the longest parseable prefix. Returns `None` when no prefix parses.
pub fn parse_double(text: &str) -> Option<f64> {
    let stripped: Vec<char> = text.chars().filter(|c| !c.is_whitespace()).collect();
    for n in (1..=stripped.len()).rev() {
        let prefix: String = stripped[..n].iter().collect();
        if let Ok(value) = prefix.parse::<f64>() {
            return Some(value);
        }
    }
    None
}

/// Parse an integer with the same prefix tolerance as [`parse_double`].
/// Fractional prefixes are rounded to the nearest integer.
pub fn parse_int(text: &str) -> Option<i32> {
    let value = parse_double(text)?;
    if (-2147483648.0..=2147483647.0).contains(&value) {
        Some(value.round() as i32)
    } else {
        None
    }
}

/// Parse a value against a unit-of-length factor table.
///
/// A plain number takes the last factor. A colon-joined group distributes
/// its parts over the trailing factors, e.g. `1:30` with factors
/// `[1000, 1]` means 1030.
pub fn parse_double_units(text: &str, factors: &[f64]) -> Option<f64> {
    debug_assert!(!factors.is_empty());
    if let Ok(value) = text.trim().parse::<f64>() {
        return Some(value * factors[factors.len() - 1]);
    }
    let parts: Vec<&str> = text.split(':').collect();
    if parts.len() > factors.len() {
        return None;
    }
    let mut total = 0.0;
    for (i, part) in parts.iter().enumerate() {
        let value = parse_double(part.trim())?;
        let j = i + factors.len() - parts.len();
        total += value * factors[j];
    }
    Some(total)
}

/// Parse a clock time (`hh`, `hh:mm` or `hh:mm:ss`) into seconds since
/// midnight. Used by the station list loader.
pub fn parse_time(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    let mut parts = trimmed.split(':');
    let hours: f64 = parts.next()?.trim().parse().ok()?;
    let minutes: f64 = match parts.next() {
        Some(m) => m.trim().parse().ok()?,
        None => 0.0,
    };
    let seconds: f64 = match parts.next() {
        Some(s) => s.trim().parse().ok()?,
        None => 0.0,
    };
    if parts.next().is_some() || !(0.0..60.0).contains(&minutes) || !(0.0..60.0).contains(&seconds)
    {
        return None;
    }
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

/// Strip one layer of enclosing single quotes, as used around keys and
/// file references in the map dialect.
pub fn unquote(text: &str) -> &str {
    let trimmed = text.trim();
    if trimmed.len() >= 2 && trimmed.starts_with('\'') && trimmed.ends_with('\'') {
        &trimmed[1..trimmed.len() - 1]
    } else {
        trimmed
    }
}
