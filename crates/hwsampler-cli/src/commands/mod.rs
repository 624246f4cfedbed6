pub mod record;
pub mod scan;

use std::time::Duration;

/// Parse a duration string like "5m", "30s", "1h", "100ms" or "0.5s".
///
/// A bare number is taken as seconds.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();

    let (numeric, millis_per_unit) = if let Some(rest) = s.strip_suffix("ms") {
        (rest, 1.0)
    } else if let Some(rest) = s.strip_suffix('s') {
        (rest, 1000.0)
    } else if let Some(rest) = s.strip_suffix('m') {
        (rest, 60_000.0)
    } else if let Some(rest) = s.strip_suffix('h') {
        (rest, 3_600_000.0)
    } else {
        // Assume seconds
        (s, 1000.0)
    };

    let value: f64 = numeric
        .trim()
        .parse()
        .map_err(|_| format!("invalid duration: {s}"))?;
    Duration::try_from_secs_f64(value * millis_per_unit / 1000.0)
        .map_err(|_| format!("invalid duration: {s}"))
}
