use std::sync::LazyLock;

use regex::Regex;

use super::ValidationError;

static HOURS_MINUTES_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:(\d+(?:\.\d+)?)\s*h)?\s*(?:(\d+)\s*m)?$").expect("valid duration pattern")
});
static CLOCK_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+):([0-5]\d)$").expect("valid clock pattern"));

/// Parse a user-typed duration into whole seconds.
///
/// Accepts bare hours (`"1.5"`), `"1.5h"`, `"90m"`, `"1h 30m"`, `"1h30m"` and
/// `"2:15"`. Anything else is rejected so the caller can keep the prior value.
pub fn parse_duration_input(input: &str) -> Result<i64, ValidationError> {
    let trimmed = input.trim();
    let invalid = || ValidationError::InvalidDuration(input.to_string());

    if trimmed.is_empty() {
        return Err(invalid());
    }

    if let Ok(hours) = trimmed.parse::<f64>() {
        if !hours.is_finite() || hours < 0.0 {
            return Err(invalid());
        }
        return Ok((hours * 3600.0).round() as i64);
    }

    if let Some(caps) = CLOCK_PATTERN.captures(trimmed) {
        let hours: i64 = caps[1].parse().map_err(|_| invalid())?;
        let minutes: i64 = caps[2].parse().map_err(|_| invalid())?;
        return Ok(hours * 3600 + minutes * 60);
    }

    let caps = HOURS_MINUTES_PATTERN.captures(trimmed).ok_or_else(invalid)?;
    if caps.get(1).is_none() && caps.get(2).is_none() {
        return Err(invalid());
    }
    let hours: f64 = caps
        .get(1)
        .map(|m| m.as_str().parse::<f64>())
        .transpose()
        .map_err(|_| invalid())?
        .unwrap_or(0.0);
    let minutes: i64 = caps
        .get(2)
        .map(|m| m.as_str().parse::<i64>())
        .transpose()
        .map_err(|_| invalid())?
        .unwrap_or(0);

    Ok((hours * 3600.0).round() as i64 + minutes * 60)
}

/// Render seconds as `"2h 05m"`, dropping the hour part under one hour.
pub fn format_duration(seconds: i64) -> String {
    let sign = if seconds < 0 { "-" } else { "" };
    let seconds = seconds.abs();
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    if hours > 0 {
        format!("{sign}{hours}h {minutes:02}m")
    } else {
        format!("{sign}{minutes}m")
    }
}
