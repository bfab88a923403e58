//! Cell-level parsing for station observation tables.
//!
//! Each helper takes the trimmed text of one cell. Placeholders such as
//! `"-"` or an empty cell mean "no data" and map to `None`; text that is
//! neither a placeholder nor a usable value is a [`FieldParseFailure`],
//! which callers recover from by treating the field as absent.

use std::sync::LazyLock;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Utc};
use marine_weather_models::time;
use regex::Regex;

/// Cell texts that mean "no data".
pub const PLACEHOLDERS: &[&str] = &["", "-", "－", "―", "—", "--", "×"];

/// Leading non-negative decimal, optionally followed by a unit suffix.
static MEASUREMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([0-9]+(?:\.[0-9]+)?)(.*)$").expect("valid regex"));

/// `H:MM` or `HH:MM`, with optional `:SS`.
static CLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([0-9]{1,2}):([0-9]{2})(?::([0-9]{2}))?$").expect("valid regex")
});

/// A cell whose text could not be interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldParseFailure {
    /// The offending cell text.
    pub text: String,
}

impl std::fmt::Display for FieldParseFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unparseable cell '{}'", self.text)
    }
}

/// Returns `true` if `text` is a "no data" marker.
#[must_use]
pub fn is_placeholder(text: &str) -> bool {
    PLACEHOLDERS.contains(&text.trim())
}

/// Returns the cell text, or `None` for a placeholder.
#[must_use]
pub fn parse_text_field(text: &str) -> Option<String> {
    let text = text.trim();
    if is_placeholder(text) {
        None
    } else {
        Some(text.to_owned())
    }
}

/// Parses a non-negative measurement such as `"5.2"` or `"5.2m/s"`.
///
/// # Errors
///
/// Returns [`FieldParseFailure`] when the text is neither a placeholder nor
/// starts with a non-negative decimal number.
pub fn parse_measurement(text: &str) -> Result<Option<f64>, FieldParseFailure> {
    let text = text.trim();
    if is_placeholder(text) {
        return Ok(None);
    }

    let failure = || FieldParseFailure {
        text: text.to_owned(),
    };

    let caps = MEASUREMENT_RE.captures(text).ok_or_else(failure)?;
    let rest = caps.get(2).map_or("", |m| m.as_str());
    if rest.starts_with('.') || rest.starts_with(|c: char| c.is_ascii_digit()) {
        return Err(failure());
    }

    caps.get(1)
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .map(Some)
        .ok_or_else(failure)
}

/// Parses a bare clock time (`"9:30"`, `"09:30"`, `"09:30:15"`).
#[must_use]
pub fn parse_clock(text: &str) -> Option<NaiveTime> {
    let caps = CLOCK_RE.captures(text.trim())?;
    let hour = caps.get(1)?.as_str().parse().ok()?;
    let minute = caps.get(2)?.as_str().parse().ok()?;
    let second = caps
        .get(3)
        .map_or(Some(0), |m| m.as_str().parse().ok())?;
    NaiveTime::from_hms_opt(hour, minute, second)
}

/// Resolves the time cell of a data row to an absolute instant.
///
/// A bare clock time is placed on `date` in `offset`; anything else goes
/// through [`time::parse_instant`]. No day rollback is applied to clock
/// times that appear to be from the previous evening.
#[must_use]
pub fn parse_row_time(text: &str, date: NaiveDate, offset: FixedOffset) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Some(clock) = parse_clock(text) {
        return time::localize(date.and_time(clock), offset);
    }
    time::parse_instant(text, offset)
}
