//! Instant parsing and formatting shared by the parser, stores, and
//! query surfaces.
//!
//! The canonical stored form is fixed-width UTC text
//! (`YYYY-MM-DDTHH:MM:SSZ`), so lexicographic order equals time order.

use chrono::{
    DateTime, FixedOffset, NaiveDate, NaiveDateTime, Offset as _, TimeZone as _, Timelike as _,
    Utc,
};

/// `strftime` pattern of the canonical stored form.
pub const CANONICAL_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Date-time layouts accepted by [`parse_instant`] when the text carries no
/// offset of its own.
const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
];

/// Date-only layouts accepted by [`parse_instant`] (midnight is assumed).
const NAIVE_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];

/// Returns a fixed offset `hours` east of UTC, or UTC when out of range.
#[must_use]
pub fn fixed_offset_hours(hours: i32) -> FixedOffset {
    hours
        .checked_mul(3600)
        .and_then(FixedOffset::east_opt)
        .unwrap_or_else(|| Utc.fix())
}

/// Drops sub-second precision.
#[must_use]
pub fn truncate_to_seconds(instant: DateTime<Utc>) -> DateTime<Utc> {
    instant.with_nanosecond(0).unwrap_or(instant)
}

/// Formats an instant in the canonical stored form.
#[must_use]
pub fn to_canonical(instant: DateTime<Utc>) -> String {
    instant.format(CANONICAL_FORMAT).to_string()
}

/// Parses the canonical stored form (any RFC 3339 text is accepted).
#[must_use]
pub fn from_canonical(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text.trim())
        .ok()
        .map(|dt| truncate_to_seconds(dt.with_timezone(&Utc)))
}

/// Interprets a wall-clock date-time in `offset` as an absolute instant.
#[must_use]
pub fn localize(naive: NaiveDateTime, offset: FixedOffset) -> Option<DateTime<Utc>> {
    offset
        .from_local_datetime(&naive)
        .single()
        .map(|dt| truncate_to_seconds(dt.with_timezone(&Utc)))
}

/// Parses free-form date-time text into an absolute instant.
///
/// Text with an explicit offset (RFC 3339) is taken as-is; otherwise the
/// wall-clock value is interpreted in `offset`. Date-only text resolves to
/// midnight. Returns `None` for anything else.
#[must_use]
pub fn parse_instant(text: &str, offset: FixedOffset) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Some(dt) = from_canonical(text) {
        return Some(dt);
    }

    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return localize(naive, offset);
        }
    }

    for format in NAIVE_DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return localize(date.and_hms_opt(0, 0, 0)?, offset);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone as _;

    use super::*;

    fn jst() -> FixedOffset {
        fixed_offset_hours(9)
    }

    #[test]
    fn canonical_form_is_fixed_width_utc() {
        let dt = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(to_canonical(dt), "2026-01-02T03:04:05Z");
        assert_eq!(from_canonical("2026-01-02T03:04:05Z"), Some(dt));
    }

    #[test]
    fn parses_rfc3339_with_offset() {
        let dt = parse_instant("2026-10-16T09:30:00+09:00", utc_offset()).unwrap();
        assert_eq!(to_canonical(dt), "2026-10-16T00:30:00Z");
    }

    #[test]
    fn parses_naive_text_in_given_offset() {
        let dt = parse_instant("2026-10-16 09:30", jst()).unwrap();
        assert_eq!(to_canonical(dt), "2026-10-16T00:30:00Z");

        let dt = parse_instant("2026/10/16 09:30:15", jst()).unwrap();
        assert_eq!(to_canonical(dt), "2026-10-16T00:30:15Z");
    }

    #[test]
    fn parses_date_only_as_midnight() {
        let dt = parse_instant("2026-10-16", jst()).unwrap();
        assert_eq!(to_canonical(dt), "2026-10-15T15:00:00Z");
    }

    #[test]
    fn drops_fractional_seconds() {
        let dt = parse_instant("2026-10-16T00:00:01.750", utc_offset()).unwrap();
        assert_eq!(to_canonical(dt), "2026-10-16T00:00:01Z");
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_instant("", jst()).is_none());
        assert!(parse_instant("欠測", jst()).is_none());
        assert!(parse_instant("2026-13-40", jst()).is_none());
    }

    #[test]
    fn out_of_range_offset_falls_back_to_utc() {
        assert_eq!(fixed_offset_hours(99).local_minus_utc(), 0);
    }

    fn utc_offset() -> FixedOffset {
        fixed_offset_hours(0)
    }
}
