#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Station, observation, and query types for marine weather collection.
//!
//! Every station scraper produces [`Observation`] records keyed by
//! `(station_code, timestamp)`. Timestamps are absolute UTC instants with
//! second precision; conversion to a display timezone happens only at the
//! edges (CSV export, CLI output).

pub mod time;

use chrono::{DateTime, Duration, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

/// Default sampling interval for a station, in minutes.
pub const DEFAULT_UPDATE_INTERVAL_MINUTES: u32 = 15;

/// Default UTC offset of the source pages' clocks (JST).
pub const DEFAULT_UTC_OFFSET_HOURS: i32 = 9;

const fn default_update_interval_minutes() -> u32 {
    DEFAULT_UPDATE_INTERVAL_MINUTES
}

const fn default_utc_offset_hours() -> i32 {
    DEFAULT_UTC_OFFSET_HOURS
}

/// A fixed coastal observation station.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Station {
    /// Unique, stable station identifier (e.g. `"iragomisaki_vtss"`).
    pub code: String,
    /// Display name (e.g. `"伊良湖岬"`).
    pub name: String,
    /// Page that carries the station's observation table.
    pub url: String,
    /// Whether the station reports wave height in a 4th column.
    pub has_wave_height: bool,
    /// How often the source publishes a new row, in minutes.
    #[serde(default = "default_update_interval_minutes")]
    pub update_interval_minutes: u32,
    /// Offset of the clock used by the source page, in hours east of UTC.
    #[serde(default = "default_utc_offset_hours")]
    pub utc_offset_hours: i32,
    /// Column-group label in the marine CSV export. Stations without a
    /// label are left out of that export.
    #[serde(default)]
    pub marine_label: Option<String>,
}

impl Station {
    /// Returns the source clock offset, falling back to UTC when the
    /// configured hours are out of range.
    #[must_use]
    pub fn utc_offset(&self) -> FixedOffset {
        time::fixed_offset_hours(self.utc_offset_hours)
    }

    /// Returns the station's publishing interval.
    #[must_use]
    pub fn update_interval(&self) -> Duration {
        Duration::minutes(i64::from(self.update_interval_minutes))
    }
}

/// A single wind/wave observation for one station at one instant.
///
/// `id` and `created_at` are assigned by the store and are `None` for
/// freshly scraped or synthesized records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Store-assigned identifier, stable per `(station_code, timestamp)`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// Code of the station that produced this record.
    pub station_code: String,
    /// Denormalized station display name.
    pub station_name: String,
    /// Observation instant (UTC, whole seconds).
    pub timestamp: DateTime<Utc>,
    /// Compass label such as `"北北西"`; `None` when the source shows no data.
    pub wind_direction: Option<String>,
    /// Wind speed in m/s.
    pub wind_speed: Option<f64>,
    /// Wave height in meters. Always `None` for stations without waves.
    pub wave_height: Option<f64>,
    /// When the record was first persisted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Observation {
    /// Creates a record for `station` at `timestamp` with every optional
    /// measurement absent.
    ///
    /// This is the placeholder the aligner emits for a `(station, time)`
    /// pair the source did not report.
    #[must_use]
    pub fn placeholder(station: &Station, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: None,
            station_code: station.code.clone(),
            station_name: station.name.clone(),
            timestamp: time::truncate_to_seconds(timestamp),
            wind_direction: None,
            wind_speed: None,
            wave_height: None,
            created_at: None,
        }
    }

    /// Returns `true` when every measurement field is absent.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.wind_direction.is_none() && self.wind_speed.is_none() && self.wave_height.is_none()
    }

    /// Returns the upsert key.
    #[must_use]
    pub fn key(&self) -> (&str, DateTime<Utc>) {
        (self.station_code.as_str(), self.timestamp)
    }
}

/// Filters for retrieving stored observations.
///
/// All bounds are inclusive. Results are always sorted newest-first and
/// `limit` applies after sorting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservationQuery {
    /// Earliest timestamp to include.
    pub start: Option<DateTime<Utc>>,
    /// Latest timestamp to include.
    pub end: Option<DateTime<Utc>>,
    /// Only return records for this station.
    pub station_code: Option<String>,
    /// Maximum number of records to return.
    pub limit: Option<usize>,
}

impl ObservationQuery {
    /// Creates an unfiltered query.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the inclusive lower bound.
    #[must_use]
    pub const fn with_start(mut self, start: DateTime<Utc>) -> Self {
        self.start = Some(start);
        self
    }

    /// Sets the inclusive upper bound.
    #[must_use]
    pub const fn with_end(mut self, end: DateTime<Utc>) -> Self {
        self.end = Some(end);
        self
    }

    /// Restricts results to one station.
    #[must_use]
    pub fn with_station(mut self, code: &str) -> Self {
        self.station_code = Some(code.to_owned());
        self
    }

    /// Caps the number of results.
    #[must_use]
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Returns `true` if `observation` satisfies every supplied filter
    /// (the limit is not considered).
    #[must_use]
    pub fn matches(&self, observation: &Observation) -> bool {
        if let Some(start) = self.start
            && observation.timestamp < start
        {
            return false;
        }
        if let Some(end) = self.end
            && observation.timestamp > end
        {
            return false;
        }
        self.station_code
            .as_deref()
            .is_none_or(|code| observation.station_code == code)
    }
}

/// Result of a manual or scheduled scrape, as reported to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapeOutcome {
    /// Whether records were scraped and saved.
    pub success: bool,
    /// Human-readable summary or failure reason.
    pub message: String,
    /// Number of records written, on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub records_saved: Option<u64>,
}

impl ScrapeOutcome {
    /// A successful scrape that wrote `count` records.
    #[must_use]
    pub fn saved(count: u64) -> Self {
        Self {
            success: true,
            message: format!("Successfully scraped and saved {count} records"),
            records_saved: Some(count),
        }
    }

    /// A failed scrape with the given reason.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            records_saved: None,
        }
    }
}

/// Aggregate store statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    /// Total number of stored observations.
    pub total_records: u64,
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone as _;

    use super::*;

    fn station(code: &str) -> Station {
        Station {
            code: code.to_owned(),
            name: format!("{code} name"),
            url: format!("https://example.test/{code}.html"),
            has_wave_height: false,
            update_interval_minutes: 15,
            utc_offset_hours: 9,
            marine_label: None,
        }
    }

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, hour, minute, 0).unwrap()
    }

    #[test]
    fn placeholder_has_no_measurements() {
        let obs = Observation::placeholder(&station("a"), at(1, 0));
        assert!(obs.is_empty());
        assert_eq!(obs.station_name, "a name");
        assert_eq!(obs.id, None);
        assert_eq!(obs.created_at, None);
    }

    #[test]
    fn query_bounds_are_inclusive() {
        let mut obs = Observation::placeholder(&station("a"), at(1, 0));
        let query = ObservationQuery::new().with_start(at(1, 0)).with_end(at(1, 0));
        assert!(query.matches(&obs));

        obs.timestamp = at(1, 1);
        assert!(!query.matches(&obs));
    }

    #[test]
    fn query_filters_by_station() {
        let obs = Observation::placeholder(&station("a"), at(1, 0));
        assert!(ObservationQuery::new().with_station("a").matches(&obs));
        assert!(!ObservationQuery::new().with_station("b").matches(&obs));
    }

    #[test]
    fn station_toml_defaults() {
        let json = r#"{"code":"x","name":"X","url":"u","has_wave_height":true}"#;
        let station: Station = serde_json::from_str(json).unwrap();
        assert_eq!(station.update_interval_minutes, 15);
        assert_eq!(station.utc_offset().local_minus_utc(), 9 * 3600);
        assert_eq!(station.marine_label, None);
    }

    #[test]
    fn scrape_outcome_omits_count_on_failure() {
        let json = serde_json::to_value(ScrapeOutcome::failed("No data was scraped")).unwrap();
        assert_eq!(json["success"], false);
        assert!(json.get("records_saved").is_none());

        let json = serde_json::to_value(ScrapeOutcome::saved(10)).unwrap();
        assert_eq!(json["records_saved"], 10);
        assert_eq!(json["message"], "Successfully scraped and saved 10 records");
    }
}
