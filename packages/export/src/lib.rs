#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CSV export of observations.
//!
//! Two layouts are produced, both UTF-8 with a byte-order mark so that
//! spreadsheet tools detect the encoding of the Japanese headers:
//!
//! * [`write_csv`]: one row per observation.
//! * [`write_marine_csv`]: one row per timestamp with a column group per
//!   labelled station. Fed an aligned batch, every group is populated.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, FixedOffset, Utc};
use marine_weather_models::{Observation, Station};

/// UTF-8 byte-order mark.
pub const BOM: &[u8] = b"\xEF\xBB\xBF";

/// Display layout for instants in exported files.
pub const DISPLAY_FORMAT: &str = "%Y/%m/%d %H:%M";

/// Header of the per-observation export.
pub const HEADERS: [&str; 7] = [
    "観測地点",
    "地点コード",
    "日時",
    "風向",
    "風速(m/s)",
    "波高(m)",
    "登録日時",
];

/// Errors that can occur while rendering CSV.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// The CSV writer failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Flushing the output buffer failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Formats `instant` in `offset` as `YYYY/MM/DD HH:MM`.
#[must_use]
pub fn format_display(instant: DateTime<Utc>, offset: FixedOffset) -> String {
    instant.with_timezone(&offset).format(DISPLAY_FORMAT).to_string()
}

/// Returns `<prefix>_YYYYMMDD_HHMM.csv` for the wall-clock time `now`.
#[must_use]
pub fn export_filename(prefix: &str, now: DateTime<FixedOffset>) -> String {
    format!("{prefix}_{}.csv", now.format("%Y%m%d_%H%M"))
}

fn number(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn finish(writer: csv::Writer<Vec<u8>>) -> Result<Vec<u8>, ExportError> {
    writer.into_inner().map_err(|e| ExportError::Io(e.into_error()))
}

fn bom_writer() -> csv::Writer<Vec<u8>> {
    csv::Writer::from_writer(BOM.to_vec())
}

/// Renders one row per observation, in the given order.
///
/// # Errors
///
/// Returns [`ExportError`] if a record cannot be written.
pub fn write_csv(
    observations: &[Observation],
    display_offset: FixedOffset,
) -> Result<Vec<u8>, ExportError> {
    let mut writer = bom_writer();
    writer.write_record(HEADERS)?;

    for obs in observations {
        writer.write_record([
            obs.station_name.clone(),
            obs.station_code.clone(),
            format_display(obs.timestamp, display_offset),
            obs.wind_direction.clone().unwrap_or_default(),
            number(obs.wind_speed),
            number(obs.wave_height),
            obs.created_at
                .map(|ts| format_display(ts, display_offset))
                .unwrap_or_default(),
        ])?;
    }

    finish(writer)
}

/// Header of the marine export for `stations`.
///
/// Stations without a `marine_label` are skipped.
#[must_use]
pub fn marine_headers(stations: &[Station]) -> Vec<String> {
    let mut headers = vec!["日時".to_owned()];
    for station in stations {
        let Some(label) = &station.marine_label else {
            continue;
        };
        headers.push(format!("{label}_風向"));
        headers.push(format!("{label}_風速"));
        if station.has_wave_height {
            headers.push(format!("{label}_波高"));
        }
    }
    headers
}

/// Renders one row per distinct timestamp (first-seen order) with a column
/// group for every labelled station in `stations`.
///
/// # Errors
///
/// Returns [`ExportError`] if a record cannot be written.
pub fn write_marine_csv(
    observations: &[Observation],
    stations: &[Station],
    display_offset: FixedOffset,
) -> Result<Vec<u8>, ExportError> {
    let mut seen = HashSet::new();
    let mut timestamps = Vec::new();
    let mut by_key: HashMap<(&str, DateTime<Utc>), &Observation> = HashMap::new();
    for obs in observations {
        if seen.insert(obs.timestamp) {
            timestamps.push(obs.timestamp);
        }
        by_key.entry(obs.key()).or_insert(obs);
    }

    let mut writer = bom_writer();
    writer.write_record(marine_headers(stations))?;

    for ts in timestamps {
        let mut record = vec![format_display(ts, display_offset)];
        for station in stations.iter().filter(|s| s.marine_label.is_some()) {
            let obs = by_key.get(&(station.code.as_str(), ts));
            record.push(
                obs.and_then(|o| o.wind_direction.clone())
                    .unwrap_or_default(),
            );
            record.push(number(obs.and_then(|o| o.wind_speed)));
            if station.has_wave_height {
                record.push(number(obs.and_then(|o| o.wave_height)));
            }
        }
        writer.write_record(&record)?;
    }

    finish(writer)
}
