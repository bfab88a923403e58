#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! API request and response types for the marine weather server.
//!
//! These types are serialized to JSON with `snake_case` field names. They
//! are separate from the domain types so the API contract can evolve
//! independently.

use chrono::{DateTime, Utc};
use marine_weather_models::{Observation, ScrapeOutcome, Station, StoreStats};
use serde::{Deserialize, Serialize};

/// An observation as returned by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiObservation {
    /// Store-assigned ID.
    pub id: Option<i64>,
    /// Station code.
    pub station_code: String,
    /// Station display name.
    pub station_name: String,
    /// Observation instant (RFC 3339, UTC).
    pub timestamp: DateTime<Utc>,
    /// Compass label.
    pub wind_direction: Option<String>,
    /// Wind speed in m/s.
    pub wind_speed: Option<f64>,
    /// Wave height in meters.
    pub wave_height: Option<f64>,
    /// When the record was first saved.
    pub created_at: Option<DateTime<Utc>>,
}

impl From<Observation> for ApiObservation {
    fn from(obs: Observation) -> Self {
        Self {
            id: obs.id,
            station_code: obs.station_code,
            station_name: obs.station_name,
            timestamp: obs.timestamp,
            wind_direction: obs.wind_direction,
            wind_speed: obs.wind_speed,
            wave_height: obs.wave_height,
            created_at: obs.created_at,
        }
    }
}

/// A station as returned by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiStation {
    /// Station code.
    pub code: String,
    /// Display name.
    pub name: String,
    /// Source page.
    pub url: String,
    /// Whether wave height is reported.
    pub has_wave_height: bool,
    /// Publishing interval in minutes.
    pub update_interval_minutes: u32,
}

impl From<&Station> for ApiStation {
    fn from(station: &Station) -> Self {
        Self {
            code: station.code.clone(),
            name: station.name.clone(),
            url: station.url.clone(),
            has_wave_height: station.has_wave_height,
            update_interval_minutes: station.update_interval_minutes,
        }
    }
}

/// Query parameters for the data and export endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WeatherQueryParams {
    /// Inclusive lower bound (RFC 3339 or local `YYYY-MM-DD[ HH:MM]`).
    pub start_date: Option<String>,
    /// Inclusive upper bound.
    pub end_date: Option<String>,
    /// Restrict to one station.
    pub station_code: Option<String>,
    /// Maximum number of records.
    pub limit: Option<usize>,
}

/// Response body of `POST /api/weather/scrape`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiScrapeResult {
    /// Whether records were saved.
    pub success: bool,
    /// Human-readable summary.
    pub message: String,
    /// Number of records saved, on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub records_saved: Option<u64>,
}

impl From<ScrapeOutcome> for ApiScrapeResult {
    fn from(outcome: ScrapeOutcome) -> Self {
        Self {
            success: outcome.success,
            message: outcome.message,
            records_saved: outcome.records_saved,
        }
    }
}

/// Response body of `GET /api/weather/stats`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiStats {
    /// Total stored observations.
    pub total_records: u64,
}

impl From<StoreStats> for ApiStats {
    fn from(stats: StoreStats) -> Self {
        Self {
            total_records: stats.total_records,
        }
    }
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiHealth {
    /// Whether the server is healthy.
    pub healthy: bool,
    /// Server version.
    pub version: String,
}

/// Error body returned with 4xx/5xx responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    /// Human-readable message.
    pub error: String,
}

impl ApiError {
    /// Creates an error body.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
