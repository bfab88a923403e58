#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Time alignment of multi-station observation batches.
//!
//! Stations publish on their own clocks, so a raw scrape batch is ragged:
//! one station may have a 10:00 sample while another only has 10:05. The
//! aligner takes the timestamps observed for a reference station as the
//! canonical axis and produces exactly one record per
//! `(reference timestamp, station)` pair, synthesizing empty placeholders
//! where a station has nothing to contribute.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use marine_weather_models::{Observation, Station};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// How a station's samples are matched to reference timestamps.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AlignStrategy {
    /// Only a sample with exactly the reference timestamp counts.
    #[default]
    Exact,
    /// Falls back to the nearest sample no further than the station's
    /// update interval from the reference timestamp, re-keyed to it.
    WithinInterval,
}

/// Result of [`align`].
#[derive(Debug, Clone, PartialEq)]
pub enum Alignment {
    /// A rectangular batch: `|reference timestamps| × |stations|` records,
    /// grouped by timestamp (first-seen order), stations in registry order.
    Aligned(Vec<Observation>),
    /// The reference station contributed nothing; the input is returned
    /// unchanged.
    NoReferenceData(Vec<Observation>),
}

impl Alignment {
    /// Returns the observations regardless of outcome.
    #[must_use]
    pub fn into_observations(self) -> Vec<Observation> {
        match self {
            Self::Aligned(batch) | Self::NoReferenceData(batch) => batch,
        }
    }

    /// Returns `true` if the batch was aligned.
    #[must_use]
    pub const fn is_aligned(&self) -> bool {
        matches!(self, Self::Aligned(_))
    }
}

/// Distinct timestamps of `reference` in first-seen order.
fn reference_timestamps(batch: &[Observation], reference: &str) -> Vec<DateTime<Utc>> {
    let mut seen = BTreeSet::new();
    batch
        .iter()
        .filter(|o| o.station_code == reference)
        .map(|o| o.timestamp)
        .filter(|ts| seen.insert(*ts))
        .collect()
}

fn nearest_within<'a>(
    samples: &[&'a Observation],
    target: DateTime<Utc>,
    max_distance: chrono::Duration,
) -> Option<&'a Observation> {
    samples
        .iter()
        .map(|o| (*o, (o.timestamp - target).abs()))
        .filter(|(_, distance)| *distance <= max_distance)
        .min_by_key(|(_, distance)| *distance)
        .map(|(o, _)| o)
}

/// Aligns `batch` onto the timestamps of the `reference` station.
///
/// For every distinct reference timestamp and every station in `stations`
/// (in that order) the output holds either the matching input record or a
/// placeholder with all measurements absent. Samples that do not land on a
/// reference timestamp are dropped.
///
/// If the batch contains no records for `reference`, a warning is logged and
/// the batch is returned unchanged as [`Alignment::NoReferenceData`].
#[must_use]
pub fn align(
    batch: Vec<Observation>,
    reference: &str,
    stations: &[Station],
    strategy: AlignStrategy,
) -> Alignment {
    let timestamps = reference_timestamps(&batch, reference);
    if timestamps.is_empty() {
        log::warn!("No data for reference station {reference}; skipping alignment");
        return Alignment::NoReferenceData(batch);
    }

    let mut exact: HashMap<(&str, DateTime<Utc>), &Observation> = HashMap::new();
    let mut by_station: HashMap<&str, Vec<&Observation>> = HashMap::new();
    for obs in &batch {
        exact.entry(obs.key()).or_insert(obs);
        by_station
            .entry(obs.station_code.as_str())
            .or_default()
            .push(obs);
    }

    let mut aligned = Vec::with_capacity(timestamps.len() * stations.len());
    let mut placeholders = 0_usize;

    for &ts in &timestamps {
        for station in stations {
            let found = exact.get(&(station.code.as_str(), ts)).copied().or_else(|| {
                match strategy {
                    AlignStrategy::Exact => None,
                    AlignStrategy::WithinInterval => by_station
                        .get(station.code.as_str())
                        .and_then(|samples| {
                            nearest_within(samples, ts, station.update_interval())
                        }),
                }
            });

            if let Some(obs) = found {
                let mut obs = obs.clone();
                obs.timestamp = ts;
                aligned.push(obs);
            } else {
                placeholders += 1;
                aligned.push(Observation::placeholder(station, ts));
            }
        }
    }

    log::info!(
        "Aligned {} records onto {} reference timestamps ({placeholders} placeholders)",
        aligned.len(),
        timestamps.len()
    );

    Alignment::Aligned(aligned)
}
