#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Station registry, loaded from embedded TOML definitions.
//!
//! Each `.toml` file in `packages/station/stations/` is baked into the
//! binary at compile time via [`include_str!`]. Registry order is the order
//! of [`STATION_TOMLS`]; scraping, alignment, and export all iterate
//! stations in this order.

use std::sync::LazyLock;

use marine_weather_models::Station;

/// Code of the station whose clock defines the aligned time axis.
pub const REFERENCE_STATION: &str = "iragomisaki_vtss";

/// TOML configs embedded at compile time.
const STATION_TOMLS: &[(&str, &str)] = &[
    (
        "iragomisaki_vtss",
        include_str!("../stations/iragomisaki_vtss.toml"),
    ),
    (
        "iragosuido_southeast_aisss",
        include_str!("../stations/iragosuido_southeast_aisss.toml"),
    ),
    ("daiosaki_lt", include_str!("../stations/daiosaki_lt.toml")),
    ("nagoyako_bw", include_str!("../stations/nagoyako_bw.toml")),
    (
        "yokkaichiko_bkw_lt",
        include_str!("../stations/yokkaichiko_bkw_lt.toml"),
    ),
];

static STATIONS: LazyLock<Vec<Station>> = LazyLock::new(|| {
    STATION_TOMLS
        .iter()
        .map(|(name, toml)| {
            toml::from_str(toml).unwrap_or_else(|e| panic!("Failed to parse {name}.toml: {e}"))
        })
        .collect()
});

/// Returns every configured station in registry order.
///
/// # Panics
///
/// Panics if any embedded TOML config is malformed (the configs are
/// compiled into the binary, so this surfaces on first use in any test).
#[must_use]
pub fn all_stations() -> &'static [Station] {
    &STATIONS
}

/// Looks up a station by code.
#[must_use]
pub fn find_station(code: &str) -> Option<&'static Station> {
    all_stations().iter().find(|s| s.code == code)
}

/// Returns the display name for `code`, or the code itself when unknown.
#[must_use]
pub fn station_name(code: &str) -> &str {
    find_station(code).map_or(code, |s| s.name.as_str())
}
