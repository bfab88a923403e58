//! Observation table extraction.
//!
//! Station pages carry a single `<table>` whose header row names a time
//! column (`時刻` or `time`), followed by one row per observation:
//!
//! | 時刻 | 風向 | 風速 | 波高 |
//! |------|------|------|------|
//! | 10:00 | 北 | 5.2 | 1.0 |
//!
//! Columns are positional: time, wind direction, wind speed, and (for
//! stations with waves) wave height.

use chrono::NaiveDate;
use marine_weather_models::{Observation, Station};
use scraper::{ElementRef, Html, Selector};

use crate::ParseError;
use crate::parsing::{parse_measurement, parse_row_time, parse_text_field};

/// Header texts that identify the time column (matched case-insensitively).
pub const TIME_MARKERS: &[&str] = &["時刻", "time"];

/// Minimum number of cells in a usable data row.
const MIN_DATA_CELLS: usize = 3;

fn parse_selector(selector: &str) -> Result<Selector, ParseError> {
    Selector::parse(selector).map_err(|e| ParseError::Selector(format!("{selector}: {e}")))
}

fn cell_texts(row: ElementRef<'_>, cell_sel: &Selector) -> Vec<String> {
    row.select(cell_sel)
        .map(|el| el.text().collect::<String>().trim().to_owned())
        .collect()
}

fn is_header_row(cells: &[String]) -> bool {
    let joined = cells.join(" ").to_lowercase();
    TIME_MARKERS.iter().any(|marker| joined.contains(marker))
}

/// Extracts observations from the first table in `html`.
///
/// Bare clock times are dated to `scrape_date` in the station's offset.
/// Rows with fewer than three cells or an unreadable time are skipped. A
/// measurement cell that cannot be read becomes `None` without dropping
/// the row. Wave height is read only for stations that report it.
///
/// # Errors
///
/// * [`ParseError::NoTable`] if the document has no table.
/// * [`ParseError::NoHeaderRow`] if no row names the time column.
pub fn parse_observation_table(
    html: &str,
    station: &Station,
    scrape_date: NaiveDate,
) -> Result<Vec<Observation>, ParseError> {
    let document = Html::parse_document(html);

    let table_sel = parse_selector("table")?;
    let row_sel = parse_selector("tr")?;
    let cell_sel = parse_selector("td, th")?;

    let table = document.select(&table_sel).next().ok_or(ParseError::NoTable)?;

    let rows: Vec<Vec<String>> = table
        .select(&row_sel)
        .map(|row| cell_texts(row, &cell_sel))
        .collect();

    let header_index = rows
        .iter()
        .position(|cells| is_header_row(cells))
        .ok_or(ParseError::NoHeaderRow)?;

    let offset = station.utc_offset();
    let mut observations = Vec::new();

    for cells in &rows[header_index + 1..] {
        if cells.len() < MIN_DATA_CELLS {
            continue;
        }

        let Some(timestamp) = parse_row_time(&cells[0], scrape_date, offset) else {
            log::debug!("[{}] skipping row with time '{}'", station.code, cells[0]);
            continue;
        };

        let wind_speed = parse_measurement(&cells[2]).unwrap_or_else(|e| {
            log::debug!("[{}] wind speed: {e}", station.code);
            None
        });

        let wave_height = if station.has_wave_height {
            cells.get(3).and_then(|text| {
                parse_measurement(text).unwrap_or_else(|e| {
                    log::debug!("[{}] wave height: {e}", station.code);
                    None
                })
            })
        } else {
            None
        };

        observations.push(Observation {
            id: None,
            station_code: station.code.clone(),
            station_name: station.name.clone(),
            timestamp,
            wind_direction: parse_text_field(&cells[1]),
            wind_speed,
            wave_height,
            created_at: None,
        });
    }

    Ok(observations)
}
