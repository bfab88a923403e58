#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Scraping pipeline for coastal station observation pages.
//!
//! A [`PageFetcher`] retrieves raw HTML ([`fetch::HttpFetcher`] over HTTP,
//! [`fetch::StaticFetcher`] from canned pages), [`html_table`] turns the
//! page's observation table into [`Observation`] records, and
//! [`StationScraper`] walks the station registry one station at a time.
//!
//! Failures stop at the station boundary: a station whose page cannot be
//! fetched or parsed contributes zero records and the batch carries on.

pub mod fetch;
pub mod html_table;
pub mod parsing;

use std::time::Duration;

use chrono::Utc;
use marine_weather_models::{Observation, Station};

pub use fetch::{FetchConfig, HttpFetcher, StaticFetcher};

/// Default pause between successive station fetches.
pub const DEFAULT_REQUEST_DELAY: Duration = Duration::from_secs(1);

/// Errors that can occur while fetching a station page.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The request did not complete within the configured timeout.
    #[error("Timed out after {timeout:?} fetching {url}")]
    Timeout {
        /// Requested URL.
        url: String,
        /// Timeout that elapsed.
        timeout: Duration,
    },

    /// The server answered with a non-2xx status.
    #[error("HTTP {status} from {url}")]
    Status {
        /// Requested URL.
        url: String,
        /// Final response status.
        status: reqwest::StatusCode,
    },

    /// The HTTP client could not be constructed.
    #[error("Client error: {0}")]
    Client(String),
}

/// Errors that prevent a page from yielding any rows.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// The document contains no `<table>`.
    #[error("no table found")]
    NoTable,

    /// No row of the table contains a time-column marker.
    #[error("no header row found")]
    NoHeaderRow,

    /// A CSS selector failed to parse.
    #[error("invalid CSS selector '{0}'")]
    Selector(String),
}

/// Errors surfaced by [`StationScraper`] lookups.
#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    /// The requested station code is not registered.
    #[error("Unknown station: {0}")]
    UnknownStation(String),
}

/// Retrieves the raw HTML of a station page.
///
/// Implementations must be `Send + Sync` so a scraper can be shared across
/// request handlers and scheduled tasks.
pub trait PageFetcher: Send + Sync {
    /// Fetches `url` and returns the decoded body.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] on network failure, timeout, or a non-2xx
    /// response.
    fn fetch(&self, url: &str)
    -> impl std::future::Future<Output = Result<String, FetchError>> + Send;
}

/// Scrapes registered stations sequentially, pausing between requests.
///
/// Stations are never fetched concurrently: the pause between requests is
/// the only throttle protecting the upstream sites.
#[derive(Debug, Clone)]
pub struct StationScraper<F> {
    fetcher: F,
    stations: Vec<Station>,
    request_delay: Duration,
}

impl<F: PageFetcher> StationScraper<F> {
    /// Creates a scraper over the full station registry with the default
    /// request delay.
    #[must_use]
    pub fn new(fetcher: F) -> Self {
        Self {
            fetcher,
            stations: marine_weather_station::all_stations().to_vec(),
            request_delay: DEFAULT_REQUEST_DELAY,
        }
    }

    /// Replaces the set of stations to scrape (order is preserved).
    #[must_use]
    pub fn with_stations(mut self, stations: Vec<Station>) -> Self {
        self.stations = stations;
        self
    }

    /// Sets the pause between successive station fetches.
    #[must_use]
    pub const fn with_request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = delay;
        self
    }

    /// Returns the stations this scraper walks, in order.
    #[must_use]
    pub fn stations(&self) -> &[Station] {
        &self.stations
    }

    /// Fetches and parses one station's page.
    ///
    /// Fetch and table-level parse failures are logged and yield an empty
    /// result; this never fails.
    pub async fn scrape_station(&self, station: &Station) -> Vec<Observation> {
        log::info!("[{}] Scraping {}", station.code, station.name);

        let html = match self.fetcher.fetch(&station.url).await {
            Ok(html) => html,
            Err(e) => {
                log::warn!("[{}] Failed to fetch {}: {e}", station.code, station.url);
                return Vec::new();
            }
        };

        let scrape_date = Utc::now().with_timezone(&station.utc_offset()).date_naive();

        match html_table::parse_observation_table(&html, station, scrape_date) {
            Ok(records) => {
                log::info!(
                    "[{}] Scraped {} records from {}",
                    station.code,
                    records.len(),
                    station.name
                );
                records
            }
            Err(e) => {
                log::warn!("[{}] {e}; skipping station", station.code);
                Vec::new()
            }
        }
    }

    /// Scrapes the station registered under `code`.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError::UnknownStation`] if `code` is not one of this
    /// scraper's stations.
    pub async fn scrape_station_by_code(&self, code: &str) -> Result<Vec<Observation>, ScrapeError> {
        let station = self
            .stations
            .iter()
            .find(|s| s.code == code)
            .ok_or_else(|| ScrapeError::UnknownStation(code.to_owned()))?;
        Ok(self.scrape_station(station).await)
    }

    /// Scrapes every station in order and concatenates the results.
    ///
    /// Waits [`Self::with_request_delay`] between successive fetches. A
    /// station that fails contributes nothing; the rest of the batch is
    /// still returned.
    pub async fn scrape_all_stations(&self) -> Vec<Observation> {
        let mut all_records = Vec::new();

        for (i, station) in self.stations.iter().enumerate() {
            if i > 0 && !self.request_delay.is_zero() {
                tokio::time::sleep(self.request_delay).await;
            }
            all_records.extend(self.scrape_station(station).await);
        }

        log::info!(
            "Scrape complete: {} records from {} stations",
            all_records.len(),
            self.stations.len()
        );
        all_records
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use marine_weather_station::all_stations;

    use super::*;
    use crate::fetch::CannedPage;

    fn page(time: &str) -> String {
        format!(
            "<table>
               <tr><th>時刻</th><th>風向</th><th>風速</th><th>波高</th></tr>
               <tr><td>{time}</td><td>北</td><td>5.0</td><td>1.0</td></tr>
             </table>"
        )
    }

    fn fetcher_with_timeout_at(index: usize) -> StaticFetcher {
        let mut fetcher = StaticFetcher::new();
        for (i, station) in all_stations().iter().enumerate() {
            let canned = if i == index {
                CannedPage::Timeout
            } else {
                CannedPage::Html(page("10:00"))
            };
            fetcher = fetcher.with_page(&station.url, canned);
        }
        fetcher
    }

    #[tokio::test]
    async fn failed_station_does_not_abort_batch() {
        let scraper =
            StationScraper::new(fetcher_with_timeout_at(2)).with_request_delay(Duration::ZERO);

        let batch = scraper.scrape_all_stations().await;

        let codes: BTreeSet<&str> = batch.iter().map(|o| o.station_code.as_str()).collect();
        assert_eq!(batch.len(), 4);
        assert!(!codes.contains("daiosaki_lt"));
        assert_eq!(
            codes,
            BTreeSet::from([
                "iragomisaki_vtss",
                "iragosuido_southeast_aisss",
                "nagoyako_bw",
                "yokkaichiko_bkw_lt",
            ])
        );
    }

    #[tokio::test]
    async fn unparseable_page_yields_nothing() {
        let station = &all_stations()[0];
        let fetcher = StaticFetcher::new()
            .with_page(&station.url, CannedPage::Html("<p>maintenance</p>".to_owned()));
        let scraper = StationScraper::new(fetcher);

        assert!(scraper.scrape_station(station).await.is_empty());
    }

    #[tokio::test]
    async fn http_error_yields_nothing() {
        let station = &all_stations()[0];
        let fetcher = StaticFetcher::new().with_page(&station.url, CannedPage::Status(503));
        let scraper = StationScraper::new(fetcher);

        assert!(scraper.scrape_station(station).await.is_empty());
    }

    #[tokio::test]
    async fn unknown_station_code_is_an_error() {
        let scraper = StationScraper::new(StaticFetcher::new());
        let err = scraper.scrape_station_by_code("atlantis").await.unwrap_err();
        assert!(matches!(err, ScrapeError::UnknownStation(code) if code == "atlantis"));
    }

    #[tokio::test]
    async fn wave_height_only_for_wave_stations() {
        let scraper =
            StationScraper::new(fetcher_with_timeout_at(usize::MAX)).with_request_delay(Duration::ZERO);

        for obs in scraper.scrape_all_stations().await {
            let station = all_stations()
                .iter()
                .find(|s| s.code == obs.station_code)
                .unwrap();
            assert_eq!(obs.wave_height.is_some(), station.has_wave_height);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn waits_between_successive_fetches() {
        let stations = all_stations()[..3].to_vec();
        let scraper = StationScraper::new(fetcher_with_timeout_at(usize::MAX))
            .with_stations(stations)
            .with_request_delay(Duration::from_secs(1));

        let started = tokio::time::Instant::now();
        let batch = scraper.scrape_all_stations().await;
        let elapsed = started.elapsed();

        assert_eq!(batch.len(), 3);
        assert!(elapsed >= Duration::from_secs(2), "elapsed {elapsed:?}");
        assert!(elapsed < Duration::from_secs(3), "elapsed {elapsed:?}");
    }
}
