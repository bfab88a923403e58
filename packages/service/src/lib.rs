#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! The marine weather facade.
//!
//! [`WeatherService`] wires the scraper, the aligner, and an
//! [`ObservationStore`] together and is the only surface the HTTP server and
//! the CLI talk to. It is built once per process and shared by reference.

pub mod config;
pub mod scheduler;

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::FixedOffset;
use marine_weather_align::{AlignStrategy, align};
use marine_weather_database::{MemoryStore, ObservationStore, SqlStore, StoreError};
use marine_weather_export::ExportError;
use marine_weather_models::{
    Observation, ObservationQuery, ScrapeOutcome, Station, StoreStats, time,
};
use marine_weather_scraper::{FetchError, HttpFetcher, PageFetcher, ScrapeError, StationScraper};

pub use config::{AlignMode, ConfigError, ServiceConfig, StoreKind};

/// Errors surfaced by [`WeatherService`].
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A scrape request named an unknown station.
    #[error(transparent)]
    Scrape(#[from] ScrapeError),

    /// A range bound could not be parsed.
    #[error("Invalid date/time: '{0}'")]
    InvalidInstant(String),

    /// CSV rendering failed.
    #[error(transparent)]
    Export(#[from] ExportError),

    /// The HTTP fetcher could not be built.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Configuration was invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Opens the store selected by `config`.
///
/// # Errors
///
/// Returns [`StoreError`] if the database cannot be opened.
pub async fn open_store(config: &ServiceConfig) -> Result<Arc<dyn ObservationStore>, StoreError> {
    Ok(match config.store {
        StoreKind::Memory => {
            log::info!("Using in-memory store");
            Arc::new(MemoryStore::new())
        }
        StoreKind::Sqlite => Arc::new(SqlStore::open_sqlite(&config.sqlite_path).await?),
        StoreKind::Postgres => Arc::new(SqlStore::connect_postgres(&config.database_url).await?),
    })
}

/// Scrape, align, persist, and query marine weather observations.
pub struct WeatherService<F> {
    store: Arc<dyn ObservationStore>,
    scraper: StationScraper<F>,
    reference_station: String,
    align: Option<AlignStrategy>,
    display_offset: FixedOffset,
    scrape_lock: tokio::sync::Mutex<()>,
}

impl WeatherService<HttpFetcher> {
    /// Builds a service that scrapes over HTTP, using the store and
    /// settings from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] if the fetcher or store cannot be built.
    pub async fn from_config(config: &ServiceConfig) -> Result<Self, ServiceError> {
        let fetcher = HttpFetcher::new(&config.fetch_config())?;
        let scraper = StationScraper::new(fetcher).with_request_delay(config.request_delay());
        let store = open_store(config).await?;

        Ok(Self::new(store, scraper)
            .with_reference_station(&config.reference_station)
            .with_align(config.align.strategy())
            .with_display_offset(time::fixed_offset_hours(config.display_utc_offset_hours)))
    }
}

impl<F: PageFetcher> WeatherService<F> {
    /// Creates a service with exact alignment on the default reference
    /// station and JST display times.
    #[must_use]
    pub fn new(store: Arc<dyn ObservationStore>, scraper: StationScraper<F>) -> Self {
        Self {
            store,
            scraper,
            reference_station: marine_weather_station::REFERENCE_STATION.to_owned(),
            align: Some(AlignStrategy::Exact),
            display_offset: time::fixed_offset_hours(marine_weather_models::DEFAULT_UTC_OFFSET_HOURS),
            scrape_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Sets the station whose timestamps define the aligned time axis.
    #[must_use]
    pub fn with_reference_station(mut self, code: &str) -> Self {
        code.clone_into(&mut self.reference_station);
        self
    }

    /// Sets the alignment applied to scrape batches (`None` saves raw
    /// batches).
    #[must_use]
    pub const fn with_align(mut self, align: Option<AlignStrategy>) -> Self {
        self.align = align;
        self
    }

    /// Sets the offset used to render and interpret display times.
    #[must_use]
    pub const fn with_display_offset(mut self, offset: FixedOffset) -> Self {
        self.display_offset = offset;
        self
    }

    /// Offset used for display times.
    #[must_use]
    pub const fn display_offset(&self) -> FixedOffset {
        self.display_offset
    }

    /// The stations this service scrapes, in registry order.
    #[must_use]
    pub fn stations(&self) -> &[Station] {
        self.scraper.stations()
    }

    /// Newest stored record per station. Stations without data are absent.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Store`] if the store fails.
    pub async fn get_latest(&self) -> Result<BTreeMap<String, Observation>, ServiceError> {
        Ok(self.store.latest().await?)
    }

    /// Builds a query from textual bounds.
    ///
    /// Bounds without an explicit offset are read in the display offset.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::InvalidInstant`] for an unparseable bound.
    pub fn range_query(
        &self,
        start: Option<&str>,
        end: Option<&str>,
        station_code: Option<&str>,
        limit: Option<usize>,
    ) -> Result<ObservationQuery, ServiceError> {
        let parse = |text: &str| {
            time::parse_instant(text, self.display_offset)
                .ok_or_else(|| ServiceError::InvalidInstant(text.to_owned()))
        };

        let mut query = ObservationQuery::new();
        if let Some(start) = start.filter(|s| !s.trim().is_empty()) {
            query = query.with_start(parse(start)?);
        }
        if let Some(end) = end.filter(|s| !s.trim().is_empty()) {
            query = query.with_end(parse(end)?);
        }
        if let Some(code) = station_code.filter(|s| !s.is_empty()) {
            query = query.with_station(code);
        }
        query.limit = limit;
        Ok(query)
    }

    /// Stored records matching the given bounds, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::InvalidInstant`] for an unparseable bound or
    /// [`ServiceError::Store`] if the store fails.
    pub async fn get_range(
        &self,
        start: Option<&str>,
        end: Option<&str>,
        station_code: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<Observation>, ServiceError> {
        let query = self.range_query(start, end, station_code, limit)?;
        self.query(&query).await
    }

    /// Stored records matching `query`, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Store`] if the store fails.
    pub async fn query(&self, query: &ObservationQuery) -> Result<Vec<Observation>, ServiceError> {
        Ok(self.store.query(query).await?)
    }

    /// Store statistics.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Store`] if the store fails.
    pub async fn stats(&self) -> Result<StoreStats, ServiceError> {
        Ok(StoreStats {
            total_records: self.store.count().await?,
        })
    }

    /// Scrapes every station and applies the configured alignment.
    pub async fn collect_batch(&self) -> Vec<Observation> {
        let batch = self.scraper.scrape_all_stations().await;
        match self.align {
            Some(strategy) if !batch.is_empty() => {
                align(batch, &self.reference_station, self.stations(), strategy)
                    .into_observations()
            }
            _ => batch,
        }
    }

    /// Scrapes one station without aligning or saving.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Scrape`] if `code` is not a known station.
    pub async fn scrape_station(&self, code: &str) -> Result<Vec<Observation>, ServiceError> {
        Ok(self.scraper.scrape_station_by_code(code).await?)
    }

    /// Scrapes, aligns, and saves one batch.
    ///
    /// Never fails: problems are reported in the outcome. An overlapping
    /// call returns immediately with `success = false`.
    pub async fn trigger_scrape(&self) -> ScrapeOutcome {
        let Ok(_guard) = self.scrape_lock.try_lock() else {
            log::warn!("Scrape requested while another is running");
            return ScrapeOutcome::failed("A scrape is already in progress");
        };

        let batch = self.collect_batch().await;
        if batch.is_empty() {
            return ScrapeOutcome::failed("No data was scraped");
        }

        self.save(&batch).await
    }

    /// Like [`Self::trigger_scrape`], but only saves records newer than the
    /// latest stored record of their station.
    pub async fn trigger_incremental_scrape(&self) -> ScrapeOutcome {
        let Ok(_guard) = self.scrape_lock.try_lock() else {
            log::warn!("Scheduled scrape skipped: another scrape is running");
            return ScrapeOutcome::failed("A scrape is already in progress");
        };

        let latest = match self.store.latest().await {
            Ok(latest) => latest,
            Err(e) => return ScrapeOutcome::failed(e.to_string()),
        };

        let batch = self.collect_batch().await;
        if batch.is_empty() {
            return ScrapeOutcome::failed("No data was scraped");
        }

        let fresh: Vec<Observation> = batch
            .into_iter()
            .filter(|obs| {
                latest
                    .get(&obs.station_code)
                    .is_none_or(|stored| obs.timestamp > stored.timestamp)
            })
            .collect();

        if fresh.is_empty() {
            log::info!("No new data to save");
            return ScrapeOutcome {
                success: true,
                message: "No new data to save".to_owned(),
                records_saved: Some(0),
            };
        }

        self.save(&fresh).await
    }

    async fn save(&self, batch: &[Observation]) -> ScrapeOutcome {
        match self.store.upsert(batch).await {
            Ok(count) => {
                log::info!("Saved {count} records");
                ScrapeOutcome::saved(count)
            }
            Err(e) => {
                log::error!("Failed to save scraped data: {e}");
                ScrapeOutcome::failed(e.to_string())
            }
        }
    }

    /// Renders stored records matching `query` as the per-observation CSV.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] if the store or the CSV writer fails.
    pub async fn export_csv(&self, query: &ObservationQuery) -> Result<Vec<u8>, ServiceError> {
        let records = self.query(query).await?;
        Ok(marine_weather_export::write_csv(&records, self.display_offset)?)
    }

    /// Renders stored records matching `query` as the marine CSV.
    ///
    /// Records are aligned onto the reference station first so every
    /// column group is filled for every row.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] if the store or the CSV writer fails.
    pub async fn export_marine_csv(
        &self,
        query: &ObservationQuery,
    ) -> Result<Vec<u8>, ServiceError> {
        let records = self.query(query).await?;
        let strategy = self.align.unwrap_or_default();
        let records =
            align(records, &self.reference_station, self.stations(), strategy).into_observations();
        Ok(marine_weather_export::write_marine_csv(
            &records,
            self.stations(),
            self.display_offset,
        )?)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use marine_weather_scraper::StaticFetcher;
    use marine_weather_scraper::fetch::CannedPage;
    use marine_weather_station::{REFERENCE_STATION, all_stations};

    use super::*;

    fn page(rows: &[(&str, &str)]) -> CannedPage {
        let body: String = rows
            .iter()
            .map(|(time, speed)| {
                format!("<tr><td>{time}</td><td>北</td><td>{speed}</td><td>0.5</td></tr>")
            })
            .collect();
        CannedPage::Html(format!(
            "<table><tr><th>時刻</th><th>風向</th><th>風速</th><th>波高</th></tr>{body}</table>"
        ))
    }

    fn fetcher(pages: &[(&str, CannedPage)]) -> StaticFetcher {
        pages.iter().fold(StaticFetcher::new(), |f, (code, page)| {
            let station = all_stations().iter().find(|s| s.code == *code).unwrap();
            f.with_page(&station.url, page.clone())
        })
    }

    fn service(fetcher: StaticFetcher) -> WeatherService<StaticFetcher> {
        let scraper = StationScraper::new(fetcher).with_request_delay(Duration::ZERO);
        WeatherService::new(Arc::new(MemoryStore::new()), scraper)
    }

    #[tokio::test]
    async fn scrape_saves_rectangular_batch() {
        let svc = service(fetcher(&[
            (REFERENCE_STATION, page(&[("10:00", "5.0"), ("10:15", "5.5")])),
            ("daiosaki_lt", page(&[("10:00", "3.0")])),
        ]));

        let outcome = svc.trigger_scrape().await;

        assert!(outcome.success, "{}", outcome.message);
        assert_eq!(outcome.records_saved, Some(2 * all_stations().len() as u64));
        assert_eq!(svc.stats().await.unwrap().total_records, 10);
    }

    #[tokio::test]
    async fn empty_scrape_reports_failure() {
        let svc = service(StaticFetcher::new());

        let outcome = svc.trigger_scrape().await;

        assert!(!outcome.success);
        assert_eq!(outcome.message, "No data was scraped");
        assert_eq!(outcome.records_saved, None);
    }

    #[tokio::test]
    async fn unaligned_scrape_saves_raw_rows() {
        let svc = service(fetcher(&[
            (REFERENCE_STATION, page(&[("10:00", "5.0")])),
            ("nagoyako_bw", page(&[("10:05", "2.0")])),
        ]))
        .with_align(None);

        let outcome = svc.trigger_scrape().await;

        assert_eq!(outcome.records_saved, Some(2));
    }

    #[tokio::test]
    async fn incremental_scrape_skips_already_stored_rows() {
        let svc = service(fetcher(&[(REFERENCE_STATION, page(&[("10:00", "5.0")]))]))
            .with_align(None);

        assert_eq!(svc.trigger_incremental_scrape().await.records_saved, Some(1));

        let second = svc.trigger_incremental_scrape().await;
        assert!(second.success);
        assert_eq!(second.records_saved, Some(0));
        assert_eq!(svc.stats().await.unwrap().total_records, 1);
    }

    #[tokio::test]
    async fn overlapping_scrape_is_rejected() {
        let svc = service(StaticFetcher::new());
        let _held = svc.scrape_lock.lock().await;

        let outcome = svc.trigger_scrape().await;

        assert!(!outcome.success);
        assert_eq!(outcome.message, "A scrape is already in progress");
    }

    #[tokio::test]
    async fn range_accepts_display_local_bounds() {
        let svc = service(fetcher(&[(
            REFERENCE_STATION,
            page(&[
                ("2026/10/15 09:00", "1.0"),
                ("2026/10/15 10:00", "2.0"),
                ("2026/10/15 11:00", "3.0"),
            ]),
        )]))
        .with_align(None);
        svc.trigger_scrape().await;

        let start = "2026-10-15 09:30";
        let end = "2026-10-15T11:00:00+09:00";

        let records = svc
            .get_range(Some(start), Some(end), Some(REFERENCE_STATION), None)
            .await
            .unwrap();

        let speeds: Vec<_> = records.iter().map(|o| o.wind_speed).collect();
        assert_eq!(speeds, vec![Some(3.0), Some(2.0)]);
    }

    #[tokio::test]
    async fn invalid_range_bound_is_an_error() {
        let svc = service(StaticFetcher::new());
        let err = svc.get_range(Some("yesterday"), None, None, None).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInstant(text) if text == "yesterday"));
    }

    #[tokio::test]
    async fn single_station_preview_does_not_save() {
        let svc = service(fetcher(&[("daiosaki_lt", page(&[("10:00", "3.0")]))]));

        let preview = svc.scrape_station("daiosaki_lt").await.unwrap();
        assert_eq!(preview.len(), 1);
        assert_eq!(preview[0].wave_height, Some(0.5));
        assert_eq!(svc.stats().await.unwrap().total_records, 0);

        let err = svc.scrape_station("atlantis").await.unwrap_err();
        assert!(matches!(err, ServiceError::Scrape(ScrapeError::UnknownStation(_))));
    }

    #[tokio::test]
    async fn latest_is_sparse() {
        let svc = service(fetcher(&[(
            "nagoyako_bw",
            page(&[("09:00", "1.0"), ("10:00", "2.0")]),
        )]))
        .with_align(None);
        svc.trigger_scrape().await;

        let latest = svc.get_latest().await.unwrap();

        assert_eq!(latest.len(), 1);
        assert_eq!(latest["nagoyako_bw"].wind_speed, Some(2.0));
    }

    #[tokio::test]
    async fn marine_export_has_one_row_per_reference_time() {
        let svc = service(fetcher(&[
            (REFERENCE_STATION, page(&[("10:00", "5.0"), ("10:15", "5.5")])),
            ("iragosuido_southeast_aisss", page(&[("10:00", "7.0")])),
        ]));
        svc.trigger_scrape().await;

        let bytes = svc.export_marine_csv(&ObservationQuery::new()).await.unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[1].ends_with("10:15,北,5.5,,,,,,"), "{}", lines[1]);
        assert!(lines[2].ends_with("10:00,北,5,北,7,0.5,,,"), "{}", lines[2]);
    }
}
