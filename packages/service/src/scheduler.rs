//! Periodic incremental scraping.

use std::sync::Arc;
use std::time::Duration;

use marine_weather_scraper::PageFetcher;
use tokio::time::MissedTickBehavior;

use crate::WeatherService;

/// Runs [`WeatherService::trigger_incremental_scrape`] every `every`,
/// starting immediately. Never returns.
///
/// A tick that comes due while the previous scrape is still running is
/// skipped rather than queued.
pub async fn run_periodic<F: PageFetcher>(service: Arc<WeatherService<F>>, every: Duration) {
    log::info!("Scheduled scraping every {every:?}");

    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        let outcome = service.trigger_incremental_scrape().await;
        if outcome.success {
            log::info!("Scheduled scrape: {}", outcome.message);
        } else {
            log::error!("Scheduled scrape failed: {}", outcome.message);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use marine_weather_database::MemoryStore;
    use marine_weather_scraper::fetch::CannedPage;
    use marine_weather_scraper::{FetchError, StaticFetcher, StationScraper};
    use marine_weather_station::{REFERENCE_STATION, find_station};

    use super::*;

    struct CountingFetcher {
        inner: StaticFetcher,
        calls: Arc<AtomicUsize>,
    }

    impl PageFetcher for CountingFetcher {
        async fn fetch(&self, url: &str) -> Result<String, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.fetch(url).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn runs_on_every_tick() {
        let station = find_station(REFERENCE_STATION).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let fetcher = CountingFetcher {
            inner: StaticFetcher::new().with_page(
                &station.url,
                CannedPage::Html(
                    "<table><tr><th>時刻</th><th>風向</th><th>風速</th></tr>\
                     <tr><td>10:00</td><td>北</td><td>5.0</td></tr></table>"
                        .to_owned(),
                ),
            ),
            calls: calls.clone(),
        };
        let scraper = StationScraper::new(fetcher)
            .with_stations(vec![station.clone()])
            .with_request_delay(Duration::ZERO);
        let service = Arc::new(
            WeatherService::new(Arc::new(MemoryStore::new()), scraper).with_align(None),
        );

        let handle = tokio::spawn(run_periodic(service.clone(), Duration::from_secs(60)));
        tokio::time::sleep(Duration::from_secs(150)).await;
        handle.abort();

        // Ticks at 0s, 60s, and 120s.
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(service.stats().await.unwrap().total_records, 1);
    }
}
