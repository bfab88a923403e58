//! HTTP handler functions for the marine weather API.

use std::collections::BTreeMap;

use actix_web::{HttpResponse, http::header, web};
use chrono::Utc;
use marine_weather_models::ObservationQuery;
use marine_weather_scraper::PageFetcher;
use marine_weather_server_models::{
    ApiError, ApiHealth, ApiObservation, ApiScrapeResult, ApiStation, ApiStats,
    WeatherQueryParams,
};
use marine_weather_service::{ServiceError, WeatherService};

use crate::AppState;

/// Maps a facade error to a JSON error response.
///
/// Unparseable bounds are the caller's fault (400); everything else is
/// logged and reported as a 500 with a generic message.
fn error_response(context: &str, err: &ServiceError) -> HttpResponse {
    if let ServiceError::InvalidInstant(_) = err {
        return HttpResponse::BadRequest().json(ApiError::new(err.to_string()));
    }
    log::error!("{context}: {err}");
    HttpResponse::InternalServerError().json(ApiError::new(context))
}

fn query_from_params<F: PageFetcher>(
    service: &WeatherService<F>,
    params: &WeatherQueryParams,
) -> Result<ObservationQuery, ServiceError> {
    service.range_query(
        params.start_date.as_deref(),
        params.end_date.as_deref(),
        params.station_code.as_deref(),
        params.limit,
    )
}

fn csv_response(body: Vec<u8>, filename: &str) -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/csv; charset=utf-8")
        .insert_header((
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{filename}\""),
        ))
        .body(body)
}

/// `GET /api/health`
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(ApiHealth {
        healthy: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// `GET /api/stations`
pub async fn stations<F: PageFetcher + 'static>(state: web::Data<AppState<F>>) -> HttpResponse {
    let stations: Vec<ApiStation> = state
        .service
        .stations()
        .iter()
        .map(ApiStation::from)
        .collect();
    HttpResponse::Ok().json(stations)
}

/// `GET /api/weather/latest`
///
/// Newest stored record per station, keyed by station code.
pub async fn latest<F: PageFetcher + 'static>(state: web::Data<AppState<F>>) -> HttpResponse {
    match state.service.get_latest().await {
        Ok(latest) => {
            let body: BTreeMap<String, ApiObservation> = latest
                .into_iter()
                .map(|(code, obs)| (code, ApiObservation::from(obs)))
                .collect();
            HttpResponse::Ok().json(body)
        }
        Err(e) => error_response("Failed to load latest observations", &e),
    }
}

/// `GET /api/weather/data`
///
/// Stored records within optional bounds, newest first.
pub async fn data<F: PageFetcher + 'static>(
    state: web::Data<AppState<F>>,
    params: web::Query<WeatherQueryParams>,
) -> HttpResponse {
    let records = match query_from_params(&state.service, &params) {
        Ok(query) => state.service.query(&query).await,
        Err(e) => Err(e),
    };

    match records {
        Ok(records) => {
            let body: Vec<ApiObservation> =
                records.into_iter().map(ApiObservation::from).collect();
            HttpResponse::Ok().json(body)
        }
        Err(e) => error_response("Failed to query observations", &e),
    }
}

/// `GET /api/weather/stats`
pub async fn stats<F: PageFetcher + 'static>(state: web::Data<AppState<F>>) -> HttpResponse {
    match state.service.stats().await {
        Ok(stats) => HttpResponse::Ok().json(ApiStats::from(stats)),
        Err(e) => error_response("Failed to count observations", &e),
    }
}

/// `POST /api/weather/scrape`
///
/// Always answers 200; the body's `success` flag carries the outcome.
pub async fn scrape<F: PageFetcher + 'static>(state: web::Data<AppState<F>>) -> HttpResponse {
    log::info!("Starting weather data scraping...");
    let outcome = state.service.trigger_scrape().await;
    HttpResponse::Ok().json(ApiScrapeResult::from(outcome))
}

/// `GET /api/weather/export.csv`
pub async fn export_csv<F: PageFetcher + 'static>(
    state: web::Data<AppState<F>>,
    params: web::Query<WeatherQueryParams>,
) -> HttpResponse {
    let body = match query_from_params(&state.service, &params) {
        Ok(query) => state.service.export_csv(&query).await,
        Err(e) => Err(e),
    };

    match body {
        Ok(body) => {
            let now = Utc::now().with_timezone(&state.service.display_offset());
            csv_response(
                body,
                &marine_weather_export::export_filename("weather_data", now),
            )
        }
        Err(e) => error_response("Failed to export observations", &e),
    }
}

/// `GET /api/weather/export/marine.csv`
pub async fn export_marine_csv<F: PageFetcher + 'static>(
    state: web::Data<AppState<F>>,
    params: web::Query<WeatherQueryParams>,
) -> HttpResponse {
    let body = match query_from_params(&state.service, &params) {
        Ok(query) => state.service.export_marine_csv(&query).await,
        Err(e) => Err(e),
    };

    match body {
        Ok(body) => {
            let now = Utc::now().with_timezone(&state.service.display_offset());
            csv_response(
                body,
                &marine_weather_export::export_filename("marine_weather", now),
            )
        }
        Err(e) => error_response("Failed to export marine observations", &e),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use actix_web::{App, test};
    use marine_weather_database::MemoryStore;
    use marine_weather_scraper::fetch::CannedPage;
    use marine_weather_scraper::{StaticFetcher, StationScraper};
    use marine_weather_station::{REFERENCE_STATION, find_station};

    use super::*;

    const PAGE: &str = "<table><tr><th>時刻</th><th>風向</th><th>風速</th></tr>\
                        <tr><td>10:00</td><td>北</td><td>5.0</td></tr>\
                        <tr><td>09:50</td><td>北北西</td><td>4.5</td></tr></table>";

    fn state() -> web::Data<AppState<StaticFetcher>> {
        let station = find_station(REFERENCE_STATION).unwrap();
        let fetcher =
            StaticFetcher::new().with_page(&station.url, CannedPage::Html(PAGE.to_owned()));
        let scraper = StationScraper::new(fetcher).with_request_delay(Duration::ZERO);
        let service = WeatherService::new(Arc::new(MemoryStore::new()), scraper).with_align(None);
        web::Data::new(AppState::new(Arc::new(service)))
    }

    macro_rules! app {
        ($state:expr) => {
            test::init_service(
                App::new()
                    .app_data($state.clone())
                    .configure(crate::configure::<StaticFetcher>),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn health_reports_version() {
        let app = app!(state());
        let req = test::TestRequest::get().uri("/api/health").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["healthy"], true);
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[actix_web::test]
    async fn stations_lists_registry() {
        let app = app!(state());
        let req = test::TestRequest::get().uri("/api/stations").to_request();
        let body: Vec<ApiStation> = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body.len(), 5);
        assert_eq!(body[0].code, REFERENCE_STATION);
    }

    #[actix_web::test]
    async fn scrape_then_query_round_trip() {
        let state = state();
        let app = app!(state);

        let req = test::TestRequest::post()
            .uri("/api/weather/scrape")
            .to_request();
        let body: ApiScrapeResult = test::call_and_read_body_json(&app, req).await;
        assert!(body.success);
        assert_eq!(body.records_saved, Some(2));

        let req = test::TestRequest::get().uri("/api/weather/stats").to_request();
        let stats: ApiStats = test::call_and_read_body_json(&app, req).await;
        assert_eq!(stats.total_records, 2);

        let req = test::TestRequest::get()
            .uri("/api/weather/data?limit=1")
            .to_request();
        let rows: Vec<ApiObservation> = test::call_and_read_body_json(&app, req).await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].wind_speed, Some(5.0));

        let req = test::TestRequest::get()
            .uri("/api/weather/latest")
            .to_request();
        let latest: BTreeMap<String, ApiObservation> =
            test::call_and_read_body_json(&app, req).await;
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[REFERENCE_STATION].wind_direction.as_deref(), Some("北"));
    }

    #[actix_web::test]
    async fn empty_scrape_reports_failure_with_ok_status() {
        let scraper =
            StationScraper::new(StaticFetcher::new()).with_request_delay(Duration::ZERO);
        let service = WeatherService::new(Arc::new(MemoryStore::new()), scraper);
        let state = web::Data::new(AppState::new(Arc::new(service)));
        let app = app!(state);

        let req = test::TestRequest::post()
            .uri("/api/weather/scrape")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());

        let body: ApiScrapeResult = test::read_body_json(resp).await;
        assert!(!body.success);
        assert_eq!(body.records_saved, None);
    }

    #[actix_web::test]
    async fn bad_bound_is_bad_request() {
        let app = app!(state());
        let req = test::TestRequest::get()
            .uri("/api/weather/data?start_date=yesterday")
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), actix_web::http::StatusCode::BAD_REQUEST);
        let body: ApiError = test::read_body_json(resp).await;
        assert!(body.error.contains("yesterday"));
    }

    #[actix_web::test]
    async fn csv_export_is_an_attachment() {
        let state = state();
        state.service.trigger_scrape().await;
        let app = app!(state);

        let req = test::TestRequest::get()
            .uri("/api/weather/export.csv")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());

        let disposition = resp
            .headers()
            .get(header::CONTENT_DISPOSITION)
            .unwrap()
            .to_str()
            .unwrap()
            .to_owned();
        assert!(disposition.starts_with("attachment; filename=\"weather_data_"));

        let body = test::read_body(resp).await;
        assert!(body.starts_with(marine_weather_export::BOM));
        assert_eq!(String::from_utf8_lossy(&body).lines().count(), 3);
    }

    #[actix_web::test]
    async fn marine_export_has_one_row_per_reference_time() {
        let state = state();
        state.service.trigger_scrape().await;
        let app = app!(state);

        let req = test::TestRequest::get()
            .uri("/api/weather/export/marine.csv")
            .to_request();
        let body = test::call_and_read_body(&app, req).await;
        let text = String::from_utf8_lossy(&body[marine_weather_export::BOM.len()..]).into_owned();

        assert!(text.starts_with("日時,伊良湖岬_風向"));
        assert_eq!(text.lines().count(), 3);
    }
}
