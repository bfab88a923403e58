#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Actix-Web API server for marine weather observations.
//!
//! Serves the REST API over a shared [`WeatherService`]: station listing,
//! latest and ranged queries, store statistics, manual scrapes, and CSV
//! downloads. When `scrape_interval_secs` is set, incremental scrapes also
//! run in the background for the lifetime of the server.

mod handlers;

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware, web};
use marine_weather_scraper::PageFetcher;
use marine_weather_service::{ServiceConfig, WeatherService, scheduler};

/// Shared application state.
pub struct AppState<F> {
    /// The facade every handler talks to.
    pub service: Arc<WeatherService<F>>,
}

impl<F> AppState<F> {
    /// Wraps a shared service.
    #[must_use]
    pub const fn new(service: Arc<WeatherService<F>>) -> Self {
        Self { service }
    }
}

/// Registers the `/api` routes.
///
/// The caller supplies `web::Data<AppState<F>>` as app data.
pub fn configure<F: PageFetcher + 'static>(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/health", web::get().to(handlers::health))
            .route("/stations", web::get().to(handlers::stations::<F>))
            .route("/weather/latest", web::get().to(handlers::latest::<F>))
            .route("/weather/data", web::get().to(handlers::data::<F>))
            .route("/weather/stats", web::get().to(handlers::stats::<F>))
            .route("/weather/scrape", web::post().to(handlers::scrape::<F>))
            .route("/weather/export.csv", web::get().to(handlers::export_csv::<F>))
            .route(
                "/weather/export/marine.csv",
                web::get().to(handlers::export_marine_csv::<F>),
            ),
    );
}

/// Starts the marine weather API server.
///
/// Opens the configured store, starts the background scheduler when
/// enabled, and serves until the process is stopped. The caller provides
/// the async runtime (e.g. via `#[actix_web::main]`).
///
/// # Errors
///
/// Returns an `std::io::Result` error if the service cannot be built, or
/// if the HTTP server fails to bind or encounters a runtime error.
#[allow(clippy::future_not_send)]
pub async fn run_server(config: ServiceConfig) -> std::io::Result<()> {
    log::info!("Opening {} store...", config.store);
    let service = WeatherService::from_config(&config)
        .await
        .map_err(std::io::Error::other)?;
    let service = Arc::new(service);

    if let Some(every) = config.scrape_interval() {
        tokio::spawn(scheduler::run_periodic(service.clone(), every));
    }

    let state = web::Data::new(AppState::new(service));

    let bind_addr = config.bind_addr.clone();
    let port = config.port;

    log::info!("Starting server on {bind_addr}:{port}");

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .configure(configure::<marine_weather_scraper::HttpFetcher>)
    })
    .bind((bind_addr, port))?
    .run()
    .await
}
