#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Standalone entry point for the marine weather API server.
//!
//! Configuration is read from `$MARINE_WEATHER_CONFIG` (if set) and the
//! environment.

use marine_weather_service::ServiceConfig;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    pretty_env_logger::init_custom_env("RUST_LOG");

    let config = ServiceConfig::load(None).map_err(std::io::Error::other)?;
    marine_weather_server::run_server(config).await
}
