#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command line front end for marine weather collection.
//!
//! ```text
//! marine_weather [--config PATH] stations
//! marine_weather scrape [--incremental] [--station CODE]
//! marine_weather latest
//! marine_weather range [--start T] [--end T] [--station CODE] [--limit N]
//! marine_weather stats
//! marine_weather export [--marine] [--start T] [--end T] [--station CODE] [--output PATH]
//! marine_weather watch [--interval SECS]
//! marine_weather serve
//! ```
//!
//! Bounds without an explicit offset are read in the configured display
//! offset (JST by default).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{FixedOffset, Utc};
use clap::{Parser, Subcommand};
use marine_weather_export::{export_filename, format_display};
use marine_weather_models::Observation;
use marine_weather_service::{ServiceConfig, WeatherService, scheduler};

/// Period used by `watch` when neither `--interval` nor the config sets one.
const DEFAULT_WATCH_INTERVAL: Duration = Duration::from_secs(600);

#[derive(Parser)]
#[command(name = "marine_weather", about = "Marine weather observation collector")]
struct Cli {
    /// TOML config file (defaults to `$MARINE_WEATHER_CONFIG`)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the configured stations
    Stations,
    /// Scrape every station and save the batch
    Scrape {
        /// Only save observations newer than what is already stored
        #[arg(long)]
        incremental: bool,
        /// Preview a single station without saving
        #[arg(long, conflicts_with = "incremental")]
        station: Option<String>,
    },
    /// Show the newest stored observation per station
    Latest,
    /// Show stored observations, newest first
    Range {
        /// Inclusive lower bound (e.g. "2024-05-01 06:00")
        #[arg(long)]
        start: Option<String>,
        /// Inclusive upper bound
        #[arg(long)]
        end: Option<String>,
        /// Only show this station
        #[arg(long)]
        station: Option<String>,
        /// Maximum number of rows
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Show the number of stored observations
    Stats,
    /// Write stored observations to a CSV file
    Export {
        /// Use the marine layout (one row per time, one column group per station)
        #[arg(long)]
        marine: bool,
        /// Inclusive lower bound
        #[arg(long)]
        start: Option<String>,
        /// Inclusive upper bound
        #[arg(long)]
        end: Option<String>,
        /// Only export this station
        #[arg(long)]
        station: Option<String>,
        /// Output file (defaults to a timestamped name in the current directory)
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Run incremental scrapes on a fixed period until interrupted
    Watch {
        /// Seconds between scrapes (overrides `scrape_interval_secs`)
        #[arg(long)]
        interval: Option<u64>,
    },
    /// Start the HTTP API server
    Serve,
}

fn format_value(value: Option<f64>, unit: &str) -> String {
    value.map_or_else(|| "-".to_owned(), |v| format!("{v}{unit}"))
}

fn format_observation(obs: &Observation, offset: FixedOffset) -> String {
    format!(
        "{:<16} {:<24} {:<8} {:<10} {}",
        format_display(obs.timestamp, offset),
        obs.station_name,
        obs.wind_direction.as_deref().unwrap_or("-"),
        format_value(obs.wind_speed, "m/s"),
        format_value(obs.wave_height, "m"),
    )
}

fn print_observations<'a>(
    observations: impl IntoIterator<Item = &'a Observation>,
    offset: FixedOffset,
) -> usize {
    println!(
        "{:<16} {:<24} {:<8} {:<10} WAVE",
        "TIME", "STATION", "DIR", "WIND"
    );
    println!("{}", "-".repeat(72));

    let mut count = 0;
    for obs in observations {
        println!("{}", format_observation(obs, offset));
        count += 1;
    }
    count
}

fn watch_interval(flag: Option<u64>, config: &ServiceConfig) -> Duration {
    flag.map(Duration::from_secs)
        .or_else(|| config.scrape_interval())
        .filter(|every| !every.is_zero())
        .unwrap_or(DEFAULT_WATCH_INTERVAL)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();
    let cli = Cli::parse();

    let config = ServiceConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Stations => {
            println!("{:<30} {:<24} {:<6} INTERVAL", "CODE", "NAME", "WAVE");
            println!("{}", "-".repeat(72));
            for station in marine_weather_station::all_stations() {
                println!(
                    "{:<30} {:<24} {:<6} {}m",
                    station.code,
                    station.name,
                    if station.has_wave_height { "yes" } else { "no" },
                    station.update_interval_minutes,
                );
            }
        }
        Commands::Serve => {
            // The server uses actix-web's runtime, so it runs in a blocking
            // task to avoid nesting runtimes.
            tokio::task::spawn_blocking(move || {
                actix_web::rt::System::new().block_on(marine_weather_server::run_server(config))
            })
            .await??;
        }
        command => run_command(command, &config).await?,
    }

    Ok(())
}

/// Runs a command that needs the store and scraper.
async fn run_command(
    command: Commands,
    config: &ServiceConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let service = WeatherService::from_config(config).await?;
    let offset = service.display_offset();

    match command {
        Commands::Stations | Commands::Serve => {}
        Commands::Scrape {
            station: Some(code),
            ..
        } => {
            log::info!("Previewing station {code}...");
            let records = service.scrape_station(&code).await?;
            let count = print_observations(&records, offset);
            log::info!("{count} observation(s) scraped from {code} (not saved)");
        }
        Commands::Scrape { incremental, .. } => {
            let outcome = if incremental {
                log::info!("Running incremental scrape...");
                service.trigger_incremental_scrape().await
            } else {
                log::info!("Scraping all stations...");
                service.trigger_scrape().await
            };

            if outcome.success {
                log::info!("{}", outcome.message);
            } else {
                log::error!("Scrape failed: {}", outcome.message);
                std::process::exit(1);
            }
        }
        Commands::Latest => {
            let latest = service.get_latest().await?;
            if latest.is_empty() {
                println!("No observations stored yet.");
                return Ok(());
            }
            print_observations(latest.values(), offset);
        }
        Commands::Range {
            start,
            end,
            station,
            limit,
        } => {
            let records = service
                .get_range(
                    start.as_deref(),
                    end.as_deref(),
                    station.as_deref(),
                    limit,
                )
                .await?;
            let count = print_observations(&records, offset);
            println!("\n{count} observation(s)");
        }
        Commands::Stats => {
            let stats = service.stats().await?;
            println!("Total records: {}", stats.total_records);
        }
        Commands::Export {
            marine,
            start,
            end,
            station,
            output,
        } => {
            let query =
                service.range_query(start.as_deref(), end.as_deref(), station.as_deref(), None)?;
            let (body, prefix) = if marine {
                (service.export_marine_csv(&query).await?, "marine_weather")
            } else {
                (service.export_csv(&query).await?, "weather_data")
            };

            let path = output.unwrap_or_else(|| {
                PathBuf::from(export_filename(prefix, Utc::now().with_timezone(&offset)))
            });
            std::fs::write(&path, &body)?;
            log::info!("Wrote {} bytes to {}", body.len(), path.display());
        }
        Commands::Watch { interval } => {
            let every = watch_interval(interval, config);
            log::info!("Watching stations every {every:?} (Ctrl-C to stop)");
            scheduler::run_periodic(Arc::new(service), every).await;
        }
    }

    Ok(())
}
