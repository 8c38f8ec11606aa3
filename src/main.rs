//! # Admiralty Tides Application Entry Point
//!
//! This binary loads configuration, obtains a forecast (fresh cache, network,
//! or stale cache as a last resort) and prints either a table of tides with
//! the previous/next event relative to now, or the events as JSON.
//!
//! The process exits with the fetch status code when no forecast could be
//! obtained, so supervisors can tell DNS, TLS and HTTP failures apart.

// Test modules
#[cfg(test)]
mod tests;

use admiralty_tides::client::{AdmiraltyApiClient, FetchError, ForecastSource};
use admiralty_tides::config::{Config, CONFIG_FILE, MAX_FORECAST_DAYS};
use admiralty_tides::decoder::DecodeReport;
use admiralty_tides::renderer::draw_ascii;
use admiralty_tides::TidalEvent;
use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Print the UK Admiralty tide forecast for a station.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Configuration file
    #[arg(long, default_value = CONFIG_FILE)]
    config: PathBuf,

    /// Station id, overriding the configuration (e.g. 0113)
    #[arg(long)]
    station: Option<String>,

    /// Forecast horizon in days
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=MAX_FORECAST_DAYS as i64))]
    days: Option<u8>,

    /// Reference instant for previous/next tide (RFC 3339, default now)
    #[arg(long)]
    at: Option<DateTime<Utc>>,

    /// Ignore and do not write the response cache
    #[arg(long)]
    no_cache: bool,

    /// Print the forecast as JSON instead of a table
    #[arg(long)]
    json: bool,
}

/// Shape of `--json` output.
#[derive(Serialize)]
struct ForecastOutput<'a> {
    station: &'a str,
    source: ForecastSource,
    offline: bool,
    reference_time: i64,
    report: DecodeReport,
    previous: Option<TidalEvent>,
    next: Option<TidalEvent>,
    events: &'a [TidalEvent],
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = Config::load_from_path(&args.config);
    if let Some(station) = args.station {
        config.station.id = station;
    }
    if let Some(days) = args.days {
        config.station.days = days;
    }
    if args.no_cache {
        config.cache.enabled = false;
    }
    config.validate().context("invalid configuration")?;

    if config.api.subscription_key.is_empty() {
        warn!("no subscription key configured, the API will reject the request");
    }

    let now = args.at.unwrap_or_else(Utc::now).timestamp();
    let days = config.station.days;

    let mut client = AdmiraltyApiClient::new(&config).context("building HTTP client")?;

    // Create Tokio runtime for async operations
    let rt = tokio::runtime::Runtime::new()?;
    let report = match rt.block_on(client.refresh(days)) {
        Ok(report) => report,
        Err(err) => exit_with(&err),
    };

    if client.source().is_offline() {
        warn!("network unavailable, showing cached forecast");
    }
    info!(
        events = report.events,
        source = ?client.source(),
        warnings = report.has_warnings(),
        "forecast ready"
    );

    let store = client.store();
    if args.json {
        let previous = client.previous_tidal_event(now);
        let next = client.next_tidal_event(now);
        let output = ForecastOutput {
            station: client.station_id(),
            source: client.source(),
            offline: client.source().is_offline(),
            reference_time: now,
            report,
            previous: previous.is_valid.then_some(previous),
            next: next.is_valid.then_some(next),
            events: store.events(),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        let title = format!("{} ({})", config.station.name, client.station_id());
        draw_ascii(store, now, &title, client.source().is_offline());
    }

    Ok(())
}

fn exit_with(err: &FetchError) -> ! {
    let status = err.status();
    error!(error = %err, status = status.code(), "could not obtain forecast");
    eprintln!("Tide data fetch failed: {err}");
    std::process::exit(i32::from(status.code()))
}
