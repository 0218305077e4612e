// openmeteo_exporter - Prometheus metrics exporter for Open-Meteo satellite radiation
//
// Copyright 2024 Nick Pillitteri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

use clap::Parser;
use openmeteo_exporter::client::{ClientError, Fetch, OpenMeteoClient};
use openmeteo_exporter::http::RequestContext;
use openmeteo_exporter::location::Location;
use openmeteo_exporter::metrics::{ExporterMetrics, SatelliteRadiationCollector};
use prometheus::Registry;
use reqwest::Client;
use std::error::Error;
use std::io;
use std::net::SocketAddr;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{self, SignalKind};
use tracing::{Instrument, Level};

const DEFAULT_LOG_LEVEL: Level = Level::INFO;
const DEFAULT_BIND_ADDR: ([u8; 4], u16) = ([0, 0, 0, 0], 9783);
const DEFAULT_PAST_DAYS: u32 = 1;
const DEFAULT_TIMEOUT_MILLIS: u64 = 5000;
const DEFAULT_API_URL: &str = "https://satellite-api.open-meteo.com/v1/archive";

#[derive(Debug, Parser)]
#[clap(name = "openmeteo_exporter", version = clap::crate_version!())]
struct OpenMeteoExporterApplication {
    /// Location to fetch satellite radiation data for, as NAME=LATITUDE,LONGITUDE. May be
    /// given multiple times. NAME is used as the value of the "location" label.
    #[clap(long = "location", required = true)]
    locations: Vec<Location>,

    /// Variables to export the most recent value of, comma separated
    #[clap(long, value_delimiter = ',')]
    current: Vec<String>,

    /// Variables to export every hourly value of with timestamps, comma separated
    #[clap(long, value_delimiter = ',')]
    hourly: Vec<String>,

    /// Number of past days of hourly values to request from the API on each scrape
    #[clap(long, default_value_t = DEFAULT_PAST_DAYS)]
    past_days: u32,

    /// Base URL for the Open-Meteo satellite radiation API
    #[clap(long, default_value_t = DEFAULT_API_URL.into())]
    api_url: String,

    /// Logging verbosity. Allowed values are 'trace', 'debug', 'info', 'warn', and 'error'
    /// (case insensitive)
    #[clap(long, default_value_t = DEFAULT_LOG_LEVEL)]
    log_level: Level,

    /// Timeout for fetching data from the Open-Meteo API, in milliseconds.
    #[clap(long, default_value_t = DEFAULT_TIMEOUT_MILLIS)]
    timeout_millis: u64,

    /// Address to bind to. By default, openmeteo_exporter will bind to public address since
    /// the purpose is to expose metrics to an external system (Prometheus or another
    /// agent for ingestion)
    #[clap(long, default_value_t = DEFAULT_BIND_ADDR.into())]
    bind: SocketAddr,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let opts = OpenMeteoExporterApplication::parse();
    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(opts.log_level)
            .finish(),
    )
    .expect("failed to set tracing subscriber");

    if opts.current.is_empty() && opts.hourly.is_empty() {
        tracing::error!(message = "at least one current or hourly variable must be given");
        process::exit(1)
    }

    let locations = opts
        .locations
        .iter()
        .map(|l| l.clone().with_variables(opts.current.clone(), opts.hourly.clone()))
        .collect::<Result<Vec<Location>, _>>()
        .unwrap_or_else(|e| {
            tracing::error!(message = "invalid variables", error = %e);
            process::exit(1)
        });

    let timeout = Duration::from_millis(opts.timeout_millis);
    let http_client = Client::builder().timeout(timeout).build().unwrap_or_else(|e| {
        tracing::error!(message = "unable to initialize HTTP client", error = %e);
        process::exit(1)
    });

    let client = OpenMeteoClient::new(http_client, &opts.api_url, opts.past_days).unwrap_or_else(|e| {
        tracing::error!(message = "unable to initialize API client", error = %e);
        process::exit(1)
    });

    // Make an initial request for each location. This allows us to verify that the variables
    // and coordinates the user provided are valid and the API is available before starting
    // the HTTP server and running indefinitely.
    for location in locations.iter() {
        match client
            .fetch(location)
            .instrument(tracing::span!(Level::DEBUG, "openmeteo_verify"))
            .await
        {
            Err(ClientError::BadRequest(reason)) => {
                tracing::error!(message = "invalid location or variables", location = %location.name, reason = %reason);
                process::exit(1)
            }
            Err(e) => {
                tracing::warn!(message = "failed to fetch initial satellite radiation data", location = %location.name, error = %e);
            }
            Ok(res) => {
                tracing::debug!(message = "verified location", location = %location.name, generation_time_ms = res.generation_time_ms);
            }
        }
    }

    let client: Arc<dyn Fetch> = Arc::new(client);
    let registry = Registry::new();
    let metrics = ExporterMetrics::new(&registry);
    let collectors = locations
        .into_iter()
        .map(|l| {
            tracing::info!(message = "exporting satellite radiation", location = %l.name, current = ?l.current, hourly = ?l.hourly);
            SatelliteRadiationCollector::new(client.clone(), l, metrics.clone())
        })
        .collect();

    let context = Arc::new(RequestContext::new(registry, collectors));
    let handler = openmeteo_exporter::http::text_metrics(context);
    let server = axum::Server::try_bind(&opts.bind)
        .map(|s| {
            s.serve(handler.into_make_service()).with_graceful_shutdown(async {
                // Wait for either SIGTERM or SIGINT to shutdown
                tokio::select! {
                    _ = sigterm() => {}
                    _ = sigint() => {}
                }
            })
        })
        .unwrap_or_else(|e| {
            tracing::error!(message = "error binding to address", address = %opts.bind, error = %e);
            process::exit(1)
        });

    tracing::info!(message = "server started", address = %opts.bind, api_url = %opts.api_url);
    server.await?;

    tracing::info!("server shutdown");
    Ok(())
}

/// Return after the first SIGTERM signal received by this process
async fn sigterm() -> io::Result<()> {
    unix::signal(SignalKind::terminate())?.recv().await;
    Ok(())
}

/// Return after the first SIGINT signal received by this process
async fn sigint() -> io::Result<()> {
    unix::signal(SignalKind::interrupt())?.recv().await;
    Ok(())
}
