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

//! Prometheus metrics exporter for Open-Meteo satellite radiation data
//!
//! ## Features
//!
//! `openmeteo_exporter` fetches solar radiation data derived from weather satellites for one or
//! more locations using the [Open-Meteo satellite radiation API] and emits it as Prometheus metrics.
//! Variables can be exported in one of two ways:
//!
//! * "current" variables are exported as a regular gauge with the most recent value on each scrape.
//! * "hourly" variables are exported with an explicit timestamp for every hour. Values are
//!   accumulated in memory for the life of the process and every known hour is exported on
//!   each scrape, so hours that the API fills in late (satellite data arrives with a delay)
//!   still make it into Prometheus.
//!
//! Metrics are named after the variable and its unit, for example:
//!
//! * `openmeteo_satellite_radiation_shortwave_radiation_w_per_m2{location=$LOCATION}` - Shortwave
//!   solar radiation, in watts per square meter.
//! * `openmeteo_satellite_radiation_generation_time_ms{location=$LOCATION}` - Time taken by the
//!   API to generate the response, in milliseconds.
//! * `openmeteo_exporter_fetch_errors_total{location=$LOCATION}` - Failed API requests.
//! * `openmeteo_exporter_history_points{location=$LOCATION, variable=$VARIABLE}` - Number of
//!   hourly values retained for a variable.
//!
//! [Open-Meteo satellite radiation API]: https://open-meteo.com/en/docs/satellite-radiation-api
//!
//! ## Build
//!
//! `openmeteo_exporter` is a Rust program and must be built from source using a
//! [Rust toolchain](https://rustup.rs/).
//!
//! ```text
//! git clone git@github.com:56quarters/openmeteo_exporter.git && cd openmeteo_exporter
//! cargo build --release
//! ```
//!
//! ## Usage
//!
//! Each location is given a name (used as the `location` label) and coordinates. The same set
//! of variables is tracked for every location.
//!
//! ```text
//! ./openmeteo_exporter \
//!     --location boston=42.36,-71.06 \
//!     --location lisbon=38.72,-9.14 \
//!     --current shortwave_radiation_instant \
//!     --hourly shortwave_radiation,direct_radiation,diffuse_radiation
//! ```
//!
//! ### Prometheus
//!
//! Prometheus metrics are exposed on port `9783` at `/metrics`. The API is queried on every
//! scrape so a long scrape interval is recommended.
//!
//! ```yaml
//! scrape_configs:
//! - job_name: openmeteo_exporter
//!   scrape_interval: 5m
//!   static_configs:
//!   - targets: ['example:9783']
//! ```
//!

pub mod client;
pub mod http;
pub mod location;
pub mod metrics;
pub mod naming;
pub mod series;
pub mod sink;
