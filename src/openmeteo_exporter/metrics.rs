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

use crate::client::{Fetch, SatelliteResponse};
use crate::location::Location;
use crate::naming::{self, NAMESPACE, SUBSYSTEM_SATELLITE_RADIATION};
use crate::series::Accumulator;
use crate::sink::{Descriptor, MetricSink, SinkError};
use prometheus::{GaugeVec, IntCounterVec, Opts, Registry};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{Instrument, Span};

const LABEL_LOCATION: &str = "location";
const LABEL_VARIABLE: &str = "variable";

/// Metrics about the exporter itself rather than the weather.
///
/// All metrics are created and registered upon call to `ExporterMetrics::new()`. Metrics
/// share the prefix "openmeteo_exporter_" and have a "location" label set to the name
/// of the location given on the command line.
#[derive(Debug, Clone)]
pub struct ExporterMetrics {
    fetch_errors: IntCounterVec,
    history_points: GaugeVec,
}

impl ExporterMetrics {
    /// Create a new `ExporterMetrics` and register each metric with the provided `Registry`.
    ///
    /// # Panics
    ///
    /// If any metric cannot be created or registered, this method will panic.
    pub fn new(reg: &Registry) -> Self {
        let fetch_errors = IntCounterVec::new(
            Opts::new("fetch_errors_total", "Number of failed requests to the Open-Meteo API")
                .namespace(NAMESPACE)
                .subsystem("exporter"),
            &[LABEL_LOCATION],
        )
        .unwrap();
        let history_points = GaugeVec::new(
            Opts::new("history_points", "Number of hourly values retained for a variable")
                .namespace(NAMESPACE)
                .subsystem("exporter"),
            &[LABEL_LOCATION, LABEL_VARIABLE],
        )
        .unwrap();

        reg.register(Box::new(fetch_errors.clone())).unwrap();
        reg.register(Box::new(history_points.clone())).unwrap();

        Self {
            fetch_errors,
            history_points,
        }
    }

    fn fetch_error(&self, location: &str) {
        self.fetch_errors.with_label_values(&[location]).inc();
    }

    fn history_points(&self, location: &str, variable: &str, points: usize) {
        self.history_points
            .with_label_values(&[location, variable])
            .set(points as f64);
    }
}

/// Accumulated hourly values along with the last unit the API reported for each variable.
///
/// Units are remembered so that a response missing a unit doesn't change the metric name
/// that the existing history is emitted under.
#[derive(Debug, Default)]
struct History {
    points: Accumulator,
    units: HashMap<String, String>,
}

/// Exports satellite radiation data for a single location.
///
/// Each call to `collect()` fetches the latest data from the API and emits:
///
/// * The time the API took to generate the response.
/// * One untimestamped gauge per "current" variable with its latest value.
/// * One timestamped gauge per known hour per "hourly" variable. Hourly values are
///   accumulated across calls and the full history is emitted every time.
pub struct SatelliteRadiationCollector {
    fetcher: Arc<dyn Fetch>,
    location: Location,
    history: Mutex<History>,
    metrics: ExporterMetrics,
    span: Span,
}

impl SatelliteRadiationCollector {
    pub fn new(fetcher: Arc<dyn Fetch>, location: Location, metrics: ExporterMetrics) -> Self {
        let span = tracing::info_span!("satellite_radiation", location = %location.name);
        SatelliteRadiationCollector {
            fetcher,
            location,
            history: Mutex::new(History::default()),
            metrics,
            span,
        }
    }

    /// Fetch the latest data and emit it to `sink`. If the fetch fails nothing is emitted
    /// but previously accumulated history is kept for the next call.
    pub async fn collect(&self, sink: &mut MetricSink) {
        let res = match self
            .fetcher
            .fetch(&self.location)
            .instrument(self.span.clone())
            .await
        {
            Ok(res) => res,
            Err(e) => {
                self.span.in_scope(|| {
                    tracing::warn!(
                        message = "failed to collect satellite radiation information",
                        location = %self.location.name,
                        error = %e,
                    );
                });
                self.metrics.fetch_error(&self.location.name);
                return;
            }
        };

        self.span.in_scope(|| {
            self.emit_generation_time(&res, sink);
            self.emit_current(&res, sink);
            self.emit_history(&res, sink);
        });
    }

    fn emit_generation_time(&self, res: &SatelliteResponse, sink: &mut MetricSink) {
        let desc = Descriptor::new(
            naming::fq_name(NAMESPACE, SUBSYSTEM_SATELLITE_RADIATION, "generation_time_ms"),
            "Time taken by the API to generate the satellite radiation response, in milliseconds",
            &[LABEL_LOCATION],
        );

        self.emit_gauge(desc, res.generation_time_ms, sink);
    }

    fn emit_current(&self, res: &SatelliteResponse, sink: &mut MetricSink) {
        for name in &self.location.current {
            let value = res
                .current
                .as_ref()
                .and_then(|c| c.variables.get(name).copied().flatten());

            match value {
                Some(v) => {
                    let desc = self.descriptor(name, &res.current_units);
                    self.emit_gauge(desc, v, sink);
                }
                None => {
                    tracing::warn!(message = "no value for metric returned", name = %name);
                }
            }
        }
    }

    fn emit_history(&self, res: &SatelliteResponse, sink: &mut MetricSink) {
        let tracked = self.location.hourly.as_slice();
        if tracked.is_empty() {
            return;
        }

        // Merge and emit as a single step so that concurrent scrapes of this location
        // never observe (or write) a partially merged history.
        let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        let History { points, units } = &mut *history;

        for name in tracked {
            if let Some(unit) = res.hourly_units.get(name) {
                units.insert(name.clone(), unit.clone());
            }
        }

        let mut descriptors = HashMap::with_capacity(tracked.len());
        for name in tracked {
            match self.descriptor(name, units) {
                Ok(d) => {
                    descriptors.insert(name.as_str(), d);
                }
                Err(e) => {
                    tracing::warn!(message = "unable to create metric for variable", name = %name, error = %e);
                }
            }
        }

        points.merge(tracked, res.hourly.as_ref(), res.utc_offset_seconds);

        let offset = points.utc_offset_seconds();
        for point in points.points(tracked) {
            let desc = match descriptors.get(point.variable) {
                Some(d) => d,
                None => continue,
            };

            match naming::parse_timestamp(point.timestamp, offset) {
                Ok(ts) => {
                    if let Err(e) = sink.timestamped_gauge(desc, point.value, &[&self.location.name], ts) {
                        tracing::warn!(message = "unable to emit metric", name = %desc.name(), error = %e);
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        message = "dropping value with invalid timestamp",
                        name = %point.variable,
                        error = %e,
                    );
                }
            }
        }

        for name in tracked {
            let count = points.series(name).map(|s| s.len()).unwrap_or(0);
            self.metrics.history_points(&self.location.name, name, count);
        }
    }

    fn descriptor(
        &self,
        name: &str,
        units: &HashMap<String, String>,
    ) -> Result<Descriptor, SinkError> {
        let metric_name = naming::metric_name(
            SUBSYSTEM_SATELLITE_RADIATION,
            name,
            units.get(name).map(|u| u.as_str()),
        );
        // Help text can't be empty, fall back to the variable name when there's no description
        let help = naming::describe(SUBSYSTEM_SATELLITE_RADIATION, name).unwrap_or(name);
        Descriptor::new(metric_name, help, &[LABEL_LOCATION])
    }

    fn emit_gauge(&self, desc: Result<Descriptor, SinkError>, value: f64, sink: &mut MetricSink) {
        if let Err(e) = desc.and_then(|d| sink.gauge(&d, value, &[&self.location.name])) {
            tracing::warn!(message = "unable to emit metric", error = %e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ExporterMetrics, SatelliteRadiationCollector};
    use crate::client::{ClientError, CurrentData, Fetch, HourlyData, SatelliteResponse};
    use crate::location::Location;
    use crate::sink::MetricSink;
    use async_trait::async_trait;
    use prometheus::proto::MetricFamily;
    use prometheus::Registry;
    use std::collections::{HashMap, VecDeque};
    use std::sync::{Arc, Mutex};

    const SHORTWAVE_METRIC: &str = "openmeteo_satellite_radiation_shortwave_radiation_w_per_m2";
    const DIRECT_METRIC: &str = "openmeteo_satellite_radiation_direct_radiation_w_per_m2";
    const GENERATION_METRIC: &str = "openmeteo_satellite_radiation_generation_time_ms";

    /// Returns queued responses in order, then fails once the queue is empty.
    struct ScriptedFetch {
        responses: Mutex<VecDeque<Result<SatelliteResponse, ClientError>>>,
    }

    impl ScriptedFetch {
        fn new(responses: Vec<Result<SatelliteResponse, ClientError>>) -> Self {
            ScriptedFetch {
                responses: Mutex::new(responses.into_iter().collect()),
            }
        }
    }

    #[async_trait]
    impl Fetch for ScriptedFetch {
        async fn fetch(&self, _location: &Location) -> Result<SatelliteResponse, ClientError> {
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ClientError::BadRequest("no more responses".to_owned())))
        }
    }

    fn units(names: &[&str]) -> HashMap<String, String> {
        names.iter().map(|n| ((*n).to_owned(), "W/m²".to_owned())).collect()
    }

    fn hourly_response(time: &[&str], name: &str, values: Vec<Option<f64>>) -> SatelliteResponse {
        SatelliteResponse {
            generation_time_ms: 0.5,
            hourly_units: units(&[name]),
            hourly: Some(HourlyData {
                time: time.iter().map(|t| (*t).to_owned()).collect(),
                variables: vec![(name.to_owned(), values)].into_iter().collect(),
            }),
            ..Default::default()
        }
    }

    fn collector(fetch: ScriptedFetch, current: &[&str], hourly: &[&str]) -> SatelliteRadiationCollector {
        let location = Location::new("home", 42.36, -71.06)
            .unwrap()
            .with_variables(
                current.iter().map(|v| (*v).to_owned()).collect(),
                hourly.iter().map(|v| (*v).to_owned()).collect(),
            )
            .unwrap();

        let metrics = ExporterMetrics::new(&Registry::new());
        SatelliteRadiationCollector::new(Arc::new(fetch), location, metrics)
    }

    async fn scrape(collector: &SatelliteRadiationCollector) -> Vec<MetricFamily> {
        let mut sink = MetricSink::new();
        collector.collect(&mut sink).await;
        sink.into_families()
    }

    fn samples(families: &[MetricFamily], name: &str) -> Vec<(f64, i64)> {
        families
            .iter()
            .filter(|mf| mf.get_name() == name)
            .flat_map(|mf| mf.get_metric().iter())
            .map(|m| (m.get_gauge().get_value(), m.get_timestamp_ms()))
            .collect()
    }

    #[tokio::test]
    async fn test_collect_accumulates_history() {
        let fetch = ScriptedFetch::new(vec![
            Ok(hourly_response(
                &["2024-01-01T00:00", "2024-01-01T01:00"],
                "shortwave_radiation",
                vec![Some(100.0), None],
            )),
            Ok(hourly_response(
                &["2024-01-01T01:00"],
                "shortwave_radiation",
                vec![Some(50.0)],
            )),
        ]);
        let collector = collector(fetch, &[], &["shortwave_radiation"]);

        let first = scrape(&collector).await;
        assert_eq!(vec![(100.0, 1_704_067_200_000)], samples(&first, SHORTWAVE_METRIC));

        let second = scrape(&collector).await;
        assert_eq!(
            vec![(100.0, 1_704_067_200_000), (50.0, 1_704_070_800_000)],
            samples(&second, SHORTWAVE_METRIC)
        );
    }

    #[tokio::test]
    async fn test_collect_fetch_failure_keeps_history() {
        let fetch = ScriptedFetch::new(vec![
            Ok(hourly_response(
                &["2024-01-01T00:00", "2024-01-01T01:00"],
                "shortwave_radiation",
                vec![Some(100.0), Some(80.0)],
            )),
            Err(ClientError::BadRequest("upstream unavailable".to_owned())),
            Ok(hourly_response(&[], "shortwave_radiation", vec![])),
        ]);
        let collector = collector(fetch, &[], &["shortwave_radiation"]);

        let first = scrape(&collector).await;
        assert_eq!(2, samples(&first, SHORTWAVE_METRIC).len());

        let second = scrape(&collector).await;
        assert!(second.is_empty());

        let third = scrape(&collector).await;
        assert_eq!(samples(&first, SHORTWAVE_METRIC), samples(&third, SHORTWAVE_METRIC));
    }

    #[tokio::test]
    async fn test_collect_fetch_failure_counted() {
        let registry = Registry::new();
        let metrics = ExporterMetrics::new(&registry);
        let location = Location::new("home", 42.36, -71.06).unwrap();
        let collector = SatelliteRadiationCollector::new(Arc::new(ScriptedFetch::new(vec![])), location, metrics);

        scrape(&collector).await;
        scrape(&collector).await;

        let families = registry.gather();
        let errors = families
            .iter()
            .find(|mf| mf.get_name() == "openmeteo_exporter_fetch_errors_total")
            .unwrap();
        assert_eq!(2.0, errors.get_metric()[0].get_counter().get_value());
    }

    #[tokio::test]
    async fn test_collect_drops_malformed_timestamp() {
        let fetch = ScriptedFetch::new(vec![Ok(hourly_response(
            &["2024-01-01T00:00", "2024-01-01T01:00:00", "yesterday"],
            "direct_radiation",
            vec![Some(10.0), Some(20.0), Some(30.0)],
        ))]);
        let collector = collector(fetch, &[], &["direct_radiation"]);

        let families = scrape(&collector).await;
        assert_eq!(vec![(10.0, 1_704_067_200_000)], samples(&families, DIRECT_METRIC));
    }

    #[tokio::test]
    async fn test_collect_current_values() {
        let res = SatelliteResponse {
            generation_time_ms: 0.25,
            current_units: units(&["shortwave_radiation", "direct_radiation"]),
            current: Some(CurrentData {
                time: "2024-01-01T12:00".to_owned(),
                interval: Some(900),
                variables: vec![
                    ("shortwave_radiation".to_owned(), Some(321.0)),
                    ("direct_radiation".to_owned(), None),
                ]
                .into_iter()
                .collect(),
            }),
            ..Default::default()
        };
        let fetch = ScriptedFetch::new(vec![Ok(res)]);
        let collector = collector(fetch, &["shortwave_radiation", "direct_radiation"], &[]);

        let families = scrape(&collector).await;
        assert_eq!(vec![(0.25, 0)], samples(&families, GENERATION_METRIC));
        assert_eq!(vec![(321.0, 0)], samples(&families, SHORTWAVE_METRIC));
        assert!(samples(&families, DIRECT_METRIC).is_empty());
    }

    #[tokio::test]
    async fn test_collect_metric_names_ascii() {
        let fetch = ScriptedFetch::new(vec![Ok(hourly_response(
            &["2024-01-01T00:00"],
            "shortwave_radiation",
            vec![Some(1.0)],
        ))]);
        let collector = collector(fetch, &[], &["shortwave_radiation"]);

        let families = scrape(&collector).await;
        assert!(!families.is_empty());
        for mf in families.iter() {
            assert!(!mf.get_name().contains('²'));
            assert!(mf
                .get_name()
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_'));
        }
    }

    #[tokio::test]
    async fn test_collect_location_label() {
        let fetch = ScriptedFetch::new(vec![Ok(hourly_response(
            &["2024-01-01T00:00"],
            "shortwave_radiation",
            vec![Some(1.0)],
        ))]);
        let collector = collector(fetch, &[], &["shortwave_radiation"]);

        let families = scrape(&collector).await;
        let mf = families.iter().find(|mf| mf.get_name() == SHORTWAVE_METRIC).unwrap();
        let label = &mf.get_metric()[0].get_label()[0];
        assert_eq!("location", label.get_name());
        assert_eq!("home", label.get_value());
        assert_eq!(
            "Shortwave solar radiation as average of the preceding hour (global horizontal irradiation)",
            mf.get_help()
        );
    }

    #[tokio::test]
    async fn test_collect_remembers_units() {
        let mut without_units = hourly_response(&["2024-01-01T01:00"], "shortwave_radiation", vec![Some(50.0)]);
        without_units.hourly_units.clear();

        let fetch = ScriptedFetch::new(vec![
            Ok(hourly_response(&["2024-01-01T00:00"], "shortwave_radiation", vec![Some(100.0)])),
            Ok(without_units),
        ]);
        let collector = collector(fetch, &[], &["shortwave_radiation"]);

        let _ = scrape(&collector).await;
        let second = scrape(&collector).await;

        assert_eq!(
            vec![(100.0, 1_704_067_200_000), (50.0, 1_704_070_800_000)],
            samples(&second, SHORTWAVE_METRIC)
        );
        assert!(samples(&second, "openmeteo_satellite_radiation_shortwave_radiation").is_empty());
    }

    #[tokio::test]
    async fn test_collect_help_without_description() {
        let fetch = ScriptedFetch::new(vec![Ok(hourly_response(
            &["2024-01-01T00:00"],
            "cloud_radiation",
            vec![Some(1.0)],
        ))]);
        let collector = collector(fetch, &[], &["cloud_radiation"]);

        let families = scrape(&collector).await;
        let mf = families
            .iter()
            .find(|mf| mf.get_name() == "openmeteo_satellite_radiation_cloud_radiation_w_per_m2")
            .unwrap();
        assert_eq!("cloud_radiation", mf.get_help());
    }

    #[tokio::test]
    async fn test_collect_concurrent_scrapes() {
        let fetch = ScriptedFetch::new(vec![
            Ok(hourly_response(&["2024-01-01T00:00"], "shortwave_radiation", vec![Some(1.0)])),
            Ok(hourly_response(&["2024-01-01T01:00"], "shortwave_radiation", vec![Some(2.0)])),
        ]);
        let collector = collector(fetch, &[], &["shortwave_radiation"]);

        let _ = futures::future::join(scrape(&collector), scrape(&collector)).await;

        let history = collector.history.lock().unwrap();
        assert_eq!(2, history.points.series("shortwave_radiation").unwrap().len());
    }
}
