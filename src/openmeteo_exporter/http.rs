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

use crate::metrics::SatelliteRadiationCollector;
use crate::sink::MetricSink;
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures::future;
use prometheus::proto::MetricFamily;
use prometheus::{Encoder, Registry, TextEncoder, TEXT_FORMAT};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Everything needed to answer a scrape: exporter metrics and a collector per location.
pub struct RequestContext {
    registry: Registry,
    collectors: Vec<SatelliteRadiationCollector>,
}

impl RequestContext {
    pub fn new(registry: Registry, collectors: Vec<SatelliteRadiationCollector>) -> Self {
        Self { registry, collectors }
    }

    /// Run every collector concurrently and combine the results with the metrics from the registry.
    pub async fn gather(&self) -> Vec<MetricFamily> {
        let sinks = future::join_all(self.collectors.iter().map(|c| async move {
            let mut sink = MetricSink::new();
            c.collect(&mut sink).await;
            sink
        }))
        .await;

        let mut combined = MetricSink::new();
        for sink in sinks {
            combined.merge(sink);
        }

        // Collectors run before the registry is gathered so the exporter's own metrics
        // reflect this scrape.
        let mut families = self.registry.gather();
        families.extend(combined.into_families());
        families
    }
}

/// Encode metric families in the Prometheus text exposition format.
pub fn encode_text(families: &[MetricFamily]) -> Result<Vec<u8>, prometheus::Error> {
    let mut buf = Vec::new();
    TextEncoder::new().encode(families, &mut buf)?;
    Ok(buf)
}

/// Router exposing the text format of all metrics at `/metrics`.
pub fn text_metrics(context: Arc<RequestContext>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(context)
}

async fn metrics_handler(State(context): State<Arc<RequestContext>>) -> Response {
    let families = context.gather().await;

    match encode_text(&families) {
        Ok(buf) => {
            tracing::debug!(message = "encoded prometheus metrics to text format", num_bytes = buf.len());
            (StatusCode::OK, [(CONTENT_TYPE, TEXT_FORMAT)], buf).into_response()
        }
        Err(e) => {
            tracing::error!(message = "error encoding metrics", error = %e);
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
    }
}
