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

use prometheus::core::Desc;
use prometheus::proto::{Gauge, LabelPair, Metric, MetricFamily, MetricType};
use std::collections::{BTreeMap, HashMap};
use std::error;
use std::fmt;

#[derive(Debug)]
pub enum SinkError {
    Descriptor(prometheus::Error),
    Cardinality { name: String, expected: usize, got: usize },
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Descriptor(e) => write!(f, "invalid metric descriptor: {}", e),
            Self::Cardinality { name, expected, got } => {
                write!(f, "metric {} expects {} label values, got {}", name, expected, got)
            }
        }
    }
}

impl error::Error for SinkError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Descriptor(e) => Some(e),
            _ => None,
        }
    }
}

/// Name, help text, and label names for a metric. Must exist before any samples
/// can be emitted under that name.
///
/// Names, labels, and help text are validated the same way as for metrics registered
/// with a `prometheus::Registry`.
#[derive(Debug, Clone)]
pub struct Descriptor {
    desc: Desc,
}

impl Descriptor {
    pub fn new<N: Into<String>, H: Into<String>>(name: N, help: H, label_names: &[&str]) -> Result<Self, SinkError> {
        let desc = Desc::new(
            name.into(),
            help.into(),
            label_names.iter().map(|l| (*l).to_owned()).collect(),
            HashMap::new(),
        )
        .map_err(SinkError::Descriptor)?;

        Ok(Descriptor { desc })
    }

    pub fn name(&self) -> &str {
        &self.desc.fq_name
    }
}

/// Collects gauge samples for a single scrape, grouped into metric families by name.
///
/// Samples may carry an explicit timestamp (in milliseconds since the epoch) or none,
/// in which case Prometheus assigns the time of the scrape.
#[derive(Debug, Default)]
pub struct MetricSink {
    families: BTreeMap<String, MetricFamily>,
}

impl MetricSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an untimestamped gauge sample.
    pub fn gauge(&mut self, desc: &Descriptor, value: f64, label_values: &[&str]) -> Result<(), SinkError> {
        self.push(desc, value, label_values, None)
    }

    /// Record a gauge sample for a particular instant.
    pub fn timestamped_gauge(
        &mut self,
        desc: &Descriptor,
        value: f64,
        label_values: &[&str],
        timestamp_ms: i64,
    ) -> Result<(), SinkError> {
        self.push(desc, value, label_values, Some(timestamp_ms))
    }

    fn push(
        &mut self,
        desc: &Descriptor,
        value: f64,
        label_values: &[&str],
        timestamp_ms: Option<i64>,
    ) -> Result<(), SinkError> {
        let label_names = &desc.desc.variable_labels;
        if label_values.len() != label_names.len() {
            return Err(SinkError::Cardinality {
                name: desc.name().to_owned(),
                expected: label_names.len(),
                got: label_values.len(),
            });
        }

        let mut metric = Metric::default();
        for (name, value) in label_names.iter().zip(label_values) {
            let mut pair = LabelPair::default();
            pair.set_name(name.clone());
            pair.set_value((*value).to_owned());
            metric.mut_label().push(pair);
        }

        let mut gauge = Gauge::default();
        gauge.set_value(value);
        metric.set_gauge(gauge);

        if let Some(ts) = timestamp_ms {
            metric.set_timestamp_ms(ts);
        }

        self.family(desc).mut_metric().push(metric);
        Ok(())
    }

    fn family(&mut self, desc: &Descriptor) -> &mut MetricFamily {
        self.families.entry(desc.desc.fq_name.clone()).or_insert_with(|| {
            let mut mf = MetricFamily::default();
            mf.set_name(desc.desc.fq_name.clone());
            mf.set_help(desc.desc.help.clone());
            mf.set_field_type(MetricType::GAUGE);
            mf
        })
    }

    /// Move all samples from `other` into this sink. Samples for a name that already exists
    /// are appended to the existing family and keep its help text.
    pub fn merge(&mut self, other: MetricSink) {
        for (name, mut mf) in other.families {
            match self.families.get_mut(&name) {
                Some(existing) => {
                    for m in mf.take_metric().into_vec() {
                        existing.mut_metric().push(m);
                    }
                }
                None => {
                    self.families.insert(name, mf);
                }
            }
        }
    }

    /// Metric families ordered by name, suitable for `prometheus::Encoder`.
    pub fn into_families(self) -> Vec<MetricFamily> {
        self.families
            .into_values()
            .filter(|mf| !mf.get_metric().is_empty())
            .collect()
    }
}
