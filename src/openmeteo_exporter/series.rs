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

use crate::client::HourlyData;
use std::collections::BTreeMap;

/// Known values for a single variable, keyed by the timestamp string from the API.
///
/// Timestamps all share the same fixed width format so lexical order is also
/// chronological order. Entries are only ever added or overwritten, never removed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Series {
    points: BTreeMap<String, f64>,
}

impl Series {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, timestamp: &str) -> Option<f64> {
        self.points.get(timestamp).copied()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.points.iter().map(|(k, v)| (k.as_str(), *v))
    }

    fn set(&mut self, timestamp: &str, value: f64) {
        match self.points.get_mut(timestamp) {
            Some(v) => *v = value,
            None => {
                self.points.insert(timestamp.to_owned(), value);
            }
        }
    }
}

/// A single stored value of a variable at a particular time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point<'a> {
    pub variable: &'a str,
    pub timestamp: &'a str,
    pub value: f64,
}

/// History of every tracked hourly variable for a single location.
///
/// State is only changed by `merge()` and grows for the life of the process: values
/// are never removed and a missing value in a response never erases a known one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Accumulator {
    series: BTreeMap<String, Series>,
    utc_offset_seconds: i32,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge values from an hourly response for each of the `tracked` variables.
    ///
    /// Every tracked variable gets a (possibly empty) series. Values present in the response
    /// overwrite anything stored for the same timestamp; absent values are skipped. Variables
    /// in the response that aren't tracked are ignored.
    pub fn merge<S: AsRef<str>>(&mut self, tracked: &[S], hourly: Option<&HourlyData>, utc_offset_seconds: i32) {
        self.utc_offset_seconds = utc_offset_seconds;

        for name in tracked {
            let name = name.as_ref();
            let series = self.series.entry(name.to_owned()).or_default();

            let (times, values) = match hourly.and_then(|h| h.variables.get(name).map(|v| (&h.time, v))) {
                Some(tv) => tv,
                None => continue,
            };

            // Values past the end of a short array are treated as absent
            for (timestamp, value) in times.iter().zip(values.iter()) {
                if let Some(v) = value {
                    series.set(timestamp, *v);
                }
            }
        }
    }

    pub fn series(&self, variable: &str) -> Option<&Series> {
        self.series.get(variable)
    }

    /// UTC offset that timestamps of the most recently merged response were given in.
    pub fn utc_offset_seconds(&self) -> i32 {
        self.utc_offset_seconds
    }

    /// Walk every stored point of the given variables, in variable order and then timestamp order.
    ///
    /// This always covers the full history, not just what changed in the most recent merge.
    pub fn points<'a, S: AsRef<str> + 'a>(&'a self, tracked: &'a [S]) -> impl Iterator<Item = Point<'a>> + 'a {
        tracked.iter().flat_map(move |name| {
            self.series
                .get_key_value(name.as_ref())
                .into_iter()
                .flat_map(|(variable, series)| {
                    series.iter().map(move |(timestamp, value)| Point {
                        variable: variable.as_str(),
                        timestamp,
                        value,
                    })
                })
        })
    }
}
