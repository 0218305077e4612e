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

use chrono::{FixedOffset, NaiveDateTime, TimeZone};
use std::error;
use std::fmt;

pub const NAMESPACE: &str = "openmeteo";
pub const SUBSYSTEM_SATELLITE_RADIATION: &str = "satellite_radiation";

const UNIT_POWER_PER_AREA: &str = "W/m²";
const UNIT_POWER_PER_AREA_TOKEN: &str = "w_per_m2";
const UNIT_PERCENT: &str = "%";
const UNIT_PERCENT_TOKEN: &str = "percent";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M";
const TIMESTAMP_LEN: usize = "YYYY-MM-DDTHH:MM".len();

/// Join non-empty name segments with underscores.
pub fn fq_name(namespace: &str, subsystem: &str, name: &str) -> String {
    [namespace, subsystem, name]
        .iter()
        .filter(|s| !s.is_empty())
        .copied()
        .collect::<Vec<&str>>()
        .join("_")
}

/// Convert a unit as returned by the API into something usable in a metric name.
///
/// The result only contains characters in `[a-z0-9_]` and may be empty.
pub fn normalize_unit(unit: &str) -> String {
    if unit == UNIT_POWER_PER_AREA {
        return UNIT_POWER_PER_AREA_TOKEN.to_owned();
    }

    if unit == UNIT_PERCENT {
        return UNIT_PERCENT_TOKEN.to_owned();
    }

    let replaced: String = unit
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_lowercase() || c.is_ascii_digit() { c } else { '_' })
        .collect();

    replaced.trim_matches('_').to_owned()
}

/// Full metric name for a variable, e.g. `openmeteo_satellite_radiation_shortwave_radiation_w_per_m2`
pub fn metric_name(subsystem: &str, variable: &str, unit: Option<&str>) -> String {
    let unit = unit.map(normalize_unit).unwrap_or_default();
    let name = if unit.is_empty() {
        variable.to_owned()
    } else {
        format!("{}_{}", variable, unit)
    };

    fq_name(NAMESPACE, subsystem, &name)
}

/// Human readable description of a variable, used as help text for metrics.
pub fn describe(category: &str, variable: &str) -> Option<&'static str> {
    if category != SUBSYSTEM_SATELLITE_RADIATION {
        return None;
    }

    let desc = match variable {
        "shortwave_radiation" => "Shortwave solar radiation as average of the preceding hour (global horizontal irradiation)",
        "direct_radiation" => "Direct solar radiation as average of the preceding hour on the horizontal plane",
        "diffuse_radiation" => "Diffuse solar radiation as average of the preceding hour",
        "direct_normal_irradiance" => "Direct solar radiation as average of the preceding hour on the normal plane",
        "global_tilted_irradiance" => "Total radiation received on a tilted pane as average of the preceding hour",
        "terrestrial_radiation" => "Solar radiation at the top of the atmosphere as average of the preceding hour",
        "shortwave_radiation_instant" => "Shortwave solar radiation at the indicated time",
        "direct_radiation_instant" => "Direct solar radiation on the horizontal plane at the indicated time",
        "diffuse_radiation_instant" => "Diffuse solar radiation at the indicated time",
        "direct_normal_irradiance_instant" => "Direct solar radiation on the normal plane at the indicated time",
        "global_tilted_irradiance_instant" => "Total radiation received on a tilted pane at the indicated time",
        "terrestrial_radiation_instant" => "Solar radiation at the top of the atmosphere at the indicated time",
        _ => return None,
    };

    Some(desc)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimestampError {
    Malformed(String),
    Offset(i32),
}

impl fmt::Display for TimestampError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed(s) => write!(f, "malformed timestamp '{}'", s),
            Self::Offset(o) => write!(f, "invalid UTC offset {} seconds", o),
        }
    }
}

impl error::Error for TimestampError {}

fn is_timestamp_shape(raw: &str) -> bool {
    let bytes = raw.as_bytes();
    bytes.len() == TIMESTAMP_LEN
        && bytes.iter().enumerate().all(|(i, b)| match i {
            4 | 7 => *b == b'-',
            10 => *b == b'T',
            13 => *b == b':',
            _ => b.is_ascii_digit(),
        })
}

/// Parse a `YYYY-MM-DDTHH:MM` timestamp at the given UTC offset into milliseconds since the epoch.
pub fn parse_timestamp(raw: &str, utc_offset_seconds: i32) -> Result<i64, TimestampError> {
    // chrono accepts padding, signs, and short fields, enforce the exact shape here.
    if !is_timestamp_shape(raw) {
        return Err(TimestampError::Malformed(raw.to_owned()));
    }

    let naive =
        NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT).map_err(|_| TimestampError::Malformed(raw.to_owned()))?;
    let offset = FixedOffset::east_opt(utc_offset_seconds).ok_or(TimestampError::Offset(utc_offset_seconds))?;

    offset
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.timestamp_millis())
        .ok_or_else(|| TimestampError::Malformed(raw.to_owned()))
}
