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

use std::error;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq)]
pub enum LocationError {
    Format(String),
    Coordinate(String),
    OverlappingVariable(String),
}

impl fmt::Display for LocationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Format(s) => write!(f, "invalid location '{}', expected NAME=LATITUDE,LONGITUDE", s),
            Self::Coordinate(s) => write!(f, "invalid coordinates for location '{}'", s),
            Self::OverlappingVariable(v) => write!(f, "variable {} cannot be both a current and hourly variable", v),
        }
    }
}

impl error::Error for LocationError {}

/// A named place to fetch satellite radiation data for along with the variables to export.
///
/// Variables in `current` are exported as a single gauge per scrape with the most recent value.
/// Variables in `hourly` are accumulated over time and every known hour is exported with its
/// own timestamp on each scrape.
#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub current: Vec<String>,
    pub hourly: Vec<String>,
}

impl Location {
    pub fn new<S: Into<String>>(name: S, latitude: f64, longitude: f64) -> Result<Self, LocationError> {
        let name = name.into();
        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            return Err(LocationError::Coordinate(name));
        }

        Ok(Location {
            name,
            latitude,
            longitude,
            current: Vec::new(),
            hourly: Vec::new(),
        })
    }

    /// Set the variables tracked for this location, rejecting any variable that appears in both sets.
    pub fn with_variables(mut self, current: Vec<String>, hourly: Vec<String>) -> Result<Self, LocationError> {
        if let Some(v) = current.iter().find(|v| hourly.contains(v)) {
            return Err(LocationError::OverlappingVariable(v.clone()));
        }

        self.current = current;
        self.hourly = hourly;
        Ok(self)
    }
}

impl FromStr for Location {
    type Err = LocationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, coords) = s.split_once('=').ok_or_else(|| LocationError::Format(s.to_owned()))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(LocationError::Format(s.to_owned()));
        }

        let (lat, lon) = coords
            .split_once(',')
            .ok_or_else(|| LocationError::Format(s.to_owned()))?;
        let latitude = lat
            .trim()
            .parse::<f64>()
            .map_err(|_| LocationError::Coordinate(name.to_owned()))?;
        let longitude = lon
            .trim()
            .parse::<f64>()
            .map_err(|_| LocationError::Coordinate(name.to_owned()))?;

        Location::new(name, latitude, longitude)
    }
}
