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

use crate::location::Location;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::{Client, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::error;
use std::fmt;

#[derive(Debug)]
pub enum ClientError {
    Internal(reqwest::Error),
    InvalidUrl(String),
    BadRequest(String),
    Unexpected(StatusCode, Url),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Internal(e) => write!(f, "{}", e),
            Self::InvalidUrl(s) => write!(f, "invalid API URL {}", s),
            Self::BadRequest(reason) => write!(f, "bad request: {}", reason),
            Self::Unexpected(status, url) => write!(f, "unexpected status {} for {}", status, url),
        }
    }
}

impl error::Error for ClientError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Internal(e) => Some(e),
            _ => None,
        }
    }
}

/// Source of satellite radiation data for a location.
///
/// Implemented by `OpenMeteoClient` for the real API. Collectors only depend on this
/// trait so that they can be driven by something else in tests.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, location: &Location) -> Result<SatelliteResponse, ClientError>;
}

#[derive(Debug)]
pub struct OpenMeteoClient {
    client: Client,
    base_url: Url,
    past_days: u32,
}

impl OpenMeteoClient {
    const USER_AGENT: &'static str = "Open-Meteo Prometheus Exporter (https://github.com/56quarters/openmeteo_exporter)";
    const JSON_RESPONSE: &'static str = "application/json";
    const TIMEZONE: &'static str = "GMT";

    pub fn new(client: Client, base_url: &str, past_days: u32) -> Result<Self, ClientError> {
        let base_url = Url::parse(base_url).map_err(|_| ClientError::InvalidUrl(base_url.to_owned()))?;
        Ok(OpenMeteoClient {
            client,
            base_url,
            past_days,
        })
    }

    pub async fn satellite_radiation(&self, location: &Location) -> Result<SatelliteResponse, ClientError> {
        let request_url = self.satellite_url(location);
        tracing::debug!(message = "making satellite radiation request", url = %request_url);

        let res = self.make_request(request_url).await?;
        res.json::<SatelliteResponse>().await.map_err(ClientError::Internal)
    }

    async fn make_request(&self, url: Url) -> Result<Response, ClientError> {
        let res = self
            .client
            .get(url.clone())
            .header(USER_AGENT, Self::USER_AGENT)
            .header(ACCEPT, Self::JSON_RESPONSE)
            .send()
            .await
            .map_err(ClientError::Internal)?;

        let status = res.status();
        if status == StatusCode::OK {
            Ok(res)
        } else if status == StatusCode::BAD_REQUEST {
            // The API explains what was wrong with the request (unknown variable, coordinates
            // out of range) in the body. Fall back to the status if the body isn't what we expect.
            let reason = res
                .json::<ApiError>()
                .await
                .map(|e| e.reason)
                .unwrap_or_else(|_| status.to_string());
            Err(ClientError::BadRequest(reason))
        } else {
            Err(ClientError::Unexpected(status, url))
        }
    }

    fn satellite_url(&self, location: &Location) -> Url {
        let mut url = self.base_url.clone();
        {
            let mut q = url.query_pairs_mut();
            q.append_pair("latitude", &location.latitude.to_string())
                .append_pair("longitude", &location.longitude.to_string());

            if !location.current.is_empty() {
                q.append_pair("current", &location.current.join(","));
            }

            if !location.hourly.is_empty() {
                q.append_pair("hourly", &location.hourly.join(","));
            }

            q.append_pair("past_days", &self.past_days.to_string())
                .append_pair("timezone", Self::TIMEZONE);
        }

        url
    }
}

#[async_trait]
impl Fetch for OpenMeteoClient {
    async fn fetch(&self, location: &Location) -> Result<SatelliteResponse, ClientError> {
        self.satellite_radiation(location).await
    }
}

#[derive(Serialize, Deserialize, Debug)]
struct ApiError {
    reason: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct SatelliteResponse {
    #[serde(alias = "generationtime_ms")]
    pub generation_time_ms: f64,
    #[serde(default)]
    pub utc_offset_seconds: i32,
    #[serde(default)]
    pub current_units: HashMap<String, String>,
    pub current: Option<CurrentData>,
    #[serde(default)]
    pub hourly_units: HashMap<String, String>,
    pub hourly: Option<HourlyData>,
}

/// Most recent value for each requested "current" variable. A `None` value means the
/// API has no data for that variable at the moment.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct CurrentData {
    pub time: String,
    #[serde(default)]
    pub interval: Option<u64>,
    #[serde(flatten)]
    pub variables: HashMap<String, Option<f64>>,
}

/// Values for each requested "hourly" variable, aligned with the `time` axis by index.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct HourlyData {
    pub time: Vec<String>,
    #[serde(flatten)]
    pub variables: HashMap<String, Vec<Option<f64>>>,
}

#[cfg(test)]
mod tests {
    use super::{OpenMeteoClient, SatelliteResponse};
    use crate::location::Location;
    use reqwest::Client;

    const RESPONSE: &str = r#"{
        "latitude": 42.35,
        "longitude": -71.05,
        "generationtime_ms": 0.123,
        "utc_offset_seconds": 0,
        "timezone": "GMT",
        "timezone_abbreviation": "GMT",
        "elevation": 12.0,
        "current_units": {"time": "iso8601", "interval": "seconds", "shortwave_radiation": "W/m²"},
        "current": {"time": "2024-01-01T12:00", "interval": 900, "shortwave_radiation": null},
        "hourly_units": {"time": "iso8601", "direct_radiation": "W/m²"},
        "hourly": {
            "time": ["2024-01-01T00:00", "2024-01-01T01:00", "2024-01-01T02:00"],
            "direct_radiation": [0.0, 12.5, null]
        }
    }"#;

    fn location() -> Location {
        Location::new("boston", 42.36, -71.06)
            .unwrap()
            .with_variables(
                vec!["shortwave_radiation".to_owned()],
                vec!["direct_radiation".to_owned(), "diffuse_radiation".to_owned()],
            )
            .unwrap()
    }

    #[test]
    fn test_satellite_url() {
        let client = OpenMeteoClient::new(Client::new(), "https://satellite-api.open-meteo.com/v1/archive", 2).unwrap();
        let url = client.satellite_url(&location());
        let pairs: Vec<(String, String)> = url.query_pairs().map(|(k, v)| (k.into_owned(), v.into_owned())).collect();

        assert_eq!("/v1/archive", url.path());
        assert_eq!(
            vec![
                ("latitude".to_owned(), "42.36".to_owned()),
                ("longitude".to_owned(), "-71.06".to_owned()),
                ("current".to_owned(), "shortwave_radiation".to_owned()),
                ("hourly".to_owned(), "direct_radiation,diffuse_radiation".to_owned()),
                ("past_days".to_owned(), "2".to_owned()),
                ("timezone".to_owned(), "GMT".to_owned()),
            ],
            pairs
        );
    }

    #[test]
    fn test_satellite_url_no_current() {
        let client = OpenMeteoClient::new(Client::new(), "https://satellite-api.open-meteo.com/v1/archive", 1).unwrap();
        let loc = Location::new("boston", 42.36, -71.06)
            .unwrap()
            .with_variables(Vec::new(), vec!["direct_radiation".to_owned()])
            .unwrap();
        let url = client.satellite_url(&loc);

        assert!(url.query_pairs().all(|(k, _)| k != "current"));
        assert!(url.query_pairs().any(|(k, v)| k == "hourly" && v == "direct_radiation"));
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(OpenMeteoClient::new(Client::new(), "not a url", 1).is_err());
    }

    #[test]
    fn test_decode_response() {
        let res: SatelliteResponse = serde_json::from_str(RESPONSE).unwrap();
        let current = res.current.unwrap();
        let hourly = res.hourly.unwrap();

        assert_eq!(0.123, res.generation_time_ms);
        assert_eq!(0, res.utc_offset_seconds);
        assert_eq!(Some(&"W/m²".to_owned()), res.current_units.get("shortwave_radiation"));
        assert_eq!("2024-01-01T12:00", current.time);
        assert_eq!(Some(900), current.interval);
        assert_eq!(Some(&None), current.variables.get("shortwave_radiation"));
        assert_eq!(3, hourly.time.len());
        assert_eq!(
            Some(&vec![Some(0.0), Some(12.5), None]),
            hourly.variables.get("direct_radiation")
        );
    }
}
