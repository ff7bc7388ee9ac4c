//! Google Roads API `snapToRoads`.

use reqwest::blocking::Client;
use serde::Deserialize;
use url::Url;

use super::{check_point_count, decode_json, http_client, parse_url, send};
use crate::config::{ConfigError, MatchService, MatcherConfig};
use crate::geometry::LonLat;
use crate::matcher::{MatchError, Matcher};

pub const DEFAULT_URL: &str = "https://roads.googleapis.com/v1/snapToRoads";

pub struct GoogleMatcher {
    client: Client,
    url: Url,
    api_key: String,
}

impl GoogleMatcher {
    pub fn new(config: &MatcherConfig) -> Result<Self, ConfigError> {
        let api_key = config.required_api_key()?.to_string();
        Ok(Self {
            client: http_client()?,
            url: parse_url(config.url.as_deref().unwrap_or(DEFAULT_URL))?,
            api_key,
        })
    }

    pub fn request_url(&self, points: &[LonLat]) -> Url {
        let mut url = self.url.clone();
        url.query_pairs_mut()
            .append_pair("key", &self.api_key)
            .append_pair("path", &encode_path(points))
            .append_pair("interpolate", "true");
        url
    }
}

impl Matcher for GoogleMatcher {
    fn service(&self) -> MatchService {
        MatchService::Google
    }

    fn match_points(&self, points: &[LonLat]) -> Result<Vec<LonLat>, MatchError> {
        check_point_count(points)?;
        let request = self.client.get(self.request_url(points));
        let body = send(MatchService::Google, request)?;
        parse_response(&body)
    }
}

/// `lat,lon|lat,lon|...` with six decimals.
pub fn encode_path(points: &[LonLat]) -> String {
    points
        .iter()
        .map(|point| format!("{:.6},{:.6}", point.lat, point.lon))
        .collect::<Vec<_>>()
        .join("|")
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SnapResponse {
    #[serde(default)]
    snapped_points: Vec<SnappedPoint>,
}

#[derive(Debug, Deserialize)]
struct SnappedPoint {
    location: SnappedLocation,
}

#[derive(Debug, Deserialize)]
struct SnappedLocation {
    latitude: f64,
    longitude: f64,
}

pub fn parse_response(body: &str) -> Result<Vec<LonLat>, MatchError> {
    let response: SnapResponse = decode_json(MatchService::Google, body)?;
    Ok(response
        .snapped_points
        .iter()
        .map(|point| LonLat::new(point.location.longitude, point.location.latitude))
        .collect())
}
