use reqwest::blocking::Client;
use url::Url;

use super::{check_point_count, coordinate_path, http_client, osrm, parse_url, send};
use crate::config::{ConfigError, MatchService, MatcherConfig};
use crate::geometry::LonLat;
use crate::matcher::{MatchError, Matcher};

pub const DEFAULT_URL: &str = "https://api.mapbox.com/matching/v5/mapbox";
pub const DEFAULT_PROFILE: &str = "driving";

pub struct MapboxMatcher {
    client: Client,
    base_url: String,
    profile: String,
    access_token: String,
}

impl MapboxMatcher {
    pub fn new(config: &MatcherConfig) -> Result<Self, ConfigError> {
        let access_token = config.required_api_key()?.to_string();
        let base_url = config.url.as_deref().unwrap_or(DEFAULT_URL);
        parse_url(base_url)?;
        Ok(Self {
            client: http_client()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            profile: config
                .profile
                .clone()
                .unwrap_or_else(|| DEFAULT_PROFILE.to_string()),
            access_token,
        })
    }

    pub fn request_url(&self, points: &[LonLat]) -> Result<Url, ConfigError> {
        let mut url = parse_url(&format!(
            "{}/{}/{}",
            self.base_url,
            self.profile,
            coordinate_path(points)
        ))?;
        url.query_pairs_mut()
            .append_pair("access_token", &self.access_token)
            .append_pair("geometries", "polyline6");
        Ok(url)
    }
}

impl Matcher for MapboxMatcher {
    fn service(&self) -> MatchService {
        MatchService::Mapbox
    }

    fn match_points(&self, points: &[LonLat]) -> Result<Vec<LonLat>, MatchError> {
        check_point_count(points)?;
        let url = self.request_url(points).map_err(|err| MatchError::Decode {
            service: MatchService::Mapbox,
            message: err.to_string(),
        })?;
        let body = send(MatchService::Mapbox, self.client.get(url))?;
        osrm::parse_response(MatchService::Mapbox, &body)
    }
}
