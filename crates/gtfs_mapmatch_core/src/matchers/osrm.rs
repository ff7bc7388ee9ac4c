use reqwest::blocking::Client;
use serde::Deserialize;
use url::Url;

use super::{
    check_point_count, coordinate_path, decode_json, decode_polyline, http_client, parse_url, send,
};
use crate::config::{ConfigError, MatchService, MatcherConfig};
use crate::geometry::LonLat;
use crate::matcher::{MatchError, Matcher};

pub const DEFAULT_URL: &str = "http://router.project-osrm.org/match/v1";
pub const DEFAULT_PROFILE: &str = "car";

pub struct OsrmMatcher {
    client: Client,
    base_url: String,
    profile: String,
}

impl OsrmMatcher {
    pub fn new(config: &MatcherConfig) -> Result<Self, ConfigError> {
        let base_url = config.url.as_deref().unwrap_or(DEFAULT_URL);
        parse_url(base_url)?;
        Ok(Self {
            client: http_client()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            profile: config
                .profile
                .clone()
                .unwrap_or_else(|| DEFAULT_PROFILE.to_string()),
        })
    }

    pub fn request_url(&self, points: &[LonLat]) -> Result<Url, ConfigError> {
        let mut url = parse_url(&format!(
            "{}/{}/{}",
            self.base_url,
            self.profile,
            coordinate_path(points)
        ))?;
        url.query_pairs_mut().append_pair("geometries", "polyline6");
        Ok(url)
    }
}

impl Matcher for OsrmMatcher {
    fn service(&self) -> MatchService {
        MatchService::Osrm
    }

    fn match_points(&self, points: &[LonLat]) -> Result<Vec<LonLat>, MatchError> {
        check_point_count(points)?;
        let url = self.request_url(points).map_err(|err| MatchError::Decode {
            service: MatchService::Osrm,
            message: err.to_string(),
        })?;
        let body = send(MatchService::Osrm, self.client.get(url))?;
        parse_response(MatchService::Osrm, &body)
    }
}

#[derive(Debug, Deserialize)]
struct MatchResponse {
    #[serde(default)]
    matchings: Vec<Matching>,
}

#[derive(Debug, Deserialize)]
struct Matching {
    geometry: String,
}

/// Concatenates the geometries of every matching, in order. Shared by the
/// OSRM and Mapbox matchers, which answer in the same format.
pub fn parse_response(service: MatchService, body: &str) -> Result<Vec<LonLat>, MatchError> {
    let response: MatchResponse = decode_json(service, body)?;
    let mut points = Vec::new();
    for matching in &response.matchings {
        points.extend(decode_polyline(service, &matching.geometry)?);
    }
    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::matchers::test_support::serve_once;

    #[test]
    fn builds_match_url() {
        let config =
            MatcherConfig::new(MatchService::Osrm).with_url("http://localhost:5000/match/v1/");
        let matcher = OsrmMatcher::new(&config).unwrap();
        let points = [
            LonLat::new(174.805053, -41.223382),
            LonLat::new(174.796743, -41.247018),
        ];
        let url = matcher.request_url(&points).unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:5000/match/v1/car/\
             174.805053,-41.223382;174.796743,-41.247018?geometries=polyline6"
        );
    }

    #[test]
    fn matches_points_against_server() {
        let (base_url, server) = serve_once(
            200,
            r#"{"code": "Ok", "matchings": [{"geometry": "ht{_Fscui`@bHhA"}]}"#,
        );
        let config =
            MatcherConfig::new(MatchService::Osrm).with_url(format!("{}/match/v1", base_url));
        let matcher = OsrmMatcher::new(&config).unwrap();

        let points = matcher
            .match_points(&[LonLat::new(1.0, 2.0), LonLat::new(1.5, 2.5)])
            .unwrap();
        assert_eq!(points.len(), 2);
        assert!((points[1].lon - 17.476645).abs() < 1e-9);
        assert!((points[1].lat + 3.684839).abs() < 1e-9);

        let request = server.join().unwrap();
        assert!(request.starts_with("GET /match/v1/car/1,2;1.5,2.5?geometries=polyline6 HTTP/1.1"));
    }

    #[test]
    fn unavailable_server_is_a_status_error() {
        let (base_url, server) = serve_once(503, "");
        let matcher = OsrmMatcher::new(&MatcherConfig::new(MatchService::Osrm).with_url(base_url))
            .unwrap();
        let err = matcher.match_points(&[LonLat::new(1.0, 2.0)]).unwrap_err();
        assert!(matches!(
            err,
            MatchError::Status {
                service: MatchService::Osrm,
                status: 503
            }
        ));
        server.join().unwrap();
    }

    #[test]
    fn concatenates_matchings() {
        let body = r#"{
            "code": "Ok",
            "tracepoints": [{"location": [174.805053, -41.223382], "matchings_index": 0}],
            "matchings": [
                {"confidence": 0.9, "geometry": "ht{_Fscui`@bHhA"},
                {"confidence": 0.4, "geometry": "ht{_Fscui`@"}
            ]
        }"#;
        let points = parse_response(MatchService::Osrm, body).unwrap();
        assert_eq!(points.len(), 3);
        assert!((points[2].lon - 17.476682).abs() < 1e-9);
    }

    #[test]
    fn no_matchings_is_an_empty_match() {
        let points = parse_response(MatchService::Osrm, r#"{"code": "NoMatch"}"#).unwrap();
        assert!(points.is_empty());
    }
}
