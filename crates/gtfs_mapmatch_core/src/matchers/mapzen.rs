//! Valhalla `trace_route`, originally hosted by Mapzen.

use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use url::Url;

use super::{check_point_count, decode_json, decode_polyline, http_client, parse_url, send};
use crate::config::{ConfigError, MatchService, MatcherConfig};
use crate::geometry::LonLat;
use crate::matcher::{MatchError, Matcher};

pub const DEFAULT_URL: &str = "https://valhalla.mapzen.com/trace_route";
pub const DEFAULT_COSTING: &str = "auto";

pub struct MapzenMatcher {
    client: Client,
    url: Url,
    costing: String,
    options: Map<String, Value>,
}

impl MapzenMatcher {
    pub fn new(config: &MatcherConfig) -> Result<Self, ConfigError> {
        let api_key = config.required_api_key()?;
        let mut url = parse_url(config.url.as_deref().unwrap_or(DEFAULT_URL))?;
        url.query_pairs_mut().append_pair("api_key", api_key);
        Ok(Self {
            client: http_client()?,
            url,
            costing: config
                .profile
                .clone()
                .unwrap_or_else(|| DEFAULT_COSTING.to_string()),
            options: config.options.clone(),
        })
    }

    /// The JSON request body. Extra options override the defaults.
    pub fn request_body(&self, points: &[LonLat]) -> Value {
        let mut body = Map::new();
        body.insert("shape".to_string(), Value::Array(encode_points(points)));
        body.insert("costing".to_string(), Value::String(self.costing.clone()));
        for (key, value) in &self.options {
            body.insert(key.clone(), value.clone());
        }
        Value::Object(body)
    }
}

impl Matcher for MapzenMatcher {
    fn service(&self) -> MatchService {
        MatchService::Mapzen
    }

    fn match_points(&self, points: &[LonLat]) -> Result<Vec<LonLat>, MatchError> {
        check_point_count(points)?;
        let request = self
            .client
            .post(self.url.clone())
            .json(&self.request_body(points));
        let body = send(MatchService::Mapzen, request)?;
        parse_response(&body)
    }
}

/// `{"lon": .., "lat": ..}` objects rounded to six decimals.
pub fn encode_points(points: &[LonLat]) -> Vec<Value> {
    points
        .iter()
        .map(|point| json!({ "lon": round6(point.lon), "lat": round6(point.lat) }))
        .collect()
}

fn round6(value: f64) -> f64 {
    (value * 1e6).round() / 1e6
}

#[derive(Debug, Deserialize)]
struct TraceRouteResponse {
    trip: TraceTrip,
}

#[derive(Debug, Deserialize)]
struct TraceTrip {
    #[serde(default)]
    legs: Vec<TraceLeg>,
}

#[derive(Debug, Deserialize)]
struct TraceLeg {
    shape: String,
}

/// The matched path is the encoded shape of the first leg.
pub fn parse_response(body: &str) -> Result<Vec<LonLat>, MatchError> {
    let response: TraceRouteResponse = decode_json(MatchService::Mapzen, body)?;
    let Some(leg) = response.trip.legs.first() else {
        return Err(MatchError::Decode {
            service: MatchService::Mapzen,
            message: "trip has no legs".to_string(),
        });
    };
    decode_polyline(MatchService::Mapzen, &leg.shape)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_request_body_with_options() {
        let mut options = Map::new();
        options.insert("shape_match".into(), json!("map_snap"));
        options.insert("costing".into(), json!("bus"));
        let config = MatcherConfig::new(MatchService::Mapzen)
            .with_api_key("secret")
            .with_options(options);
        let matcher = MapzenMatcher::new(&config).unwrap();

        let body = matcher.request_body(&[LonLat::new(174.8432344, -41.1374251)]);
        assert_eq!(body["shape"][0]["lon"], json!(174.843234));
        assert_eq!(body["shape"][0]["lat"], json!(-41.137425));
        assert_eq!(body["costing"], json!("bus"));
        assert_eq!(body["shape_match"], json!("map_snap"));
        assert_eq!(
            matcher.url.as_str(),
            "https://valhalla.mapzen.com/trace_route?api_key=secret"
        );
    }

    #[test]
    fn parses_first_leg_shape() {
        let body = r#"{
            "trip": {
                "status": 0,
                "units": "kilometers",
                "legs": [{"summary": {"length": 1.9}, "shape": "ht{_Fscui`@bHhA"}]
            }
        }"#;
        let points = parse_response(body).unwrap();
        assert_eq!(points.len(), 2);
        assert!((points[0].lon - 17.476682).abs() < 1e-9);
    }

    #[test]
    fn missing_legs_is_a_decode_error() {
        let err = parse_response(r#"{"trip": {"legs": []}}"#).unwrap_err();
        assert!(matches!(err, MatchError::Decode { .. }));
        let err = parse_response("not json").unwrap_err();
        assert!(matches!(err, MatchError::Decode { .. }));
    }

    #[test]
    fn posts_trace_to_server() {
        let (base_url, server) = crate::matchers::test_support::serve_once(
            200,
            r#"{"trip": {"legs": [{"shape": "ht{_Fscui`@bHhA"}]}}"#,
        );
        let config = MatcherConfig::new(MatchService::Mapzen)
            .with_api_key("secret")
            .with_url(format!("{}/trace_route", base_url));
        let matcher = MapzenMatcher::new(&config).unwrap();

        let points = matcher.match_points(&[LonLat::new(1.0, 2.0)]).unwrap();
        assert_eq!(points.len(), 2);

        let request = server.join().unwrap();
        assert!(request.starts_with("POST /trace_route?api_key=secret HTTP/1.1"));
        let body = &request[request.find("\r\n\r\n").unwrap() + 4..];
        let body: Value = serde_json::from_str(body).unwrap();
        assert_eq!(body["shape"][0]["lat"], json!(2.0));
        assert_eq!(body["costing"], json!("auto"));
    }

    #[test]
    fn server_error_is_a_status_error() {
        let (base_url, server) = crate::matchers::test_support::serve_once(500, "");
        let config = MatcherConfig::new(MatchService::Mapzen)
            .with_api_key("secret")
            .with_url(base_url);
        let matcher = MapzenMatcher::new(&config).unwrap();
        let err = matcher.match_points(&[LonLat::new(1.0, 2.0)]).unwrap_err();
        assert!(matches!(err, MatchError::Status { status: 500, .. }));
        server.join().unwrap();
    }
}
