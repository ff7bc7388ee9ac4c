//! Wire formats of the supported map matching services.

use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder};
use url::Url;

use crate::config::{ConfigError, MatchService};
use crate::geometry::LonLat;
use crate::matcher::MatchError;

pub mod google;
pub mod mapbox;
pub mod mapzen;
pub mod osrm;

pub use google::GoogleMatcher;
pub use mapbox::MapboxMatcher;
pub use mapzen::MapzenMatcher;
pub use osrm::OsrmMatcher;

/// Most points the public endpoints accept in one request.
pub const MAX_POINTS: usize = 100;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Precision of the encoded polylines requested from every service.
const POLYLINE_PRECISION: u32 = 6;

fn http_client() -> Result<Client, ConfigError> {
    Client::builder()
        .user_agent(format!("gtfs-mapmatch/{}", env!("CARGO_PKG_VERSION")))
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(ConfigError::HttpClient)
}

fn parse_url(url: &str) -> Result<Url, ConfigError> {
    Url::parse(url).map_err(|source| ConfigError::InvalidUrl {
        url: url.to_string(),
        source,
    })
}

fn check_point_count(points: &[LonLat]) -> Result<(), MatchError> {
    if points.len() > MAX_POINTS {
        return Err(MatchError::TooManyPoints {
            count: points.len(),
            limit: MAX_POINTS,
        });
    }
    Ok(())
}

/// Sends the request and returns the body of a successful response.
fn send(service: MatchService, request: RequestBuilder) -> Result<String, MatchError> {
    let http_err = |source: reqwest::Error| MatchError::Http { service, source };
    let response = request.send().map_err(http_err)?;
    let status = response.status();
    if !status.is_success() {
        return Err(MatchError::Status {
            service,
            status: status.as_u16(),
        });
    }
    response.text().map_err(http_err)
}

fn decode_json<'a, T: serde::Deserialize<'a>>(
    service: MatchService,
    body: &'a str,
) -> Result<T, MatchError> {
    serde_json::from_str(body).map_err(|err| MatchError::Decode {
        service,
        message: err.to_string(),
    })
}

fn decode_polyline(service: MatchService, encoded: &str) -> Result<Vec<LonLat>, MatchError> {
    let line = polyline::decode_polyline(encoded, POLYLINE_PRECISION).map_err(|err| {
        MatchError::Decode {
            service,
            message: err.to_string(),
        }
    })?;
    Ok(line
        .0
        .into_iter()
        .map(|coord| LonLat::new(coord.x, coord.y))
        .collect())
}

/// `lon,lat;lon,lat;...` as used in OSRM style URL paths.
fn coordinate_path(points: &[LonLat]) -> String {
    points
        .iter()
        .map(|point| format!("{},{}", point.lon, point.lat))
        .collect::<Vec<_>>()
        .join(";")
}
