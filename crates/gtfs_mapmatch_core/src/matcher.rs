use crate::config::{ConfigError, MatchService, MatcherConfig};
use crate::geometry::LonLat;
use crate::matchers::{GoogleMatcher, MapboxMatcher, MapzenMatcher, OsrmMatcher};

#[derive(Debug, thiserror::Error)]
pub enum MatchError {
    #[error("request to {service} failed: {source}")]
    Http {
        service: MatchService,
        #[source]
        source: reqwest::Error,
    },
    #[error("{service} answered with HTTP status {status}")]
    Status { service: MatchService, status: u16 },
    #[error("could not decode {service} response: {message}")]
    Decode {
        service: MatchService,
        message: String,
    },
    #[error("{count} points exceed the limit of {limit} per request")]
    TooManyPoints { count: usize, limit: usize },
}

/// Snaps an ordered point sequence onto a road network.
///
/// One call is one request to the service. An empty result means the service
/// found no match.
pub trait Matcher: Send + Sync {
    fn service(&self) -> MatchService;

    fn match_points(&self, points: &[LonLat]) -> Result<Vec<LonLat>, MatchError>;
}

/// Builds the matcher for `config.service`. Fails without any network
/// access when the configuration is incomplete.
pub fn build_matcher(config: &MatcherConfig) -> Result<Box<dyn Matcher>, ConfigError> {
    if config.service.requires_api_key() {
        config.required_api_key()?;
    }
    let matcher: Box<dyn Matcher> = match config.service {
        MatchService::Mapzen => Box::new(MapzenMatcher::new(config)?),
        MatchService::Osrm => Box::new(OsrmMatcher::new(config)?),
        MatchService::Mapbox => Box::new(MapboxMatcher::new(config)?),
        MatchService::Google => Box::new(GoogleMatcher::new(config)?),
    };
    Ok(matcher)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_every_service() {
        for service in MatchService::ALL {
            let config = MatcherConfig::new(service).with_api_key("key");
            let matcher = build_matcher(&config).unwrap();
            assert_eq!(matcher.service(), service);
        }
    }

    #[test]
    fn keyed_services_fail_without_key() {
        for service in [MatchService::Mapzen, MatchService::Mapbox, MatchService::Google] {
            let err = build_matcher(&MatcherConfig::new(service)).err().unwrap();
            assert!(matches!(err, ConfigError::MissingApiKey(s) if s == service));
        }
        assert!(build_matcher(&MatcherConfig::new(MatchService::Osrm)).is_ok());
    }

    #[test]
    fn rejects_malformed_url() {
        let config = MatcherConfig::new(MatchService::Osrm).with_url("not a url");
        assert!(matches!(
            build_matcher(&config).err().unwrap(),
            ConfigError::InvalidUrl { .. }
        ));
    }
}
