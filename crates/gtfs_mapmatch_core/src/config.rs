use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde_json::{Map, Value};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unknown map matching service {0:?}, expected one of mapzen, osrm, mapbox, google")]
    UnknownService(String),
    #[error("{0} requires an API key")]
    MissingApiKey(MatchService),
    #[error("invalid url {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("failed to build http client: {0}")]
    HttpClient(#[source] reqwest::Error),
    #[error("failed to read secrets file {path}: {source}")]
    SecretsIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("secrets file {path} is not a JSON object: {message}")]
    SecretsFormat { path: PathBuf, message: String },
    #[error("secrets file {path} has no string value for {key:?}")]
    MissingSecret { path: PathBuf, key: String },
}

/// The external map matching services a [`crate::Matcher`] can talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchService {
    /// Valhalla `trace_route`, as hosted by Mapzen.
    Mapzen,
    Osrm,
    Mapbox,
    /// Google Roads `snapToRoads`.
    Google,
}

impl MatchService {
    pub const ALL: [MatchService; 4] = [
        MatchService::Mapzen,
        MatchService::Osrm,
        MatchService::Mapbox,
        MatchService::Google,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            MatchService::Mapzen => "mapzen",
            MatchService::Osrm => "osrm",
            MatchService::Mapbox => "mapbox",
            MatchService::Google => "google",
        }
    }

    pub fn requires_api_key(&self) -> bool {
        !matches!(self, MatchService::Osrm)
    }
}

impl fmt::Display for MatchService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MatchService {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "mapzen" | "valhalla" => Ok(MatchService::Mapzen),
            "osrm" => Ok(MatchService::Osrm),
            "mapbox" => Ok(MatchService::Mapbox),
            "google" => Ok(MatchService::Google),
            _ => Err(ConfigError::UnknownService(value.to_string())),
        }
    }
}

/// Everything needed to build a matcher for one service.
#[derive(Debug, Clone, PartialEq)]
pub struct MatcherConfig {
    pub service: MatchService,
    pub api_key: Option<String>,
    /// Replaces the service's default endpoint.
    pub url: Option<String>,
    /// Routing profile or costing model, e.g. `car` for OSRM.
    pub profile: Option<String>,
    /// Extra request fields. Merged into the Valhalla request body.
    pub options: Map<String, Value>,
}

impl MatcherConfig {
    pub fn new(service: MatchService) -> Self {
        Self {
            service,
            api_key: None,
            url: None,
            profile: None,
            options: Map::new(),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }

    pub fn with_options(mut self, options: Map<String, Value>) -> Self {
        self.options = options;
        self
    }

    /// The API key, or an error if the service needs one and none is set.
    pub fn required_api_key(&self) -> Result<&str, ConfigError> {
        match self.api_key.as_deref().filter(|key| !key.trim().is_empty()) {
            Some(key) => Ok(key),
            None => Err(ConfigError::MissingApiKey(self.service)),
        }
    }
}

/// Reads the string stored under `key` in a JSON object file.
pub fn read_secret(path: impl AsRef<Path>, key: &str) -> Result<String, ConfigError> {
    let path = path.as_ref();
    let data = std::fs::read_to_string(path).map_err(|source| ConfigError::SecretsIo {
        path: path.to_path_buf(),
        source,
    })?;
    let value: Value = serde_json::from_str(&data).map_err(|err| ConfigError::SecretsFormat {
        path: path.to_path_buf(),
        message: err.to_string(),
    })?;
    let Value::Object(secrets) = value else {
        return Err(ConfigError::SecretsFormat {
            path: path.to_path_buf(),
            message: "top-level value is not an object".to_string(),
        });
    };
    secrets
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ConfigError::MissingSecret {
            path: path.to_path_buf(),
            key: key.to_string(),
        })
}
