use std::fmt;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer};

#[derive(Debug, thiserror::Error)]
pub enum GtfsParseError {
    #[error("invalid route_type: {0}")]
    InvalidRouteType(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteType {
    Tram,
    Subway,
    Rail,
    Bus,
    Ferry,
    CableCar,
    Gondola,
    Funicular,
    Trolleybus,
    Monorail,
    Extended(u16),
    Unknown,
}

impl RouteType {
    fn from_i32(value: i32) -> Self {
        match value {
            0 => RouteType::Tram,
            1 => RouteType::Subway,
            2 => RouteType::Rail,
            3 => RouteType::Bus,
            4 => RouteType::Ferry,
            5 => RouteType::CableCar,
            6 => RouteType::Gondola,
            7 => RouteType::Funicular,
            11 => RouteType::Trolleybus,
            12 => RouteType::Monorail,
            100..=1702 => RouteType::Extended(value as u16),
            _ => RouteType::Unknown,
        }
    }

    /// Parses a numeric `route_type` value such as `"3"`.
    pub fn parse(value: &str) -> Result<Self, GtfsParseError> {
        let trimmed = value.trim();
        let parsed: i32 = trimmed
            .parse()
            .map_err(|_| GtfsParseError::InvalidRouteType(value.to_string()))?;
        Ok(Self::from_i32(parsed))
    }

    /// The numeric GTFS code, or `None` for unrecognized values.
    pub fn code(&self) -> Option<u16> {
        match self {
            RouteType::Tram => Some(0),
            RouteType::Subway => Some(1),
            RouteType::Rail => Some(2),
            RouteType::Bus => Some(3),
            RouteType::Ferry => Some(4),
            RouteType::CableCar => Some(5),
            RouteType::Gondola => Some(6),
            RouteType::Funicular => Some(7),
            RouteType::Trolleybus => Some(11),
            RouteType::Monorail => Some(12),
            RouteType::Extended(value) => Some(*value),
            RouteType::Unknown => None,
        }
    }
}

impl fmt::Display for RouteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code() {
            Some(code) => write!(f, "{}", code),
            None => f.write_str("unknown"),
        }
    }
}

impl<'de> Deserialize<'de> for RouteType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RouteTypeVisitor;

        impl<'de> Visitor<'de> for RouteTypeVisitor {
            type Value = RouteType;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("a GTFS route_type numeric value")
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<RouteType, E> {
                if value.trim().is_empty() {
                    return Err(E::custom("empty route_type"));
                }
                RouteType::parse(value).map_err(E::custom)
            }

            fn visit_i64<E: de::Error>(self, value: i64) -> Result<RouteType, E> {
                Ok(RouteType::from_i32(value as i32))
            }

            fn visit_u64<E: de::Error>(self, value: u64) -> Result<RouteType, E> {
                Ok(RouteType::from_i32(value as i32))
            }
        }

        deserializer.deserialize_any(RouteTypeVisitor)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[derive(Default)]
pub struct Stop {
    pub stop_id: String,
    pub stop_code: Option<String>,
    pub stop_name: Option<String>,
    pub stop_lat: Option<f64>,
    pub stop_lon: Option<f64>,
    pub parent_station: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Route {
    pub route_id: String,
    pub agency_id: Option<String>,
    pub route_short_name: Option<String>,
    pub route_long_name: Option<String>,
    pub route_type: RouteType,
}

impl Default for Route {
    fn default() -> Self {
        Self {
            route_id: String::new(),
            agency_id: None,
            route_short_name: None,
            route_long_name: None,
            route_type: RouteType::Bus,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[derive(Default)]
pub struct Trip {
    pub route_id: String,
    pub service_id: String,
    pub trip_id: String,
    pub trip_headsign: Option<String>,
    pub shape_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[derive(Default)]
pub struct StopTime {
    pub trip_id: String,
    pub stop_id: String,
    pub stop_sequence: u32,
    pub shape_dist_traveled: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
pub struct Shape {
    pub shape_id: String,
    pub shape_pt_lat: f64,
    pub shape_pt_lon: f64,
    pub shape_pt_sequence: u32,
    pub shape_dist_traveled: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_route_type() {
        assert_eq!(RouteType::parse("3").unwrap(), RouteType::Bus);
        assert_eq!(RouteType::parse(" 0 ").unwrap(), RouteType::Tram);
        assert_eq!(RouteType::parse("700").unwrap(), RouteType::Extended(700));
        assert_eq!(RouteType::parse("42").unwrap(), RouteType::Unknown);
    }

    #[test]
    fn rejects_invalid_route_type() {
        assert!(RouteType::parse("bus").is_err());
        assert!(RouteType::parse("").is_err());
    }

    #[test]
    fn route_type_code_round_trips() {
        for code in [0, 1, 2, 3, 4, 5, 6, 7, 11, 12, 715] {
            let route_type = RouteType::parse(&code.to_string()).unwrap();
            assert_eq!(route_type.code(), Some(code));
        }
        assert_eq!(RouteType::Unknown.code(), None);
    }
}
