use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;

use gtfs_mapmatch_model::{RouteType, StopTime, Trip};
use tracing::debug;

use crate::feed::GtfsFeed;
use crate::geometry::LonLat;

pub const STOP_PATTERN_SEPARATOR: &str = "-";

/// Route types matched when the caller does not name any: tram, bus and
/// cable tram, the modes that run on streets.
pub const DEFAULT_ROUTE_TYPES: [RouteType; 3] =
    [RouteType::Tram, RouteType::Bus, RouteType::CableCar];

/// The ordered stop ids a trip visits. Trips with equal patterns are sampled
/// and matched once.
///
/// Patterns order by their joined key, e.g. `S1-S2-S3`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StopPattern {
    key: String,
    stop_ids: Vec<String>,
}

impl StopPattern {
    pub fn new(stop_ids: Vec<String>) -> Self {
        Self {
            key: stop_ids.join(STOP_PATTERN_SEPARATOR),
            stop_ids,
        }
    }

    fn from_stop_times(stop_times: &[&StopTime]) -> Self {
        Self::new(
            stop_times
                .iter()
                .map(|stop_time| stop_time.stop_id.clone())
                .collect(),
        )
    }

    /// Number of stops, including stops without coordinates.
    pub(crate) fn len(&self) -> usize {
        self.stop_ids.len()
    }
}

impl fmt::Display for StopPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

/// Which trips take part in sampling or matching.
///
/// Explicit trip ids win over route types. With neither set every trip is
/// selected.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TripSelection {
    pub route_types: Option<Vec<RouteType>>,
    pub trip_ids: Option<Vec<String>>,
}

impl TripSelection {
    pub fn all_trips() -> Self {
        Self::default()
    }

    pub fn default_route_types() -> Self {
        Self::with_route_types(DEFAULT_ROUTE_TYPES.to_vec())
    }

    pub fn with_route_types(route_types: Vec<RouteType>) -> Self {
        Self {
            route_types: Some(route_types),
            trip_ids: None,
        }
    }

    pub fn with_trip_ids(trip_ids: Vec<String>) -> Self {
        Self {
            route_types: None,
            trip_ids: Some(trip_ids),
        }
    }

    /// Selected trip ids in `trips.txt` order. Unknown ids are ignored.
    pub fn select_trip_ids<'a>(&self, feed: &'a GtfsFeed) -> Vec<&'a str> {
        let mut seen = HashSet::new();
        let mut keep = |trip: &&'a Trip| seen.insert(trip.trip_id.as_str());

        if let Some(trip_ids) = &self.trip_ids {
            let wanted: HashSet<&str> = trip_ids.iter().map(String::as_str).collect();
            return feed
                .trips
                .rows
                .iter()
                .filter(|trip| wanted.contains(trip.trip_id.as_str()))
                .filter(|trip| keep(trip))
                .map(|trip| trip.trip_id.as_str())
                .collect();
        }

        let route_types: Option<HashMap<&str, RouteType>> = self.route_types.as_ref().map(|_| {
            feed.routes
                .rows
                .iter()
                .map(|route| (route.route_id.as_str(), route.route_type))
                .collect()
        });
        feed.trips
            .rows
            .iter()
            .filter(|trip| match (&self.route_types, &route_types) {
                (Some(wanted), Some(by_route)) => by_route
                    .get(trip.route_id.as_str())
                    .map(|route_type| wanted.contains(route_type))
                    .unwrap_or(false),
                _ => true,
            })
            .filter(|trip| keep(trip))
            .map(|trip| trip.trip_id.as_str())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StopVisit {
    pub stop_id: String,
    pub location: LonLat,
    pub shape_dist_traveled: Option<f64>,
}

/// All selected trips sharing one stop pattern, and the trip whose stops and
/// shape stand in for them.
#[derive(Debug, Clone)]
pub struct PatternGroup {
    pub pattern: StopPattern,
    pub representative_trip_id: String,
    pub shape_id: Option<String>,
    /// Stops of the representative trip in visiting order. Stops without
    /// coordinates are left out.
    pub stops: Vec<StopVisit>,
    pub trip_ids: Vec<String>,
    /// Distinct shape ids referenced by the group's trips, sorted.
    pub shape_ids: Vec<String>,
}

impl PatternGroup {
    /// False when trips of this pattern disagree on their shape, in which
    /// case the representative's geometry is used for all of them.
    pub fn has_consistent_shape(&self) -> bool {
        self.shape_ids.len() <= 1
    }
}

/// Stop times of every trip, ordered by `stop_sequence`.
pub fn stop_times_by_trip(feed: &GtfsFeed) -> HashMap<&str, Vec<&StopTime>> {
    let mut by_trip: HashMap<&str, Vec<&StopTime>> = HashMap::new();
    for stop_time in &feed.stop_times.rows {
        by_trip
            .entry(stop_time.trip_id.as_str())
            .or_default()
            .push(stop_time);
    }
    for stop_times in by_trip.values_mut() {
        stop_times.sort_by_key(|stop_time| stop_time.stop_sequence);
    }
    by_trip
}

/// The stop pattern of every trip that has stop times.
pub fn stop_patterns(feed: &GtfsFeed) -> HashMap<String, StopPattern> {
    stop_times_by_trip(feed)
        .into_iter()
        .map(|(trip_id, stop_times)| {
            (trip_id.to_string(), StopPattern::from_stop_times(&stop_times))
        })
        .collect()
}

/// Groups the selected trips by stop pattern and picks one representative per
/// group: the trip with the smallest shape id, trips without a shape last,
/// ties broken by trip id.
pub fn representative_trips(
    feed: &GtfsFeed,
    selection: &TripSelection,
) -> BTreeMap<StopPattern, PatternGroup> {
    let stop_times_by_trip = stop_times_by_trip(feed);
    let trips_by_id: HashMap<&str, &Trip> = feed
        .trips
        .rows
        .iter()
        .map(|trip| (trip.trip_id.as_str(), trip))
        .collect();

    let mut members: BTreeMap<StopPattern, Vec<&Trip>> = BTreeMap::new();
    for trip_id in selection.select_trip_ids(feed) {
        let (Some(trip), Some(stop_times)) =
            (trips_by_id.get(trip_id), stop_times_by_trip.get(trip_id))
        else {
            debug!(trip_id, "trip has no stop times");
            continue;
        };
        members
            .entry(StopPattern::from_stop_times(stop_times))
            .or_default()
            .push(*trip);
    }

    let stops_by_id: HashMap<&str, LonLat> = feed
        .stops
        .rows
        .iter()
        .filter_map(|stop| match (stop.stop_lon, stop.stop_lat) {
            (Some(lon), Some(lat)) => Some((stop.stop_id.as_str(), LonLat::new(lon, lat))),
            _ => None,
        })
        .collect();

    let mut groups = BTreeMap::new();
    for (pattern, trips) in members {
        let Some(representative) = trips
            .iter()
            .min_by(|a, b| representative_rank(a).cmp(&representative_rank(b)))
        else {
            continue;
        };

        let stops = stop_times_by_trip
            .get(representative.trip_id.as_str())
            .map(|stop_times| stop_visits(stop_times, &stops_by_id))
            .unwrap_or_default();
        if stops.len() < pattern.len() {
            debug!(
                pattern = %pattern,
                located = stops.len(),
                stops = pattern.len(),
                "sampling pattern without its unlocated stops"
            );
        }

        let shape_ids: Vec<String> = trips
            .iter()
            .filter_map(|trip| trip.shape_id.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if shape_ids.len() > 1 {
            debug!(
                pattern = %pattern,
                shape_ids = ?shape_ids,
                "trips sharing a stop pattern use different shapes"
            );
        }

        let group = PatternGroup {
            representative_trip_id: representative.trip_id.clone(),
            shape_id: representative.shape_id.clone(),
            stops,
            trip_ids: trips.iter().map(|trip| trip.trip_id.clone()).collect(),
            shape_ids,
            pattern: pattern.clone(),
        };
        groups.insert(pattern, group);
    }
    groups
}

fn representative_rank(trip: &Trip) -> (bool, Option<&str>, &str) {
    (
        trip.shape_id.is_none(),
        trip.shape_id.as_deref(),
        trip.trip_id.as_str(),
    )
}

fn stop_visits(stop_times: &[&StopTime], stops_by_id: &HashMap<&str, LonLat>) -> Vec<StopVisit> {
    stop_times
        .iter()
        .filter_map(|stop_time| {
            let Some(location) = stops_by_id.get(stop_time.stop_id.as_str()) else {
                debug!(
                    trip_id = %stop_time.trip_id,
                    stop_id = %stop_time.stop_id,
                    "stop has no coordinates"
                );
                return None;
            };
            Some(StopVisit {
                stop_id: stop_time.stop_id.clone(),
                location: *location,
                shape_dist_traveled: stop_time.shape_dist_traveled,
            })
        })
        .collect()
}
