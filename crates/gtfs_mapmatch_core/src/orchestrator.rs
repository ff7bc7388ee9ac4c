use std::collections::{BTreeMap, HashMap};

use tracing::{debug, info, warn};

use crate::feed::GtfsFeed;
use crate::geometry::LonLat;
use crate::matcher::Matcher;
use crate::pattern::{representative_trips, stop_patterns, StopPattern, TripSelection};
use crate::progress::ProgressHandler;
use crate::sampler::{sample_groups, SamplingPolicy};

#[derive(Debug, Clone, PartialEq)]
pub struct MatchOptions {
    pub selection: TripSelection,
    pub policy: SamplingPolicy,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            selection: TripSelection::default_route_types(),
            policy: SamplingPolicy::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MatchOutcome {
    /// Copy of the input feed with the matched shapes replaced.
    pub feed: GtfsFeed,
    /// Non-empty matcher results by pattern.
    pub matched: BTreeMap<StopPattern, Vec<LonLat>>,
    /// Patterns whose matcher call returned an error.
    pub failed: Vec<StopPattern>,
    /// Shape ids that received a matched geometry, in `trips.txt` order.
    pub replaced_shape_ids: Vec<String>,
}

/// Number of matcher requests [`match_feed`] would issue for `selection`:
/// one per distinct stop pattern.
pub fn get_num_match_calls(feed: &GtfsFeed, selection: &TripSelection) -> usize {
    representative_trips(feed, selection).len()
}

/// Samples every stop pattern of the selected trips, matches each pattern
/// once, and returns a new feed in which every shape used by a matched
/// pattern is replaced by the matched path.
///
/// A failed or empty match leaves that pattern's shapes untouched and does
/// not stop the remaining patterns.
pub fn match_feed(
    feed: &GtfsFeed,
    matcher: &dyn Matcher,
    options: &MatchOptions,
    progress: &dyn ProgressHandler,
) -> MatchOutcome {
    let groups = representative_trips(feed, &options.selection);
    let samples = sample_groups(feed, &groups, options.policy);
    info!(
        patterns = samples.len(),
        service = %matcher.service(),
        "map matching stop patterns"
    );
    progress.set_total_patterns(samples.len());

    let mut matched = BTreeMap::new();
    let mut failed = Vec::new();
    for (pattern, points) in samples {
        let key = pattern.to_string();
        progress.on_start_pattern(&key);
        let locations: Vec<LonLat> = points.iter().map(|point| point.location).collect();
        match matcher.match_points(&locations) {
            Ok(path) if !path.is_empty() => {
                debug!(pattern = %key, points = path.len(), "matched");
                matched.insert(pattern, path);
                progress.on_finish_pattern(&key, true);
            }
            Ok(_) => {
                info!(pattern = %key, "matcher returned no path, keeping original shape");
                progress.on_finish_pattern(&key, false);
            }
            Err(err) => {
                warn!(
                    pattern = %key,
                    error = %err,
                    "map matching failed, keeping original shape"
                );
                failed.push(pattern);
                progress.on_finish_pattern(&key, false);
            }
        }
    }

    let paths_by_shape = assign_paths_to_shapes(feed, &matched);
    let replaced_shape_ids: Vec<String> = paths_by_shape
        .iter()
        .map(|(shape_id, _)| shape_id.to_string())
        .collect();
    info!(
        matched = matched.len(),
        failed = failed.len(),
        shapes = replaced_shape_ids.len(),
        "replacing matched shapes"
    );

    let mut new_feed = feed.clone();
    new_feed.replace_shapes(&paths_by_shape);

    MatchOutcome {
        feed: new_feed,
        matched,
        failed,
        replaced_shape_ids,
    }
}

/// Pairs each shape id with the matched path of its trips' pattern. Every
/// trip of the feed counts, selected or not. A shape whose trips fall in two
/// matched patterns keeps the first one in `trips.txt` order.
fn assign_paths_to_shapes<'a>(
    feed: &'a GtfsFeed,
    matched: &'a BTreeMap<StopPattern, Vec<LonLat>>,
) -> Vec<(&'a str, &'a [LonLat])> {
    if matched.is_empty() {
        return Vec::new();
    }
    let patterns = stop_patterns(feed);
    let mut assigned: HashMap<&str, &StopPattern> = HashMap::new();
    let mut paths = Vec::new();
    for trip in &feed.trips.rows {
        let Some(shape_id) = trip.shape_id.as_deref() else {
            continue;
        };
        let Some((pattern, path)) = patterns
            .get(&trip.trip_id)
            .and_then(|pattern| matched.get_key_value(pattern))
        else {
            continue;
        };
        match assigned.get(shape_id) {
            None => {
                assigned.insert(shape_id, pattern);
                paths.push((shape_id, path.as_slice()));
            }
            Some(existing) if *existing != pattern => {
                warn!(
                    shape_id,
                    kept = %existing,
                    ignored = %pattern,
                    "shape is used by trips of two matched stop patterns"
                );
            }
            Some(_) => {}
        }
    }
    paths
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::MatchError;
    use crate::progress::NoOpProgressHandler;
    use crate::MatchService;
    use crate::CsvTable;
    use gtfs_mapmatch_model::{Route, Shape, Stop, StopTime, Trip};

    struct EchoMatcher;

    impl Matcher for EchoMatcher {
        fn service(&self) -> MatchService {
            MatchService::Osrm
        }

        fn match_points(&self, points: &[LonLat]) -> Result<Vec<LonLat>, MatchError> {
            Ok(points.iter().take(2).copied().collect())
        }
    }

    fn feed() -> GtfsFeed {
        let stop = |id: &str, lon: f64| Stop {
            stop_id: id.into(),
            stop_lat: Some(0.0),
            stop_lon: Some(lon),
            ..Default::default()
        };
        let trip = |id: &str, shape: &str| Trip {
            route_id: "R".into(),
            trip_id: id.into(),
            shape_id: Some(shape.into()),
            ..Default::default()
        };
        let stop_time = |trip_id: &str, stop_id: &str, sequence: u32| StopTime {
            trip_id: trip_id.into(),
            stop_id: stop_id.into(),
            stop_sequence: sequence,
            ..Default::default()
        };
        let shape = |id: &str, sequence: u32| Shape {
            shape_id: id.into(),
            shape_pt_lon: sequence as f64,
            shape_pt_sequence: sequence,
            ..Default::default()
        };
        GtfsFeed {
            stops: CsvTable::from_rows(
                Vec::new(),
                vec![stop("A", 0.0), stop("B", 1.0), stop("C", 2.0)],
            ),
            routes: CsvTable::from_rows(
                Vec::new(),
                vec![Route {
                    route_id: "R".into(),
                    ..Default::default()
                }],
            ),
            trips: CsvTable::from_rows(
                Vec::new(),
                vec![trip("T1", "S1"), trip("T2", "S2"), trip("T3", "S1")],
            ),
            stop_times: CsvTable::from_rows(
                Vec::new(),
                vec![
                    stop_time("T1", "A", 1),
                    stop_time("T1", "B", 2),
                    stop_time("T1", "C", 3),
                    stop_time("T2", "A", 1),
                    stop_time("T2", "B", 2),
                    stop_time("T2", "C", 3),
                    stop_time("T3", "C", 1),
                    stop_time("T3", "A", 2),
                ],
            ),
            shapes: Some(CsvTable::from_rows(
                Vec::new(),
                (1..=3)
                    .map(|i| shape("S1", i))
                    .chain((1..=4).map(|i| shape("S2", i)))
                    .collect(),
            )),
            ..Default::default()
        }
    }

    #[test]
    fn counts_one_call_per_pattern() {
        assert_eq!(get_num_match_calls(&feed(), &TripSelection::all_trips()), 2);
        let selection = TripSelection::with_trip_ids(vec!["T1".into(), "T2".into()]);
        assert_eq!(get_num_match_calls(&feed(), &selection), 1);
    }

    #[test]
    fn replaces_every_shape_of_a_matched_pattern() {
        let input = feed();
        let options = MatchOptions {
            selection: TripSelection::with_trip_ids(vec!["T2".into()]),
            policy: SamplingPolicy::Count(3),
        };
        let outcome = match_feed(&input, &EchoMatcher, &options, &NoOpProgressHandler);

        assert_eq!(outcome.matched.len(), 1);
        assert_eq!(outcome.replaced_shape_ids, vec!["S1", "S2"]);
        assert_eq!(outcome.feed.replaced_shape_ids.len(), 2);
        assert!(input.replaced_shape_ids.is_empty());
        let rows = &outcome.feed.shapes.as_ref().unwrap().rows;
        assert_eq!(rows.len(), 4);
        let sequences: Vec<u32> = rows.iter().map(|row| row.shape_pt_sequence).collect();
        assert_eq!(sequences, vec![0, 1, 0, 1]);
        assert!(rows.iter().all(|row| row.shape_dist_traveled.is_none()));
        assert_eq!(input.shapes.as_ref().unwrap().rows.len(), 7);
    }

    #[test]
    fn conflicting_shape_keeps_first_pattern() {
        let outcome = match_feed(
            &feed(),
            &EchoMatcher,
            &MatchOptions {
                selection: TripSelection::all_trips(),
                policy: SamplingPolicy::Count(3),
            },
            &NoOpProgressHandler,
        );
        assert_eq!(outcome.matched.len(), 2);
        assert_eq!(outcome.replaced_shape_ids, vec!["S1", "S2"]);
        let s1: Vec<f64> = outcome
            .feed
            .shapes
            .unwrap()
            .rows
            .iter()
            .filter(|row| row.shape_id == "S1")
            .map(|row| row.shape_pt_lon)
            .collect();
        assert_eq!(s1, vec![0.0, 1.0]);
    }

    #[test]
    fn nothing_matched_keeps_shapes() {
        struct EmptyMatcher;
        impl Matcher for EmptyMatcher {
            fn service(&self) -> MatchService {
                MatchService::Google
            }
            fn match_points(&self, _points: &[LonLat]) -> Result<Vec<LonLat>, MatchError> {
                Ok(Vec::new())
            }
        }

        let input = feed();
        let options = MatchOptions::default();
        let outcome = match_feed(&input, &EmptyMatcher, &options, &NoOpProgressHandler);
        assert!(outcome.matched.is_empty());
        assert!(outcome.failed.is_empty());
        assert!(outcome.replaced_shape_ids.is_empty());
        assert!(outcome.feed.replaced_shape_ids.is_empty());
        assert_eq!(outcome.feed.shapes.unwrap().rows, input.shapes.unwrap().rows);
    }
}
