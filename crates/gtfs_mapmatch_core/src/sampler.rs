use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tracing::warn;

use crate::feed::GtfsFeed;
use crate::geometry::{LonLat, ShapeGeometry};
use crate::interpolation::{insert_by_count, insert_by_max_gap, InterpolationError};
use crate::pattern::{representative_trips, PatternGroup, StopPattern, TripSelection};

/// Seed for choosing interior stops when a pattern has more stops than
/// requested points. Reseeded for every pattern.
pub const SAMPLE_SEED: u64 = 42;

pub const DEFAULT_NUM_POINTS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SamplingPolicy {
    /// Aim for exactly this many points.
    Count(usize),
    /// Keep consecutive points at most this far apart, in the units of
    /// `shape_dist_traveled`.
    Distance(f64),
    /// Aim for the stop count times this factor, rounded.
    StopMultiplier(f64),
}

impl Default for SamplingPolicy {
    fn default() -> Self {
        SamplingPolicy::Count(DEFAULT_NUM_POINTS)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SamplePoint {
    pub location: LonLat,
    /// Normalized distance along the shape the point was interpolated at.
    /// `None` for points taken straight from stop coordinates.
    pub fraction: Option<f64>,
}

impl SamplePoint {
    fn at_stop(location: LonLat) -> Self {
        Self {
            location,
            fraction: None,
        }
    }
}

/// Sample points for every distinct stop pattern among the selected trips.
pub fn sample_trip_points(
    feed: &GtfsFeed,
    selection: &TripSelection,
    policy: SamplingPolicy,
) -> BTreeMap<StopPattern, Vec<SamplePoint>> {
    let groups = representative_trips(feed, selection);
    sample_groups(feed, &groups, policy)
}

pub fn sample_groups(
    feed: &GtfsFeed,
    groups: &BTreeMap<StopPattern, PatternGroup>,
    policy: SamplingPolicy,
) -> BTreeMap<StopPattern, Vec<SamplePoint>> {
    let geometries =
        feed.shape_geometries(groups.values().filter_map(|group| group.shape_id.as_deref()));
    groups
        .iter()
        .map(|(pattern, group)| {
            let geometry = group
                .shape_id
                .as_ref()
                .and_then(|shape_id| geometries.get(shape_id));
            (pattern.clone(), sample_pattern(group, geometry, policy))
        })
        .collect()
}

/// Samples one pattern from its representative trip.
///
/// Points are interpolated along `geometry` only when every stop carries a
/// `shape_dist_traveled` and those distances strictly increase. Otherwise the
/// stops themselves are returned, thinned out if there are too many.
pub fn sample_pattern(
    group: &PatternGroup,
    geometry: Option<&ShapeGeometry>,
    policy: SamplingPolicy,
) -> Vec<SamplePoint> {
    let stop_count = group.stops.len();
    match policy {
        SamplingPolicy::Count(n) => sample_by_count(group, geometry, n),
        SamplingPolicy::StopMultiplier(factor) => {
            let n = (stop_count as f64 * factor).round().max(0.0) as usize;
            sample_by_count(group, geometry, n)
        }
        SamplingPolicy::Distance(distance) => {
            let (Some(geometry), Some((fractions, max_distance))) =
                (geometry, normalized_distances(group))
            else {
                return stop_points(group);
            };
            let interpolated = insert_by_max_gap(&fractions, distance / max_distance);
            along_shape(group, geometry, interpolated)
        }
    }
}

fn sample_by_count(
    group: &PatternGroup,
    geometry: Option<&ShapeGeometry>,
    n: usize,
) -> Vec<SamplePoint> {
    let k = group.stops.len();
    if k < n {
        let (Some(geometry), Some((fractions, _))) = (geometry, normalized_distances(group))
        else {
            return stop_points(group);
        };
        return along_shape(group, geometry, insert_by_count(&fractions, n - k));
    }
    if k == n {
        return stop_points(group);
    }

    let stops = &group.stops;
    match n {
        0 => Vec::new(),
        1 => vec![SamplePoint::at_stop(stops[0].location)],
        2 => vec![
            SamplePoint::at_stop(stops[0].location),
            SamplePoint::at_stop(stops[k - 1].location),
        ],
        _ => {
            let mut rng = StdRng::seed_from_u64(SAMPLE_SEED);
            let mut interior: Vec<usize> = rand::seq::index::sample(&mut rng, k - 2, n - 2)
                .into_iter()
                .map(|index| index + 1)
                .collect();
            interior.sort_unstable();

            let mut indices = Vec::with_capacity(n);
            indices.push(0);
            indices.extend(interior);
            indices.push(k - 1);
            indices
                .into_iter()
                .map(|index| SamplePoint::at_stop(stops[index].location))
                .collect()
        }
    }
}

fn stop_points(group: &PatternGroup) -> Vec<SamplePoint> {
    group
        .stops
        .iter()
        .map(|visit| SamplePoint::at_stop(visit.location))
        .collect()
}

fn along_shape(
    group: &PatternGroup,
    geometry: &ShapeGeometry,
    fractions: Result<Vec<f64>, InterpolationError>,
) -> Vec<SamplePoint> {
    match fractions {
        Ok(fractions) => fractions
            .into_iter()
            .map(|fraction| SamplePoint {
                location: geometry.interpolate(fraction),
                fraction: Some(fraction),
            })
            .collect(),
        Err(err) => {
            warn!(pattern = %group.pattern, error = %err, "falling back to stop points");
            stop_points(group)
        }
    }
}

/// Stop distances divided by their maximum, with that maximum. `None` unless
/// there are at least two stops, all distances are present and finite, they
/// strictly increase, and the maximum is positive.
fn normalized_distances(group: &PatternGroup) -> Option<(Vec<f64>, f64)> {
    if group.stops.len() < 2 {
        return None;
    }
    let distances: Vec<f64> = group
        .stops
        .iter()
        .map(|visit| visit.shape_dist_traveled.filter(|value| value.is_finite()))
        .collect::<Option<_>>()?;
    let max_distance = distances.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max_distance <= 0.0 || distances.windows(2).any(|pair| pair[1] <= pair[0]) {
        return None;
    }
    Some((
        distances.iter().map(|value| value / max_distance).collect(),
        max_distance,
    ))
}
