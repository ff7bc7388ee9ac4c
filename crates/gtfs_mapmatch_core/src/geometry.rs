use serde::{Deserialize, Serialize};

const EARTH_RADIUS_METERS: f64 = 6_371_010.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LonLat {
    pub lon: f64,
    pub lat: f64,
}

impl LonLat {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }
}

/// A shape polyline parameterized by cumulative great-circle length.
#[derive(Debug, Clone)]
pub struct ShapeGeometry {
    points: Vec<ShapeVertex>,
}

#[derive(Debug, Clone, Copy)]
struct ShapeVertex {
    location: LonLat,
    distance: f64,
}

impl ShapeGeometry {
    /// Returns `None` for fewer than two vertices.
    pub fn from_points(points: impl IntoIterator<Item = LonLat>) -> Option<Self> {
        let mut vertices: Vec<ShapeVertex> = Vec::new();
        let mut distance = 0.0_f64;
        for location in points {
            if let Some(prev) = vertices.last() {
                distance += haversine_meters(prev.location, location).max(0.0);
            }
            vertices.push(ShapeVertex { location, distance });
        }
        if vertices.len() < 2 {
            return None;
        }
        Some(Self { points: vertices })
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn total_length_meters(&self) -> f64 {
        self.points.last().map(|point| point.distance).unwrap_or(0.0)
    }

    pub fn vertices(&self) -> impl Iterator<Item = LonLat> + '_ {
        self.points.iter().map(|point| point.location)
    }

    /// The point at `fraction` of the total length, clamped to `[0, 1]`.
    pub fn interpolate(&self, fraction: f64) -> LonLat {
        let first = self.points[0];
        let total = self.total_length_meters();
        if total <= 0.0 || !fraction.is_finite() {
            return first.location;
        }
        let target = fraction.clamp(0.0, 1.0) * total;

        // First vertex at or beyond the target distance.
        let next_index = self
            .points
            .partition_point(|point| point.distance < target)
            .max(1)
            .min(self.points.len() - 1);
        let prev = self.points[next_index - 1];
        let next = self.points[next_index];
        let span = next.distance - prev.distance;
        if span <= 0.0 {
            return next.location;
        }
        let t = ((target - prev.distance) / span).clamp(0.0, 1.0);
        LonLat {
            lon: prev.location.lon + t * (next.location.lon - prev.location.lon),
            lat: prev.location.lat + t * (next.location.lat - prev.location.lat),
        }
    }
}

pub fn haversine_meters(a: LonLat, b: LonLat) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlat = lat2 - lat1;
    let dlon = (b.lon - a.lon).to_radians();
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_METERS * h.sqrt().min(1.0).asin()
}
