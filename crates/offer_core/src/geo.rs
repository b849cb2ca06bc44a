//! Geographic primitives: points, haversine distance, and radius filtering.
//!
//! This module provides:
//!
//! - **Point**: lat/lng pair in degrees with range validation
//! - **Distance calculations**: Haversine great-circle distance in metres
//! - **Radius filter**: keep the candidates within a straight-line radius of an origin
//!
//! The Earth radius is fixed at the mean value (6,371,000 m) so distances are
//! reproducible across providers and tests.

use serde::{Deserialize, Serialize};

use crate::offers::Candidate;

/// Mean Earth radius in metres.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Slack applied to the inclusive radius boundary to absorb floating-point error.
const BOUNDARY_TOLERANCE_M: f64 = 1e-6;

/// A WGS84 coordinate in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub lat: f64,
    pub lng: f64,
}

impl Point {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// True when both coordinates are finite and inside the WGS84 ranges.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

/// Great-circle distance between two points in metres.
pub fn haversine_m(a: Point, b: Point) -> f64 {
    let (lat1, lon1) = (a.lat.to_radians(), a.lng.to_radians());
    let (lat2, lon2) = (b.lat.to_radians(), b.lng.to_radians());
    let sin_dlat = ((lat2 - lat1) * 0.5).sin();
    let sin_dlon = ((lon2 - lon1) * 0.5).sin();
    let h = sin_dlat * sin_dlat + lat1.cos() * lat2.cos() * sin_dlon * sin_dlon;
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_M * c
}

/// Keep the candidates whose straight-line distance from `origin` is at most
/// `radius_m` (inclusive). Input order is preserved.
///
/// An invalid origin yields an empty result; candidates with invalid
/// locations are dropped.
pub fn filter_within_radius(candidates: &[Candidate], origin: Point, radius_m: f64) -> Vec<Candidate> {
    if !origin.is_valid() || !radius_m.is_finite() || radius_m < 0.0 {
        return Vec::new();
    }

    candidates
        .iter()
        .filter(|candidate| {
            candidate.location.is_valid()
                && haversine_m(origin, candidate.location) <= radius_m + BOUNDARY_TOLERANCE_M
        })
        .cloned()
        .collect()
}

/// Point reached by travelling `distance_m` from `origin` along the given
/// initial bearing (degrees clockwise from north).
pub fn destination_point(origin: Point, bearing_deg: f64, distance_m: f64) -> Point {
    let angular = distance_m / EARTH_RADIUS_M;
    let bearing = bearing_deg.to_radians();
    let lat1 = origin.lat.to_radians();
    let lon1 = origin.lng.to_radians();

    let lat2 = (lat1.sin() * angular.cos() + lat1.cos() * angular.sin() * bearing.cos()).asin();
    let lon2 = lon1
        + (bearing.sin() * angular.sin() * lat1.cos()).atan2(angular.cos() - lat1.sin() * lat2.sin());

    Point::new(lat2.to_degrees(), lon2.to_degrees())
}
