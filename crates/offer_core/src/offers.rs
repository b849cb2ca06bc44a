//! Offer data model shared by every stage of the pipeline.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::geo::Point;

/// Identifier of the customer's ride request on the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a driver offer. Stable across polls.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CandidateId(pub String);

impl CandidateId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CandidateId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for CandidateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A named trip endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub name: String,
    pub lat: f64,
    pub lng: f64,
}

impl Place {
    pub fn location(&self) -> Point {
        Point::new(self.lat, self.lng)
    }
}

/// Pickup and drop-off of the active request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripEndpoints {
    pub origin: Place,
    pub destination: Place,
}

/// A raw driver offer as received from the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: CandidateId,
    pub name: String,
    #[serde(default)]
    pub rating: f64,
    pub location: Point,
    /// Offered fare; may change between polls.
    #[serde(default)]
    pub price: Option<f64>,
}

/// Where an enriched distance came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistanceSource {
    /// Road distance reported by the routing provider.
    Route,
    /// Haversine fallback after a routing failure.
    StraightLine,
    /// No usable coordinates.
    Unknown,
}

/// A candidate with travel distance/duration to the pickup point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedCandidate {
    pub candidate: Candidate,
    pub distance_m: Option<f64>,
    pub duration_secs: Option<f64>,
    pub distance_source: DistanceSource,
}

impl EnrichedCandidate {
    pub fn id(&self) -> &CandidateId {
        &self.candidate.id
    }
}

/// One successful poll of the backend offer list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OfferSnapshot {
    pub endpoints: Option<TripEndpoints>,
    pub candidates: Vec<Candidate>,
}
