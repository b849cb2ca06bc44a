//! Offer discovery, geofiltering and ranking for the "choose a driver" step
//! of a ride request.
//!
//! Pipeline: [`sync`] polls the backend → [`geo`] filters by radius →
//! [`enrichment`] attaches route distances → [`ranking`] orders by distance →
//! [`controller`] owns the result and drives selection, payment hand-off and
//! cancellation.

pub mod backend;
pub mod config;
pub mod controller;
pub mod enrichment;
pub mod geo;
pub mod offers;
pub mod payment;
pub mod ranking;
pub mod routing;
pub mod selection;
pub mod sync;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub use config::{EngineConfig, RadiusMeters};
pub use controller::{OfferBoard, OfferStatus, SelectionController};
pub use offers::{Candidate, CandidateId, EnrichedCandidate, OfferSnapshot, RequestId, TripEndpoints};
pub use selection::SelectionState;
