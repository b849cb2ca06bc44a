//! Route enrichment: attach road distance/duration to each filtered candidate.
//!
//! One routing query is issued per candidate, at most `max_concurrent` at a
//! time, all sharing a single batch deadline. A query that errors, returns no
//! route, or is still pending at the deadline falls back to the haversine
//! distance with an unknown duration. The batch as a whole never fails.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};

use crate::geo::{haversine_m, Point};
use crate::offers::{Candidate, DistanceSource, EnrichedCandidate};
use crate::routing::{RouteProvider, RouteResult};

#[derive(Clone)]
pub struct RouteEnricher {
    provider: Arc<dyn RouteProvider>,
    batch_timeout: Duration,
    max_concurrent: usize,
}

impl RouteEnricher {
    pub fn new(provider: Arc<dyn RouteProvider>, batch_timeout: Duration, max_concurrent: usize) -> Self {
        Self {
            provider,
            batch_timeout,
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// Enrich `candidates` with travel to `origin`, preserving input order.
    pub async fn enrich(&self, candidates: &[Candidate], origin: Point) -> Vec<EnrichedCandidate> {
        if candidates.is_empty() {
            return Vec::new();
        }
        if !origin.is_valid() {
            return candidates.iter().cloned().map(unknown).collect();
        }

        let deadline = Instant::now() + self.batch_timeout;
        let provider = &self.provider;

        let enriched: Vec<EnrichedCandidate> = stream::iter(candidates.iter().cloned())
            .map(|candidate| async move {
                if !candidate.location.is_valid() {
                    return unknown(candidate);
                }
                let outcome = timeout_at(deadline, provider.route(candidate.location, origin)).await;
                match outcome {
                    Ok(Ok(route)) if is_usable(&route) => routed(candidate, route),
                    Ok(Ok(_)) => {
                        debug!(candidate = %candidate.id, "routing returned an unusable distance");
                        straight_line(candidate, origin)
                    }
                    Ok(Err(err)) => {
                        debug!(candidate = %candidate.id, error = %err, "routing failed, using straight-line distance");
                        straight_line(candidate, origin)
                    }
                    Err(_) => {
                        debug!(candidate = %candidate.id, "routing deadline elapsed, using straight-line distance");
                        straight_line(candidate, origin)
                    }
                }
            })
            .buffered(self.max_concurrent)
            .collect()
            .await;

        let fallbacks = enriched
            .iter()
            .filter(|c| c.distance_source != DistanceSource::Route)
            .count();
        if fallbacks > 0 {
            warn!(
                candidates = enriched.len(),
                fallbacks, "route enrichment degraded to straight-line distance"
            );
        }
        enriched
    }
}

fn is_usable(route: &RouteResult) -> bool {
    route.distance_m.is_finite() && route.distance_m >= 0.0
}

fn routed(candidate: Candidate, route: RouteResult) -> EnrichedCandidate {
    EnrichedCandidate {
        candidate,
        distance_m: Some(route.distance_m),
        duration_secs: route.duration_secs.is_finite().then_some(route.duration_secs),
        distance_source: DistanceSource::Route,
    }
}

fn straight_line(candidate: Candidate, origin: Point) -> EnrichedCandidate {
    let distance_m = haversine_m(origin, candidate.location);
    EnrichedCandidate {
        candidate,
        distance_m: Some(distance_m),
        duration_secs: None,
        distance_source: DistanceSource::StraightLine,
    }
}

fn unknown(candidate: Candidate) -> EnrichedCandidate {
    EnrichedCandidate {
        candidate,
        distance_m: None,
        duration_secs: None,
        distance_source: DistanceSource::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::destination_point;
    use crate::routing::RoutingError;
    use async_trait::async_trait;

    struct Fixed(Result<RouteResult, ()>);

    #[async_trait]
    impl RouteProvider for Fixed {
        async fn route(&self, _from: Point, _to: Point) -> Result<RouteResult, RoutingError> {
            self.0.map_err(|_| RoutingError::NoRoute)
        }
    }

    fn candidate(id: &str, location: Point) -> Candidate {
        Candidate {
            id: id.into(),
            name: id.to_string(),
            rating: 4.0,
            location,
            price: Some(120.0),
        }
    }

    #[tokio::test]
    async fn successful_routes_carry_duration() {
        let origin = Point::new(13.7, 100.5);
        let enricher = RouteEnricher::new(
            Arc::new(Fixed(Ok(RouteResult {
                distance_m: 2_500.0,
                duration_secs: 300.0,
            }))),
            Duration::from_secs(30),
            4,
        );
        let out = enricher
            .enrich(&[candidate("a", destination_point(origin, 0.0, 2_000.0))], origin)
            .await;
        assert_eq!(out[0].distance_m, Some(2_500.0));
        assert_eq!(out[0].duration_secs, Some(300.0));
        assert_eq!(out[0].distance_source, DistanceSource::Route);
    }

    #[tokio::test]
    async fn failures_fall_back_to_haversine() {
        let origin = Point::new(13.7, 100.5);
        let location = destination_point(origin, 0.0, 2_000.0);
        let enricher = RouteEnricher::new(Arc::new(Fixed(Err(()))), Duration::from_secs(30), 4);
        let out = enricher.enrich(&[candidate("a", location)], origin).await;
        assert_eq!(out[0].distance_m, Some(haversine_m(origin, location)));
        assert_eq!(out[0].duration_secs, None);
        assert_eq!(out[0].distance_source, DistanceSource::StraightLine);
    }

    #[tokio::test]
    async fn invalid_origin_marks_everything_unknown() {
        let enricher = RouteEnricher::new(Arc::new(Fixed(Err(()))), Duration::from_secs(30), 4);
        let out = enricher
            .enrich(&[candidate("a", Point::new(13.7, 100.5))], Point::new(f64::NAN, 0.0))
            .await;
        assert_eq!(out[0].distance_m, None);
        assert_eq!(out[0].distance_source, DistanceSource::Unknown);
    }
}
