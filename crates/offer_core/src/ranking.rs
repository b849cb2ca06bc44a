//! Distance ranking of enriched candidates.

use std::cmp::Ordering;

use crate::offers::EnrichedCandidate;

/// Sort key: unknown (or NaN) distances rank as +∞.
fn sort_key(candidate: &EnrichedCandidate) -> f64 {
    match candidate.distance_m {
        Some(d) if !d.is_nan() => d,
        _ => f64::INFINITY,
    }
}

/// Stable ascending sort by `distance_m`. Candidates without a distance keep
/// their relative order at the end of the list.
pub fn rank_by_distance(mut enriched: Vec<EnrichedCandidate>) -> Vec<EnrichedCandidate> {
    // `sort_by` is stable, so ties keep input order.
    enriched.sort_by(|a, b| {
        sort_key(a)
            .partial_cmp(&sort_key(b))
            .unwrap_or(Ordering::Equal)
    });
    enriched
}
