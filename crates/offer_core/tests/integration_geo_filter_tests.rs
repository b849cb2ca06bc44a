use offer_core::geo::{filter_within_radius, haversine_m, Point};
use offer_core::test_helpers::{candidate_at, test_origin};

#[test]
fn scenario_keeps_candidates_up_to_the_radius_inclusive() {
    let origin = test_origin();
    let candidates: Vec<_> = [2_000.0, 4_999.0, 5_000.0, 5_001.0]
        .iter()
        .map(|d| candidate_at(&format!("c{}", *d as u32), origin, *d))
        .collect();

    let kept = filter_within_radius(&candidates, origin, 5_000.0);
    let ids: Vec<&str> = kept.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["c2000", "c4999", "c5000"]);
}

#[test]
fn boundary_is_inclusive_for_every_allowed_radius() {
    let origin = test_origin();
    for radius in [1_000.0, 5_000.0, 10_000.0, 20_000.0, 30_000.0] {
        let at_radius = candidate_at("edge", origin, radius);
        let beyond = candidate_at("beyond", origin, radius + 0.01);
        let kept = filter_within_radius(&[at_radius, beyond], origin, radius);
        assert_eq!(kept.len(), 1, "radius {radius}");
        assert_eq!(kept[0].id.as_str(), "edge");
    }
}

#[test]
fn helper_places_candidates_at_the_requested_distance() {
    let origin = test_origin();
    let candidate = candidate_at("a", origin, 4_999.0);
    assert!((haversine_m(origin, candidate.location) - 4_999.0).abs() < 1e-6);
}

#[test]
fn filtering_does_not_touch_the_input() {
    let origin = test_origin();
    let candidates = vec![
        candidate_at("near", origin, 100.0),
        candidate_at("far", origin, 50_000.0),
    ];
    let before = candidates.clone();
    let kept = filter_within_radius(&candidates, origin, 1_000.0);
    assert_eq!(kept.len(), 1);
    assert_eq!(candidates, before);
}

#[test]
fn out_of_range_origin_yields_nothing() {
    let candidates = vec![candidate_at("a", test_origin(), 10.0)];
    assert!(filter_within_radius(&candidates, Point::new(13.7, 181.0), 5_000.0).is_empty());
}
