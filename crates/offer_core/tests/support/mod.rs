#![allow(dead_code)]

use std::time::Duration;

use offer_core::test_helpers::{candidate_at, snapshot, test_origin, ScriptedBackend, ScriptedRouteProvider, TestSession};
use offer_core::{Candidate, EngineConfig, OfferSnapshot};

/// Distances (m) of the reference scenario candidates from the origin.
pub const SCENARIO_DISTANCES_M: [f64; 4] = [2_000.0, 4_999.0, 5_000.0, 5_001.0];

pub fn scenario_candidates() -> Vec<Candidate> {
    SCENARIO_DISTANCES_M
        .iter()
        .map(|d| candidate_at(&format!("c{}", *d as u32), test_origin(), *d))
        .collect()
}

pub fn scenario_snapshot() -> OfferSnapshot {
    snapshot(test_origin(), scenario_candidates())
}

pub fn test_config() -> EngineConfig {
    EngineConfig::default()
        .with_poll_interval(Duration::from_secs(5))
        .with_routing_timeout(Duration::from_secs(30))
}

/// Session serving the reference scenario with the routing service down.
pub fn outage_session() -> TestSession {
    TestSession::new(
        test_config(),
        ScriptedBackend::serving(scenario_snapshot()),
        ScriptedRouteProvider::outage(),
    )
}

pub fn ranked_ids(session: &TestSession) -> Vec<String> {
    session
        .controller
        .ranked()
        .iter()
        .map(|c| c.id().as_str().to_string())
        .collect()
}
