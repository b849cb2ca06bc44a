mod support;

use std::time::Duration;

use offer_core::controller::{CancelError, ConfirmError};
use offer_core::geo::haversine_m;
use offer_core::selection::SelectionError;
use offer_core::sync::PollOutcome;
use offer_core::test_helpers::{
    candidate_at, snapshot, test_origin, ScriptedBackend, ScriptedRouteProvider, TestSession,
};
use offer_core::{CandidateId, OfferStatus, SelectionState};
use support::{outage_session, ranked_ids, test_config};

fn id(raw: &str) -> CandidateId {
    CandidateId::from(raw)
}

#[tokio::test]
async fn outage_scenario_ranks_by_straight_line_distance() {
    let session = outage_session();
    assert_eq!(
        session.controller.refresh().await,
        PollOutcome::OffersAvailable { candidates: 4, ranked: 3 }
    );
    assert_eq!(ranked_ids(&session), vec!["c2000", "c4999", "c5000"]);
    for entry in session.controller.ranked() {
        assert_eq!(
            entry.distance_m,
            Some(haversine_m(test_origin(), entry.candidate.location))
        );
    }
}

#[tokio::test]
async fn shrinking_the_radius_recomputes_without_fetching() {
    let session = outage_session();
    session.controller.refresh().await;
    let route_calls = session.routes.call_count();

    let radius = session.controller.set_radius(1_000).await.expect("allowed radius");
    assert_eq!(radius.meters(), 1_000);
    assert!(session.controller.ranked().is_empty());
    assert_eq!(session.controller.board().status, OfferStatus::NoneInRadius);
    assert_eq!(session.backend.fetch_count(), 1);
    assert_eq!(session.routes.call_count(), route_calls);
    assert_eq!(session.controller.raw_candidates().len(), 4);

    // Growing it again brings everyone back from the same raw set.
    session.controller.set_radius(10_000).await.expect("allowed radius");
    assert_eq!(ranked_ids(&session), vec!["c2000", "c4999", "c5000", "c5001"]);
    assert_eq!(session.backend.fetch_count(), 1);
}

#[tokio::test]
async fn radius_outside_the_option_set_is_rejected() {
    let session = outage_session();
    let err = session.controller.set_radius(7_500).await.unwrap_err();
    assert_eq!(err.requested, 7_500);
    assert_eq!(session.controller.radius().meters(), 5_000);
}

#[tokio::test]
async fn radius_change_keeps_the_selection() {
    let session = outage_session();
    session.controller.refresh().await;
    session.controller.tap(&id("c4999")).expect("tap");

    session.controller.set_radius(1_000).await.expect("allowed radius");
    assert_eq!(session.controller.selection(), SelectionState::Highlighted(id("c4999")));
}

#[tokio::test]
async fn tap_tap_confirm_hands_off_to_payment() {
    let session = outage_session();
    session.controller.refresh().await;

    assert_eq!(
        session.controller.tap(&id("c2000")),
        Ok(SelectionState::Highlighted(id("c2000")))
    );
    assert_eq!(
        session.controller.tap(&id("c4999")),
        Ok(SelectionState::Highlighted(id("c4999")))
    );
    assert_eq!(
        session.controller.tap(&id("c4999")),
        Ok(SelectionState::ConfirmPending(id("c4999")))
    );

    let state = session.controller.confirm().await.expect("confirm");
    assert_eq!(state, SelectionState::Confirmed(id("c4999")));
    assert!(!session.controller.is_polling());

    let requests = session.payment.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].request_id.as_str(), "req-test");
    assert_eq!(requests[0].candidate_id, id("c4999"));
    let expected_price = candidate_at("c4999", test_origin(), 4_999.0).price;
    assert_eq!(requests[0].agreed_price, expected_price);
}

#[tokio::test]
async fn back_out_returns_to_highlighted() {
    let session = outage_session();
    session.controller.refresh().await;
    session.controller.tap(&id("c2000")).expect("tap");
    session.controller.tap(&id("c2000")).expect("tap");

    assert_eq!(
        session.controller.back_out(),
        Ok(SelectionState::Highlighted(id("c2000")))
    );
    assert!(session.payment.requests().is_empty());
    assert!(session.controller.is_polling());
}

#[tokio::test]
async fn failed_payment_reverts_to_highlighted_and_can_be_retried() {
    let session = outage_session();
    session.controller.refresh().await;
    session.controller.tap(&id("c2000")).expect("tap");
    session.controller.tap(&id("c2000")).expect("tap");

    session.payment.set_failing(true);
    let err = session.controller.confirm().await.unwrap_err();
    assert!(matches!(err, ConfirmError::Payment(_)));
    assert_eq!(session.controller.selection(), SelectionState::Highlighted(id("c2000")));
    assert!(session.controller.is_polling());

    session.payment.set_failing(false);
    session.controller.tap(&id("c2000")).expect("tap");
    let state = session.controller.confirm().await.expect("confirm");
    assert_eq!(state, SelectionState::Confirmed(id("c2000")));
    assert_eq!(session.payment.requests().len(), 2);
}

#[tokio::test]
async fn confirming_a_vanished_candidate_reverts() {
    let session = outage_session();
    session.controller.refresh().await;
    session.controller.tap(&id("c2000")).expect("tap");
    session.controller.tap(&id("c2000")).expect("tap");

    let origin = test_origin();
    session
        .backend
        .push_snapshot(snapshot(origin, vec![candidate_at("other", origin, 300.0)]));
    session.controller.refresh().await;

    let err = session.controller.confirm().await.unwrap_err();
    assert!(matches!(err, ConfirmError::CandidateUnavailable(ref gone) if *gone == id("c2000")));
    assert_eq!(session.controller.selection(), SelectionState::Highlighted(id("c2000")));
    assert!(session.payment.requests().is_empty());
}

#[tokio::test]
async fn confirm_requires_a_pending_confirmation() {
    let session = outage_session();
    session.controller.refresh().await;
    session.controller.tap(&id("c2000")).expect("tap");

    let err = session.controller.confirm().await.unwrap_err();
    assert!(matches!(
        err,
        ConfirmError::Selection(SelectionError::InvalidTransition { state: "highlighted", .. })
    ));
}

#[tokio::test]
async fn unknown_or_filtered_candidates_cannot_be_tapped() {
    let session = outage_session();
    session.controller.refresh().await;

    assert_eq!(
        session.controller.tap(&id("nobody")),
        Err(SelectionError::UnknownCandidate(id("nobody")))
    );
    // Outside the 5 km radius.
    assert_eq!(
        session.controller.tap(&id("c5001")),
        Err(SelectionError::UnknownCandidate(id("c5001")))
    );
    assert_eq!(session.controller.selection(), SelectionState::Idle);
}

#[tokio::test]
async fn cancel_is_idempotent() {
    let session = outage_session();
    session.controller.refresh().await;
    session.controller.tap(&id("c2000")).expect("tap");

    assert_eq!(session.controller.cancel_request().await.expect("cancel"), SelectionState::Cancelled);
    assert_eq!(session.controller.cancel_request().await.expect("cancel"), SelectionState::Cancelled);
    assert_eq!(session.backend.cancel_count(), 1);
    assert!(!session.controller.is_polling());
    assert_eq!(session.controller.board().status, OfferStatus::Closed);

    assert_eq!(
        session.controller.tap(&id("c2000")),
        Err(SelectionError::RequestClosed)
    );
}

#[tokio::test]
async fn rejected_cancel_leaves_state_unchanged() {
    let session = outage_session();
    session.controller.refresh().await;
    session.controller.tap(&id("c2000")).expect("tap");
    session.backend.fail_next_cancels(1);

    let err = session.controller.cancel_request().await.unwrap_err();
    assert!(matches!(err, CancelError::Backend(_)));
    assert_eq!(session.controller.selection(), SelectionState::Highlighted(id("c2000")));
    assert!(session.controller.is_polling());
    assert_eq!(session.controller.ranked().len(), 3);

    assert_eq!(session.controller.cancel_request().await.expect("retry"), SelectionState::Cancelled);
    assert_eq!(session.backend.cancel_count(), 2);
}

#[tokio::test]
async fn confirmed_request_can_still_be_cancelled() {
    let session = outage_session();
    session.controller.refresh().await;
    session.controller.tap(&id("c2000")).expect("tap");
    session.controller.tap(&id("c2000")).expect("tap");
    session.controller.confirm().await.expect("confirm");

    assert_eq!(session.controller.cancel_request().await.expect("cancel"), SelectionState::Cancelled);
    assert_eq!(session.backend.cancel_count(), 1);
}

#[tokio::test]
async fn confirmed_payment_closes_the_board() {
    let session = outage_session();
    session.controller.refresh().await;
    session.controller.tap(&id("c2000")).expect("tap");
    session.controller.tap(&id("c2000")).expect("tap");
    session.controller.confirm().await.expect("confirm");

    let board = session.controller.board();
    assert_eq!(board.status, OfferStatus::Closed);
    assert_eq!(board.selection, SelectionState::Confirmed(id("c2000")));
    assert!(board.ranked.is_empty());
    assert!(board.endpoints.is_none());
    assert!(session.controller.raw_candidates().is_empty());
}

#[tokio::test(start_paused = true)]
async fn poll_finishing_after_confirmation_is_discarded() {
    let origin = test_origin();
    let session = TestSession::new(
        test_config(),
        ScriptedBackend::serving(snapshot(origin, vec![candidate_at("a", origin, 800.0)])),
        ScriptedRouteProvider::outage().with_delay(Duration::from_secs(2)),
    );
    session.controller.refresh().await;
    session.controller.tap(&id("a")).expect("tap");
    session.controller.tap(&id("a")).expect("tap");
    session
        .backend
        .push_snapshot(snapshot(origin, vec![candidate_at("b", origin, 600.0)]));

    // The poll fetches at once, then waits on routing while the user confirms.
    let (outcome, confirmed) = tokio::join!(session.controller.refresh(), async {
        tokio::time::sleep(Duration::from_millis(500)).await;
        session.controller.confirm().await
    });

    assert_eq!(confirmed.expect("confirm"), SelectionState::Confirmed(id("a")));
    assert_eq!(outcome, PollOutcome::Discarded);
    assert!(!session.controller.is_polling());
    let board = session.controller.board();
    assert_eq!(board.selection, SelectionState::Confirmed(id("a")));
    assert_eq!(board.status, OfferStatus::Closed);
    assert!(board.ranked.is_empty());
    assert_eq!(session.controller.sync_stats().discarded, 1);
}

#[tokio::test(start_paused = true)]
async fn radius_change_supersedes_a_slow_poll() {
    let origin = test_origin();
    let session = TestSession::new(
        test_config(),
        ScriptedBackend::serving(snapshot(
            origin,
            vec![candidate_at("near", origin, 500.0), candidate_at("far", origin, 3_000.0)],
        )),
        ScriptedRouteProvider::detour(1.2).with_delay(Duration::from_secs(2)),
    );

    let (outcome, radius) = tokio::join!(session.controller.refresh(), async {
        tokio::time::sleep(Duration::from_millis(500)).await;
        session.controller.set_radius(1_000).await
    });

    assert_eq!(radius.expect("allowed radius").meters(), 1_000);
    assert_eq!(outcome, PollOutcome::Superseded);
    assert_eq!(ranked_ids(&session), vec!["near"]);
    assert_eq!(session.controller.board().status, OfferStatus::Available);
    assert_eq!(session.controller.board().radius.meters(), 1_000);
}

#[tokio::test]
async fn cancel_publishes_the_cancelled_selection() {
    let session = outage_session();
    session.controller.refresh().await;
    session.controller.tap(&id("c2000")).expect("tap");
    session.controller.tap(&id("c2000")).expect("tap");
    let mut boards = session.controller.subscribe();
    boards.borrow_and_update();

    session.controller.cancel_request().await.expect("cancel");

    assert!(boards.has_changed().expect("sender alive"));
    let board = boards.borrow_and_update().clone();
    assert_eq!(board.selection, SelectionState::Cancelled);
    assert_eq!(board.status, OfferStatus::Closed);
}

#[tokio::test]
async fn radius_is_frozen_once_the_request_is_closed() {
    let session = outage_session();
    session.controller.refresh().await;
    session.controller.cancel_request().await.expect("cancel");
    let generation = session.controller.board().generation;

    let radius = session.controller.set_radius(1_000).await.expect("allowed radius");
    assert_eq!(radius.meters(), 5_000);
    assert_eq!(session.controller.radius().meters(), 5_000);
    assert_eq!(session.controller.board().generation, generation);

    // Still validated against the option set.
    assert!(session.controller.set_radius(7_500).await.is_err());
}

#[tokio::test]
async fn confirm_after_cancel_reports_the_request_closed() {
    let session = outage_session();
    session.controller.refresh().await;
    session.controller.cancel_request().await.expect("cancel");

    let err = session.controller.confirm().await.unwrap_err();
    assert!(matches!(err, ConfirmError::Selection(SelectionError::RequestClosed)));
    assert_eq!(
        session.controller.tap(&id("c2000")),
        Err(SelectionError::RequestClosed)
    );
}
