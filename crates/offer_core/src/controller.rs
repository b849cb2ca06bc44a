//! Selection controller: owns the working set of one active request.
//!
//! The controller is the only writer of the raw candidates, the radius, the
//! ranked list and the [`SelectionState`]. Polls and radius changes both go
//! through [`recompute`](ControllerShared::recompute), which tags each run
//! with a generation; a run that finishes after a newer one started, or after
//! the request was closed, is thrown away instead of applied.
//!
//! Confirm, cancel and back-out are serialized by an action lock so the
//! payment and cancel round-trips cannot interleave.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backend::{BackendError, OfferBackend};
use crate::config::{ConfigError, EngineConfig, RadiusError, RadiusMeters};
use crate::enrichment::RouteEnricher;
use crate::geo::filter_within_radius;
use crate::offers::{Candidate, CandidateId, EnrichedCandidate, OfferSnapshot, RequestId, TripEndpoints};
use crate::payment::{PaymentError, PaymentHandoff, PaymentHandoffRequest};
use crate::ranking::rank_by_distance;
use crate::routing::RouteProvider;
use crate::selection::{SelectionError, SelectionEvent, SelectionState};
use crate::sync::{OfferSynchronizer, PollOutcome, SnapshotSink, SyncStats};

/// What the backend has told us so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OfferStatus {
    /// No successful poll yet.
    Waiting,
    /// The backend answered with an empty offer list.
    NoOffersYet,
    /// Offers exist but none are inside the radius.
    NoneInRadius,
    Available,
    /// The request was cancelled, completed or left.
    Closed,
}

/// Published view of the controller state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OfferBoard {
    pub status: OfferStatus,
    pub endpoints: Option<TripEndpoints>,
    pub radius: RadiusMeters,
    pub ranked: Vec<EnrichedCandidate>,
    pub selection: SelectionState,
    pub generation: u64,
}

#[derive(Debug, Error)]
pub enum ConfirmError {
    #[error(transparent)]
    Selection(#[from] SelectionError),
    #[error("candidate {0} is no longer offering")]
    CandidateUnavailable(CandidateId),
    #[error(transparent)]
    Payment(#[from] PaymentError),
}

#[derive(Debug, Error)]
pub enum CancelError {
    #[error(transparent)]
    Selection(#[from] SelectionError),
    #[error("backend rejected the cancellation: {0}")]
    Backend(#[from] BackendError),
}

struct WorkingSet {
    endpoints: Option<TripEndpoints>,
    raw: Vec<Candidate>,
    ranked: Vec<EnrichedCandidate>,
    radius: RadiusMeters,
    selection: SelectionState,
    status: OfferStatus,
    generation: u64,
    closed: bool,
}

impl WorkingSet {
    fn board(&self) -> OfferBoard {
        OfferBoard {
            status: self.status,
            endpoints: self.endpoints.clone(),
            radius: self.radius,
            ranked: self.ranked.clone(),
            selection: self.selection.clone(),
            generation: self.generation,
        }
    }

    fn tear_down(&mut self) {
        self.endpoints = None;
        self.raw.clear();
        self.ranked.clear();
        self.status = OfferStatus::Closed;
        self.generation += 1;
        self.closed = true;
    }
}

/// Outcome of one pipeline run.
enum Recompute {
    Applied { candidates: usize, ranked: usize },
    Superseded,
    Closed,
}

struct ControllerShared {
    request_id: RequestId,
    config: EngineConfig,
    backend: Arc<dyn OfferBackend>,
    payment: Arc<dyn PaymentHandoff>,
    enricher: RouteEnricher,
    sync: Arc<OfferSynchronizer>,
    state: Mutex<WorkingSet>,
    board: watch::Sender<OfferBoard>,
    action_lock: tokio::sync::Mutex<()>,
}

impl ControllerShared {
    fn lock_state(&self) -> MutexGuard<'_, WorkingSet> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn publish(&self, ws: &WorkingSet) {
        self.board.send_replace(ws.board());
    }

    /// Single entry point for GeoFilter → RouteEnricher → Ranker.
    async fn recompute(&self) -> Recompute {
        let (generation, origin, radius, raw) = {
            let mut ws = self.lock_state();
            if ws.closed {
                return Recompute::Closed;
            }
            ws.generation += 1;
            (
                ws.generation,
                ws.endpoints.as_ref().map(|trip| trip.origin.location()),
                ws.radius,
                ws.raw.clone(),
            )
        };

        let ranked = match origin {
            Some(origin) => {
                let filtered = filter_within_radius(&raw, origin, radius.as_f64());
                let enriched = self.enricher.enrich(&filtered, origin).await;
                rank_by_distance(enriched)
            }
            None => Vec::new(),
        };

        let mut ws = self.lock_state();
        if ws.closed {
            return Recompute::Closed;
        }
        if ws.generation != generation {
            debug!(request_id = %self.request_id, generation, "recompute superseded");
            return Recompute::Superseded;
        }

        let ranked_count = ranked.len();
        ws.ranked = ranked;
        ws.status = if raw.is_empty() {
            OfferStatus::NoOffersYet
        } else if ranked_count == 0 {
            OfferStatus::NoneInRadius
        } else {
            OfferStatus::Available
        };
        self.publish(&ws);
        debug!(
            request_id = %self.request_id,
            generation,
            radius_m = radius.meters(),
            candidates = raw.len(),
            ranked = ranked_count,
            "offers recomputed"
        );
        Recompute::Applied {
            candidates: raw.len(),
            ranked: ranked_count,
        }
    }

    /// Apply `event` to the selection without publishing. Caller holds the state lock.
    fn apply_event(&self, ws: &mut WorkingSet, event: &SelectionEvent) -> Result<SelectionState, SelectionError> {
        let next = ws.selection.apply(event)?;
        debug!(
            request_id = %self.request_id,
            from = ws.selection.name(),
            to = next.name(),
            "selection transition"
        );
        ws.selection = next.clone();
        Ok(next)
    }

    /// Apply `event` to the selection and publish.
    fn transition(&self, ws: &mut WorkingSet, event: &SelectionEvent) -> Result<SelectionState, SelectionError> {
        let next = self.apply_event(ws, event)?;
        self.publish(ws);
        Ok(next)
    }
}

#[async_trait]
impl SnapshotSink for ControllerShared {
    async fn apply_snapshot(&self, snapshot: OfferSnapshot) -> PollOutcome {
        {
            let mut ws = self.lock_state();
            if ws.closed {
                return PollOutcome::Discarded;
            }
            // Endpoints are fixed by the first poll that carries them.
            if ws.endpoints.is_none() {
                ws.endpoints = snapshot.endpoints;
            }
            ws.raw = snapshot.candidates;
        }

        match self.recompute().await {
            Recompute::Applied { candidates: 0, .. } => PollOutcome::NoOffersYet,
            Recompute::Applied { candidates, ranked } => PollOutcome::OffersAvailable { candidates, ranked },
            Recompute::Superseded => PollOutcome::Superseded,
            Recompute::Closed => PollOutcome::Discarded,
        }
    }
}

/// Drives offer discovery and driver selection for one request.
pub struct SelectionController {
    shared: Arc<ControllerShared>,
    polling: Mutex<Option<JoinHandle<()>>>,
}

impl SelectionController {
    pub fn new(
        request_id: RequestId,
        config: EngineConfig,
        backend: Arc<dyn OfferBackend>,
        routes: Arc<dyn RouteProvider>,
        payment: Arc<dyn PaymentHandoff>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let enricher = RouteEnricher::new(routes, config.routing_timeout(), config.max_concurrent_routes);
        let sync = Arc::new(OfferSynchronizer::new(
            request_id.clone(),
            Arc::clone(&backend),
            config.poll_interval(),
        ));
        let ws = WorkingSet {
            endpoints: None,
            raw: Vec::new(),
            ranked: Vec::new(),
            radius: config.default_radius(),
            selection: SelectionState::Idle,
            status: OfferStatus::Waiting,
            generation: 0,
            closed: false,
        };
        let (board, _) = watch::channel(ws.board());

        Ok(Self {
            shared: Arc::new(ControllerShared {
                request_id,
                config,
                backend,
                payment,
                enricher,
                sync,
                state: Mutex::new(ws),
                board,
                action_lock: tokio::sync::Mutex::new(()),
            }),
            polling: Mutex::new(None),
        })
    }

    pub fn request_id(&self) -> &RequestId {
        &self.shared.request_id
    }

    /// Start the polling scheduler. Calling it again while running is a no-op.
    pub fn start(&self) {
        let mut polling = self.polling.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if polling.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }
        if !self.shared.sync.is_active() {
            return;
        }
        let sink: Arc<dyn SnapshotSink> = Arc::clone(&self.shared) as Arc<dyn SnapshotSink>;
        *polling = Some(self.shared.sync.spawn_polling(sink));
    }

    /// User-triggered poll, subject to the same in-flight guard as the scheduler.
    pub async fn refresh(&self) -> PollOutcome {
        self.shared.sync.poll(self.shared.as_ref()).await
    }

    /// Switch radius and re-rank the already fetched candidates. Once the
    /// request is closed the radius is frozen and the current one is returned.
    pub async fn set_radius(&self, meters: u32) -> Result<RadiusMeters, RadiusError> {
        let radius = self.shared.config.radius(meters)?;
        {
            let mut ws = self.shared.lock_state();
            if ws.closed {
                debug!(request_id = %self.shared.request_id, radius_m = meters, "radius change ignored, request closed");
                return Ok(ws.radius);
            }
            if ws.radius == radius {
                return Ok(radius);
            }
            ws.radius = radius;
            info!(request_id = %self.shared.request_id, radius_m = meters, "radius changed");
        }
        self.shared.recompute().await;
        Ok(radius)
    }

    /// Tap a ranked candidate: highlight it, or open confirmation if it is
    /// already highlighted.
    pub fn tap(&self, candidate_id: &CandidateId) -> Result<SelectionState, SelectionError> {
        let mut ws = self.shared.lock_state();
        if ws.selection.is_cancelled() {
            return Err(SelectionError::RequestClosed);
        }
        if !ws.ranked.iter().any(|c| c.id() == candidate_id) {
            return Err(SelectionError::UnknownCandidate(candidate_id.clone()));
        }
        self.shared
            .transition(&mut ws, &SelectionEvent::Tap(candidate_id.clone()))
    }

    /// Close the confirmation surface without confirming.
    pub fn back_out(&self) -> Result<SelectionState, SelectionError> {
        let Ok(_action) = self.shared.action_lock.try_lock() else {
            return Err(SelectionError::ActionInProgress);
        };
        let mut ws = self.shared.lock_state();
        self.shared.transition(&mut ws, &SelectionEvent::BackOut)
    }

    /// Confirm the pending candidate and hand off to payment. On failure the
    /// selection returns to `Highlighted` so the user can retry.
    pub async fn confirm(&self) -> Result<SelectionState, ConfirmError> {
        let _action = self.shared.action_lock.lock().await;

        let (candidate_id, offer) = {
            let ws = self.shared.lock_state();
            if ws.selection.is_cancelled() {
                return Err(SelectionError::RequestClosed.into());
            }
            let SelectionState::ConfirmPending(id) = &ws.selection else {
                return Err(SelectionError::InvalidTransition {
                    state: ws.selection.name(),
                    event: "confirm",
                }
                .into());
            };
            let offer = ws
                .ranked
                .iter()
                .find(|c| c.id() == id)
                .map(|c| c.candidate.clone());
            (id.clone(), offer)
        };

        let Some(offer) = offer else {
            let mut ws = self.shared.lock_state();
            self.shared.transition(&mut ws, &SelectionEvent::PaymentFailed)?;
            warn!(request_id = %self.shared.request_id, candidate = %candidate_id, "confirmed candidate is no longer offering");
            return Err(ConfirmError::CandidateUnavailable(candidate_id));
        };

        let request = PaymentHandoffRequest {
            request_id: self.shared.request_id.clone(),
            candidate_id: candidate_id.clone(),
            agreed_price: offer.price,
        };

        match self.shared.payment.hand_off(&request).await {
            Ok(()) => {
                self.shared.sync.stop();
                let state = {
                    let mut ws = self.shared.lock_state();
                    let state = self.shared.apply_event(&mut ws, &SelectionEvent::PaymentSucceeded)?;
                    // Completed: in-flight polls and recomputes are dropped from here on.
                    ws.tear_down();
                    self.shared.publish(&ws);
                    state
                };
                info!(request_id = %self.shared.request_id, candidate = %candidate_id, "candidate confirmed");
                Ok(state)
            }
            Err(err) => {
                warn!(request_id = %self.shared.request_id, candidate = %candidate_id, error = %err, "payment hand-off failed");
                let mut ws = self.shared.lock_state();
                self.shared.transition(&mut ws, &SelectionEvent::PaymentFailed)?;
                Err(ConfirmError::Payment(err))
            }
        }
    }

    /// Cancel the whole request. On backend failure nothing changes and the
    /// call can be retried; a second cancel after success is a no-op.
    pub async fn cancel_request(&self) -> Result<SelectionState, CancelError> {
        let _action = self.shared.action_lock.lock().await;

        if self.shared.lock_state().selection.is_cancelled() {
            return Ok(SelectionState::Cancelled);
        }

        if let Err(err) = self.shared.backend.cancel_request(&self.shared.request_id).await {
            warn!(request_id = %self.shared.request_id, error = %err, "request cancellation failed");
            return Err(CancelError::Backend(err));
        }

        self.shared.sync.stop();
        let mut ws = self.shared.lock_state();
        self.shared.apply_event(&mut ws, &SelectionEvent::RequestCancelled)?;
        ws.tear_down();
        self.shared.publish(&ws);
        info!(request_id = %self.shared.request_id, "request cancelled");
        Ok(SelectionState::Cancelled)
    }

    /// Leave the selection step without cancelling (completion or navigation
    /// away): stop polling and drop the working set.
    pub fn shutdown(&self) {
        self.shared.sync.stop();
        let mut ws = self.shared.lock_state();
        if !ws.closed {
            ws.tear_down();
            self.shared.publish(&ws);
            info!(request_id = %self.shared.request_id, "offer session closed");
        }
    }

    pub fn selection(&self) -> SelectionState {
        self.shared.lock_state().selection.clone()
    }

    pub fn radius(&self) -> RadiusMeters {
        self.shared.lock_state().radius
    }

    pub fn ranked(&self) -> Vec<EnrichedCandidate> {
        self.shared.lock_state().ranked.clone()
    }

    pub fn raw_candidates(&self) -> Vec<Candidate> {
        self.shared.lock_state().raw.clone()
    }

    pub fn board(&self) -> OfferBoard {
        self.shared.lock_state().board()
    }

    /// Receiver that sees every published board.
    pub fn subscribe(&self) -> watch::Receiver<OfferBoard> {
        self.shared.board.subscribe()
    }

    pub fn is_polling(&self) -> bool {
        self.shared.sync.is_active()
    }

    pub fn sync_stats(&self) -> SyncStats {
        self.shared.sync.stats()
    }
}

impl Drop for SelectionController {
    fn drop(&mut self) {
        self.shared.sync.stop();
    }
}
