//! Test helpers: scripted collaborators and fixture builders.
//!
//! The doubles record every call and the peak number of overlapping calls so
//! tests can assert on network side-effects and concurrency.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::backend::{BackendError, OfferBackend};
use crate::config::EngineConfig;
use crate::controller::SelectionController;
use crate::geo::{destination_point, haversine_m, Point};
use crate::offers::{Candidate, OfferSnapshot, Place, RequestId, TripEndpoints};
use crate::payment::{PaymentError, PaymentHandoff, PaymentHandoffRequest};
use crate::routing::{RouteProvider, RouteResult, RoutingError};

/// Origin used by the reference scenarios (central Bangkok).
pub fn test_origin() -> Point {
    Point::new(13.7000, 100.5000)
}

/// A candidate placed `distance_m` due north of `origin`.
pub fn candidate_at(id: &str, origin: Point, distance_m: f64) -> Candidate {
    Candidate {
        id: id.into(),
        name: format!("Driver {id}"),
        rating: 4.5,
        location: destination_point(origin, 0.0, distance_m),
        price: Some(100.0 + distance_m / 100.0),
    }
}

pub fn trip_from(origin: Point) -> TripEndpoints {
    TripEndpoints {
        origin: Place {
            name: "Pickup".to_string(),
            lat: origin.lat,
            lng: origin.lng,
        },
        destination: Place {
            name: "Drop-off".to_string(),
            lat: origin.lat + 0.05,
            lng: origin.lng + 0.05,
        },
    }
}

pub fn snapshot(origin: Point, candidates: Vec<Candidate>) -> OfferSnapshot {
    OfferSnapshot {
        endpoints: Some(trip_from(origin)),
        candidates,
    }
}

/// Tracks the current and peak number of overlapping calls.
#[derive(Debug, Default)]
struct Concurrency {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl Concurrency {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

/// [`OfferBackend`] that serves queued responses, then repeats the last
/// successful snapshot.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    responses: Mutex<VecDeque<Result<OfferSnapshot, BackendError>>>,
    last: Mutex<OfferSnapshot>,
    delay: Mutex<Duration>,
    fetches: AtomicUsize,
    concurrency: Concurrency,
    cancels: AtomicUsize,
    failing_cancels: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serving(snapshot: OfferSnapshot) -> Self {
        let backend = Self::new();
        backend.push_snapshot(snapshot);
        backend
    }

    pub fn push_snapshot(&self, snapshot: OfferSnapshot) {
        self.push(Ok(snapshot));
    }

    pub fn push_error(&self, error: BackendError) {
        self.push(Err(error));
    }

    fn push(&self, response: Result<OfferSnapshot, BackendError>) {
        if let Ok(mut queue) = self.responses.lock() {
            queue.push_back(response);
        }
    }

    /// Every fetch sleeps this long (on the tokio clock) before answering.
    pub fn set_delay(&self, delay: Duration) {
        if let Ok(mut current) = self.delay.lock() {
            *current = delay;
        }
    }

    /// The next `count` cancel calls fail with HTTP 503.
    pub fn fail_next_cancels(&self, count: usize) {
        self.failing_cancels.store(count, Ordering::SeqCst);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn peak_concurrent_fetches(&self) -> usize {
        self.concurrency.peak.load(Ordering::SeqCst)
    }

    pub fn cancel_count(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }

    fn next_response(&self) -> Result<OfferSnapshot, BackendError> {
        let queued = self.responses.lock().ok().and_then(|mut queue| queue.pop_front());
        match queued {
            Some(Ok(snapshot)) => {
                if let Ok(mut last) = self.last.lock() {
                    *last = snapshot.clone();
                }
                Ok(snapshot)
            }
            Some(Err(err)) => Err(err),
            None => Ok(self.last.lock().map(|last| last.clone()).unwrap_or_default()),
        }
    }
}

#[async_trait]
impl OfferBackend for ScriptedBackend {
    async fn fetch_offers(&self, _request_id: &RequestId) -> Result<OfferSnapshot, BackendError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.concurrency.enter();
        let delay = self.delay.lock().map(|d| *d).unwrap_or_default();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let response = self.next_response();
        self.concurrency.exit();
        response
    }

    async fn cancel_request(&self, _request_id: &RequestId) -> Result<(), BackendError> {
        self.cancels.fetch_add(1, Ordering::SeqCst);
        let failing = self.failing_cancels.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_cancels.store(failing - 1, Ordering::SeqCst);
            return Err(BackendError::Status(503));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
enum RouteMode {
    /// Every query fails.
    Outage,
    /// Road distance = straight-line distance × factor, at `speed_kmh`.
    Detour { factor: f64, speed_kmh: f64 },
}

/// [`RouteProvider`] with scripted answers and call accounting.
#[derive(Debug)]
pub struct ScriptedRouteProvider {
    mode: RouteMode,
    delay: Duration,
    failing_from: Mutex<Vec<Point>>,
    calls: AtomicUsize,
    concurrency: Concurrency,
}

impl ScriptedRouteProvider {
    fn with_mode(mode: RouteMode) -> Self {
        Self {
            mode,
            delay: Duration::ZERO,
            failing_from: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            concurrency: Concurrency::default(),
        }
    }

    /// Routing service is down.
    pub fn outage() -> Self {
        Self::with_mode(RouteMode::Outage)
    }

    /// Roads are `factor` times longer than the straight line.
    pub fn detour(factor: f64) -> Self {
        Self::with_mode(RouteMode::Detour {
            factor,
            speed_kmh: 30.0,
        })
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Queries starting at `from` fail.
    pub fn fail_from(&self, from: Point) {
        if let Ok(mut failing) = self.failing_from.lock() {
            failing.push(from);
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn peak_concurrent_calls(&self) -> usize {
        self.concurrency.peak.load(Ordering::SeqCst)
    }

    fn answer(&self, from: Point, to: Point) -> Result<RouteResult, RoutingError> {
        let failing = self
            .failing_from
            .lock()
            .map(|points| points.contains(&from))
            .unwrap_or(false);
        match self.mode {
            RouteMode::Outage => Err(RoutingError::Api("service unavailable".to_string())),
            _ if failing => Err(RoutingError::NoRoute),
            RouteMode::Detour { factor, speed_kmh } => {
                let distance_m = haversine_m(from, to) * factor;
                Ok(RouteResult {
                    distance_m,
                    duration_secs: distance_m / 1000.0 / speed_kmh * 3600.0,
                })
            }
        }
    }
}

#[async_trait]
impl RouteProvider for ScriptedRouteProvider {
    async fn route(&self, from: Point, to: Point) -> Result<RouteResult, RoutingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.concurrency.enter();
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let result = self.answer(from, to);
        self.concurrency.exit();
        result
    }
}

// ---------------------------------------------------------------------------
// Payment
// ---------------------------------------------------------------------------

/// [`PaymentHandoff`] that records requests and succeeds unless told not to.
#[derive(Debug, Default)]
pub struct RecordingPayment {
    requests: Mutex<Vec<PaymentHandoffRequest>>,
    failing: Mutex<bool>,
}

impl RecordingPayment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        if let Ok(mut flag) = self.failing.lock() {
            *flag = failing;
        }
    }

    pub fn requests(&self) -> Vec<PaymentHandoffRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl PaymentHandoff for RecordingPayment {
    async fn hand_off(&self, request: &PaymentHandoffRequest) -> Result<(), PaymentError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        let failing = self.failing.lock().map(|f| *f).unwrap_or(false);
        if failing {
            Err(PaymentError::Declined("card declined".to_string()))
        } else {
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// Controller fixture
// ---------------------------------------------------------------------------

/// A controller wired to scripted collaborators.
pub struct TestSession {
    pub controller: SelectionController,
    pub backend: Arc<ScriptedBackend>,
    pub routes: Arc<ScriptedRouteProvider>,
    pub payment: Arc<RecordingPayment>,
}

impl TestSession {
    pub fn new(config: EngineConfig, backend: ScriptedBackend, routes: ScriptedRouteProvider) -> Self {
        let backend = Arc::new(backend);
        let routes = Arc::new(routes);
        let payment = Arc::new(RecordingPayment::new());
        let controller = SelectionController::new(
            RequestId::from("req-test"),
            config,
            backend.clone(),
            routes.clone(),
            payment.clone(),
        )
        .expect("test config is valid");
        Self {
            controller,
            backend,
            routes,
            payment,
        }
    }
}
