//! Offer synchronization: fixed-interval polling of the backend offer list.
//!
//! Two pieces of state drive the synchronizer:
//!
//! - **in-flight token**: a `tokio::sync::Mutex<()>` taken with `try_lock` for
//!   the whole fetch-and-apply. The guard is released on drop, so success,
//!   failure and panics all clear it, and a second poll can never overlap.
//! - **active flag**: a `watch` channel. Once it turns false the scheduler
//!   exits at the next tick boundary and any fetch still outstanding has its
//!   result discarded.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::backend::OfferBackend;
use crate::offers::{OfferSnapshot, RequestId};

/// Why a poll did not reach the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    InFlight,
    Inactive,
}

/// Result of one poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Skipped(SkipReason),
    /// Raw set replaced and ranked. `ranked` counts candidates inside the radius.
    OffersAvailable { candidates: usize, ranked: usize },
    /// The backend has no candidates yet. Not an error.
    NoOffersYet,
    /// Raw set replaced, but a newer recomputation owns the ranked list.
    Superseded,
    /// Fetch failed; previous state kept.
    Failed,
    /// Fetch finished after the request was closed.
    Discarded,
}

/// Receives fetched snapshots. Implemented by the selection controller.
#[async_trait]
pub trait SnapshotSink: Send + Sync {
    async fn apply_snapshot(&self, snapshot: OfferSnapshot) -> PollOutcome;
}

#[derive(Debug, Default)]
struct SyncCounters {
    fetches_started: AtomicU64,
    fetches_failed: AtomicU64,
    skipped_in_flight: AtomicU64,
    discarded: AtomicU64,
}

/// Point-in-time copy of the synchronizer counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub fetches_started: u64,
    pub fetches_failed: u64,
    pub skipped_in_flight: u64,
    pub discarded: u64,
}

pub struct OfferSynchronizer {
    request_id: RequestId,
    backend: Arc<dyn OfferBackend>,
    poll_interval: Duration,
    in_flight: Mutex<()>,
    active: watch::Sender<bool>,
    counters: SyncCounters,
}

impl OfferSynchronizer {
    pub fn new(request_id: RequestId, backend: Arc<dyn OfferBackend>, poll_interval: Duration) -> Self {
        let (active, _) = watch::channel(true);
        Self {
            request_id,
            backend,
            poll_interval,
            in_flight: Mutex::new(()),
            active,
            counters: SyncCounters::default(),
        }
    }

    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    pub fn is_active(&self) -> bool {
        *self.active.borrow()
    }

    /// True while a fetch holds the in-flight token.
    pub fn is_fetching(&self) -> bool {
        self.in_flight.try_lock().is_err()
    }

    /// Stop polling permanently. Returns whether the synchronizer was active.
    pub fn stop(&self) -> bool {
        let was_active = self.active.send_replace(false);
        if was_active {
            info!(request_id = %self.request_id, "offer polling stopped");
        }
        was_active
    }

    pub fn stats(&self) -> SyncStats {
        SyncStats {
            fetches_started: self.counters.fetches_started.load(Ordering::SeqCst),
            fetches_failed: self.counters.fetches_failed.load(Ordering::SeqCst),
            skipped_in_flight: self.counters.skipped_in_flight.load(Ordering::SeqCst),
            discarded: self.counters.discarded.load(Ordering::SeqCst),
        }
    }

    /// One fetch-and-apply cycle, shared by scheduled ticks and manual refresh.
    pub async fn poll(&self, sink: &dyn SnapshotSink) -> PollOutcome {
        if !self.is_active() {
            return PollOutcome::Skipped(SkipReason::Inactive);
        }
        let Ok(_in_flight) = self.in_flight.try_lock() else {
            self.counters.skipped_in_flight.fetch_add(1, Ordering::SeqCst);
            debug!(request_id = %self.request_id, "poll skipped, fetch already in flight");
            return PollOutcome::Skipped(SkipReason::InFlight);
        };

        self.counters.fetches_started.fetch_add(1, Ordering::SeqCst);
        let snapshot = match self.backend.fetch_offers(&self.request_id).await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                self.counters.fetches_failed.fetch_add(1, Ordering::SeqCst);
                warn!(request_id = %self.request_id, error = %err, "offer fetch failed, keeping previous offers");
                return PollOutcome::Failed;
            }
        };

        if !self.is_active() {
            self.counters.discarded.fetch_add(1, Ordering::SeqCst);
            debug!(request_id = %self.request_id, "discarding offers fetched after shutdown");
            return PollOutcome::Discarded;
        }

        let outcome = sink.apply_snapshot(snapshot).await;
        if outcome == PollOutcome::Discarded {
            self.counters.discarded.fetch_add(1, Ordering::SeqCst);
        }
        debug!(request_id = %self.request_id, ?outcome, "poll complete");
        outcome
    }

    /// Start the fixed-interval scheduler. The first tick fires immediately;
    /// each tick spawns a [`poll`](Self::poll), so a slow fetch makes later
    /// ticks skip rather than queue. The task ends once the synchronizer stops.
    pub fn spawn_polling(self: &Arc<Self>, sink: Arc<dyn SnapshotSink>) -> JoinHandle<()> {
        let sync = Arc::clone(self);
        tokio::spawn(async move {
            let mut active = sync.active.subscribe();
            let mut interval = tokio::time::interval(sync.poll_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(
                request_id = %sync.request_id,
                interval_ms = sync.poll_interval.as_millis() as u64,
                "offer polling started"
            );

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if !sync.is_active() {
                            break;
                        }
                        let tick_sync = Arc::clone(&sync);
                        let tick_sink = Arc::clone(&sink);
                        tokio::spawn(async move {
                            tick_sync.poll(tick_sink.as_ref()).await;
                        });
                    }
                    changed = active.changed() => {
                        if changed.is_err() || !*active.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!(request_id = %sync.request_id, "offer scheduler exited");
        })
    }
}
