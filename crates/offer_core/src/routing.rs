//! Pluggable route providers: trait abstraction for routing backends.
//!
//! Three implementations, selectable via [`RouteProviderKind`]:
//!
//! - **`StraightLineRouteProvider`**: Haversine distance with an estimated duration. No network.
//! - **`OsrmRouteProvider`**: Calls a local/remote OSRM HTTP endpoint.
//! - **`DistanceMatrixRouteProvider`**: Calls a keyed distance-matrix API.
//!
//! Network providers are wrapped in a [`CachedRouteProvider`] so re-running the
//! pipeline over the same drivers (e.g. after a radius change) does not repeat
//! identical queries.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use lru::LruCache;
use serde::{Deserialize, Serialize};

use crate::geo::{haversine_m, Point};

pub mod distance_matrix;
pub mod error;
pub mod osrm;

pub use distance_matrix::DistanceMatrixRouteProvider;
pub use error::RoutingError;
pub use osrm::OsrmRouteProvider;

// ---------------------------------------------------------------------------
// Core types
// ---------------------------------------------------------------------------

/// Road distance and free-flow travel time between two points.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RouteResult {
    pub distance_m: f64,
    pub duration_secs: f64,
}

/// Which routing backend to use.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RouteProviderKind {
    /// Haversine distance, zero external dependencies.
    #[default]
    StraightLine,
    /// OSRM HTTP endpoint (e.g. `"http://localhost:5000"`).
    Osrm { endpoint: String },
    /// Distance-matrix API; `api_key` comes from configuration, never from code.
    DistanceMatrix { endpoint: String, api_key: String },
}

/// Trait for routing backends. Implementations must be `Send + Sync` so one
/// provider can serve concurrent enrichment queries.
#[async_trait]
pub trait RouteProvider: Send + Sync {
    /// Route from `from` to `to`. An empty route is reported as [`RoutingError::NoRoute`].
    async fn route(&self, from: Point, to: Point) -> Result<RouteResult, RoutingError>;
}

// ---------------------------------------------------------------------------
// Straight-line provider (always available)
// ---------------------------------------------------------------------------

/// Average city speed used to estimate straight-line durations (km/h).
const STRAIGHT_LINE_SPEED_KMH: f64 = 40.0;

/// Haversine distance with a duration estimated at a fixed average speed.
#[derive(Debug, Clone, Copy)]
pub struct StraightLineRouteProvider {
    pub speed_kmh: f64,
}

impl Default for StraightLineRouteProvider {
    fn default() -> Self {
        Self {
            speed_kmh: STRAIGHT_LINE_SPEED_KMH,
        }
    }
}

#[async_trait]
impl RouteProvider for StraightLineRouteProvider {
    async fn route(&self, from: Point, to: Point) -> Result<RouteResult, RoutingError> {
        if !from.is_valid() || !to.is_valid() {
            return Err(RoutingError::InvalidCoordinates);
        }
        let distance_m = haversine_m(from, to);
        let duration_secs = if distance_m > 0.0 && self.speed_kmh > 0.0 {
            (distance_m / 1000.0) / self.speed_kmh * 3600.0
        } else {
            0.0
        };
        Ok(RouteResult {
            distance_m,
            duration_secs,
        })
    }
}

// ---------------------------------------------------------------------------
// Caching wrapper
// ---------------------------------------------------------------------------

/// Coordinates rounded to 1e-5 degrees (~1 m).
type RouteKey = (i64, i64, i64, i64);

fn route_key(from: Point, to: Point) -> RouteKey {
    let q = |v: f64| (v * 1e5).round() as i64;
    (q(from.lat), q(from.lng), q(to.lat), q(to.lng))
}

/// LRU-cached wrapper around any [`RouteProvider`].
///
/// Keys are directional. Only successful routes are cached; failures are
/// retried on the next query.
pub struct CachedRouteProvider {
    inner: Arc<dyn RouteProvider>,
    cache: Mutex<LruCache<RouteKey, RouteResult>>,
}

impl CachedRouteProvider {
    pub fn new(inner: Arc<dyn RouteProvider>, capacity: NonZeroUsize) -> Self {
        Self {
            inner,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn len(&self) -> usize {
        self.cache.lock().map(|cache| cache.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RouteProvider for CachedRouteProvider {
    async fn route(&self, from: Point, to: Point) -> Result<RouteResult, RoutingError> {
        let key = route_key(from, to);

        // Guard is dropped before the await below.
        if let Ok(mut cache) = self.cache.lock() {
            if let Some(cached) = cache.get(&key) {
                return Ok(*cached);
            }
        }

        let result = self.inner.route(from, to).await?;

        if let Ok(mut cache) = self.cache.lock() {
            cache.put(key, result);
        }
        Ok(result)
    }
}

// ---------------------------------------------------------------------------
// Factory: build a provider from RouteProviderKind
// ---------------------------------------------------------------------------

/// Construct a shared [`RouteProvider`] from a [`RouteProviderKind`] descriptor.
///
/// - `StraightLine` is returned without caching (it's already cheap).
/// - Network providers are wrapped in a [`CachedRouteProvider`] unless
///   `cache_capacity` is zero.
pub fn build_route_provider(
    kind: &RouteProviderKind,
    http_timeout: Duration,
    cache_capacity: usize,
) -> Result<Arc<dyn RouteProvider>, RoutingError> {
    let inner: Arc<dyn RouteProvider> = match kind {
        RouteProviderKind::StraightLine => {
            return Ok(Arc::new(StraightLineRouteProvider::default()));
        }
        RouteProviderKind::Osrm { endpoint } => {
            Arc::new(OsrmRouteProvider::new(endpoint, http_timeout)?)
        }
        RouteProviderKind::DistanceMatrix { endpoint, api_key } => Arc::new(
            DistanceMatrixRouteProvider::new(endpoint, api_key, http_timeout)?,
        ),
    };

    Ok(match NonZeroUsize::new(cache_capacity) {
        Some(capacity) => Arc::new(CachedRouteProvider::new(inner, capacity)),
        None => inner,
    })
}
