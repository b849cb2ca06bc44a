//! Engine configuration: polling cadence, radius options, routing limits and
//! collaborator endpoints.
//!
//! Every field has a default so a TOML file only needs to name what it
//! overrides:
//!
//! ```toml
//! poll_interval_ms = 5000
//! radius_options_m = [1000, 5000, 10000, 20000, 30000]
//!
//! [backend]
//! base_url = "https://api.example.com"
//!
//! [route_provider]
//! kind = "osrm"
//! endpoint = "http://localhost:5000"
//! ```

use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::routing::RouteProviderKind;

const DEFAULT_POLL_INTERVAL_MS: u64 = 5_000;
const DEFAULT_RADIUS_OPTIONS_M: [u32; 5] = [1_000, 5_000, 10_000, 20_000, 30_000];
const DEFAULT_RADIUS_M: u32 = 5_000;
const DEFAULT_ROUTING_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_MAX_CONCURRENT_ROUTES: usize = 8;
const DEFAULT_ROUTE_CACHE_CAPACITY: usize = 1_024;
const DEFAULT_HTTP_TIMEOUT_MS: u64 = 10_000;

/// Search radius around the trip origin, drawn from [`EngineConfig::radius_options_m`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RadiusMeters(u32);

impl RadiusMeters {
    pub fn meters(self) -> u32 {
        self.0
    }

    pub fn as_f64(self) -> f64 {
        f64::from(self.0)
    }
}

impl fmt::Display for RadiusMeters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} m", self.0)
    }
}

/// A radius value outside the configured option set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("radius {requested} m is not one of the allowed options {allowed:?}")]
pub struct RadiusError {
    pub requested: u32,
    pub allowed: Vec<u32>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Offer backend location and credentials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub base_url: String,
    /// Sent as a bearer token on backend and payment calls.
    pub auth_token: Option<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            auth_token: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Interval between backend polls.
    pub poll_interval_ms: u64,
    /// Radius values the user may choose from.
    pub radius_options_m: Vec<u32>,
    /// Radius selected when a session starts. Must be in `radius_options_m`.
    pub default_radius_m: u32,
    /// Deadline for one whole enrichment batch.
    pub routing_timeout_ms: u64,
    /// Upper bound on routing queries in flight at once.
    pub max_concurrent_routes: usize,
    /// LRU capacity for successful routes (0 disables caching).
    pub route_cache_capacity: usize,
    /// Per-request timeout for backend, payment and routing HTTP calls.
    pub http_timeout_ms: u64,
    pub route_provider: RouteProviderKind,
    pub backend: BackendConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            radius_options_m: DEFAULT_RADIUS_OPTIONS_M.to_vec(),
            default_radius_m: DEFAULT_RADIUS_M,
            routing_timeout_ms: DEFAULT_ROUTING_TIMEOUT_MS,
            max_concurrent_routes: DEFAULT_MAX_CONCURRENT_ROUTES,
            route_cache_capacity: DEFAULT_ROUTE_CACHE_CAPACITY,
            http_timeout_ms: DEFAULT_HTTP_TIMEOUT_MS,
            route_provider: RouteProviderKind::default(),
            backend: BackendConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.radius_options_m.is_empty() {
            return Err(ConfigError::Invalid(
                "radius_options_m cannot be empty".to_string(),
            ));
        }
        if self.radius_options_m.contains(&0) {
            return Err(ConfigError::Invalid(
                "radius_options_m values must be positive".to_string(),
            ));
        }
        if !self.radius_options_m.contains(&self.default_radius_m) {
            return Err(ConfigError::Invalid(format!(
                "default_radius_m {} is not in radius_options_m {:?}",
                self.default_radius_m, self.radius_options_m
            )));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "poll_interval_ms must be positive".to_string(),
            ));
        }
        if self.routing_timeout_ms == 0 || self.http_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "routing_timeout_ms and http_timeout_ms must be positive".to_string(),
            ));
        }
        if self.max_concurrent_routes == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_routes must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn routing_timeout(&self) -> Duration {
        Duration::from_millis(self.routing_timeout_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    /// Look up `meters` in the allowed radius set.
    pub fn radius(&self, meters: u32) -> Result<RadiusMeters, RadiusError> {
        if self.radius_options_m.contains(&meters) {
            Ok(RadiusMeters(meters))
        } else {
            Err(RadiusError {
                requested: meters,
                allowed: self.radius_options_m.clone(),
            })
        }
    }

    pub fn default_radius(&self) -> RadiusMeters {
        RadiusMeters(self.default_radius_m)
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_routing_timeout(mut self, timeout: Duration) -> Self {
        self.routing_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_default_radius_m(mut self, meters: u32) -> Self {
        self.default_radius_m = meters;
        self
    }

    pub fn with_max_concurrent_routes(mut self, limit: usize) -> Self {
        self.max_concurrent_routes = limit;
        self
    }
}
