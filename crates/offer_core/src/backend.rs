//! Backend collaborator: offer list and request cancellation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use crate::config::BackendConfig;
use crate::offers::{Candidate, OfferSnapshot, RequestId, TripEndpoints};

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("backend returned HTTP {0}")]
    Status(u16),
    #[error("failed to decode backend response: {0}")]
    Decode(String),
}

/// The ride backend as seen by the offer engine.
#[async_trait]
pub trait OfferBackend: Send + Sync {
    /// Current trip endpoints (if known) and candidate offers for `request_id`.
    async fn fetch_offers(&self, request_id: &RequestId) -> Result<OfferSnapshot, BackendError>;

    /// Cancel `request_id` server-side. Cancelling an already cancelled
    /// request must succeed.
    async fn cancel_request(&self, request_id: &RequestId) -> Result<(), BackendError>;
}

/// Wire shape of `GET /requests/{id}/offers`.
#[derive(Debug, Deserialize)]
pub(crate) struct OfferListResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    trip: Option<TripEndpoints>,
    /// Entries are decoded one by one so a malformed offer does not sink the poll.
    #[serde(default)]
    offers: Vec<serde_json::Value>,
}

pub(crate) fn parse_offer_list(resp: OfferListResponse) -> OfferSnapshot {
    if resp.status.as_deref() == Some("pending") {
        return OfferSnapshot {
            endpoints: resp.trip,
            candidates: Vec::new(),
        };
    }

    let candidates = resp
        .offers
        .into_iter()
        .filter_map(|raw| match serde_json::from_value::<Candidate>(raw) {
            Ok(candidate) => Some(candidate),
            Err(err) => {
                warn!(error = %err, "skipping malformed offer entry");
                None
            }
        })
        .collect();

    OfferSnapshot {
        endpoints: resp.trip,
        candidates,
    }
}

/// Cancellation is idempotent: "not found", "conflict" and "gone" mean the
/// request is already closed.
pub(crate) fn cancel_status_ok(status: StatusCode) -> bool {
    status.is_success()
        || status == StatusCode::NOT_FOUND
        || status == StatusCode::CONFLICT
        || status == StatusCode::GONE
}

/// reqwest-backed [`OfferBackend`].
#[derive(Debug, Clone)]
pub struct HttpOfferBackend {
    client: Client,
    base_url: String,
    auth_token: Option<String>,
}

impl HttpOfferBackend {
    pub fn new(config: &BackendConfig, timeout: Duration) -> Result<Self, BackendError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth_token: config.auth_token.clone(),
        })
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.auth_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    fn request_url(&self, request_id: &RequestId, action: &str) -> String {
        format!("{}/requests/{}/{}", self.base_url, request_id, action)
    }
}

#[async_trait]
impl OfferBackend for HttpOfferBackend {
    async fn fetch_offers(&self, request_id: &RequestId) -> Result<OfferSnapshot, BackendError> {
        let url = self.request_url(request_id, "offers");
        let response = self.authorize(self.client.get(url)).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::Status(status.as_u16()));
        }
        let body = response.bytes().await?;
        let parsed: OfferListResponse =
            serde_json::from_slice(&body).map_err(|err| BackendError::Decode(err.to_string()))?;
        Ok(parse_offer_list(parsed))
    }

    async fn cancel_request(&self, request_id: &RequestId) -> Result<(), BackendError> {
        let url = self.request_url(request_id, "cancel");
        let response = self.authorize(self.client.post(url)).send().await?;
        let status = response.status();
        if cancel_status_ok(status) {
            Ok(())
        } else {
            Err(BackendError::Status(status.as_u16()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> OfferSnapshot {
        let resp: OfferListResponse = serde_json::from_str(raw).expect("valid json");
        parse_offer_list(resp)
    }

    #[test]
    fn parses_trip_and_offers() {
        let snapshot = parse(
            r#"{
                "status": "offers",
                "trip": {
                    "origin": {"name": "Siam", "lat": 13.7456, "lng": 100.5341},
                    "destination": {"name": "Airport", "lat": 13.69, "lng": 100.75}
                },
                "offers": [
                    {"id": "d1", "name": "Somchai", "rating": 4.8, "location": {"lat": 13.74, "lng": 100.53}, "price": 250.0},
                    {"id": "d2", "name": "Niran", "rating": 4.1, "location": {"lat": 13.75, "lng": 100.54}}
                ]
            }"#,
        );
        let trip = snapshot.endpoints.expect("endpoints");
        assert_eq!(trip.origin.name, "Siam");
        assert_eq!(snapshot.candidates.len(), 2);
        assert_eq!(snapshot.candidates[0].price, Some(250.0));
        assert_eq!(snapshot.candidates[1].price, None);
    }

    #[test]
    fn pending_status_means_no_offers_yet() {
        let snapshot = parse(
            r#"{"status": "pending", "offers": [{"id": "d1", "name": "x", "location": {"lat": 1.0, "lng": 1.0}}]}"#,
        );
        assert!(snapshot.candidates.is_empty());
        assert!(snapshot.endpoints.is_none());
    }

    #[test]
    fn malformed_offers_are_skipped() {
        let snapshot = parse(
            r#"{"offers": [
                {"id": "ok", "name": "Good", "rating": 5, "location": {"lat": 13.7, "lng": 100.5}},
                {"id": "broken", "name": "No location"}
            ]}"#,
        );
        assert_eq!(snapshot.candidates.len(), 1);
        assert_eq!(snapshot.candidates[0].id.as_str(), "ok");
    }

    #[test]
    fn cancel_treats_closed_requests_as_success() {
        assert!(cancel_status_ok(StatusCode::NO_CONTENT));
        assert!(cancel_status_ok(StatusCode::NOT_FOUND));
        assert!(cancel_status_ok(StatusCode::CONFLICT));
        assert!(cancel_status_ok(StatusCode::GONE));
        assert!(!cancel_status_ok(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(!cancel_status_ok(StatusCode::FORBIDDEN));
    }

    #[test]
    fn urls_are_built_under_requests() {
        let backend = HttpOfferBackend::new(
            &BackendConfig {
                base_url: "https://api.example.com/".to_string(),
                auth_token: None,
            },
            Duration::from_secs(1),
        )
        .expect("client");
        assert_eq!(
            backend.request_url(&RequestId::from("r-42"), "offers"),
            "https://api.example.com/requests/r-42/offers"
        );
    }
}
