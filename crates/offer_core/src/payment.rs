//! Payment hand-off collaborator.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Serialize;
use thiserror::Error;

use crate::config::BackendConfig;
use crate::offers::{CandidateId, RequestId};

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("payment hand-off failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("payment service returned HTTP {0}")]
    Status(u16),
    #[error("payment declined: {0}")]
    Declined(String),
}

/// What the customer agreed to pay, and to whom.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentHandoffRequest {
    pub request_id: RequestId,
    pub candidate_id: CandidateId,
    pub agreed_price: Option<f64>,
}

#[async_trait]
pub trait PaymentHandoff: Send + Sync {
    async fn hand_off(&self, request: &PaymentHandoffRequest) -> Result<(), PaymentError>;
}

/// reqwest-backed [`PaymentHandoff`] posting to `/requests/{id}/payment`.
#[derive(Debug, Clone)]
pub struct HttpPaymentHandoff {
    client: Client,
    base_url: String,
    auth_token: Option<String>,
}

impl HttpPaymentHandoff {
    pub fn new(config: &BackendConfig, timeout: Duration) -> Result<Self, PaymentError> {
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
}

#[async_trait]
impl PaymentHandoff for HttpPaymentHandoff {
    async fn hand_off(&self, request: &PaymentHandoffRequest) -> Result<(), PaymentError> {
        let url = format!("{}/requests/{}/payment", self.base_url, request.request_id);
        let response = self
            .authorize(self.client.post(url).json(request))
            .send()
            .await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        if status.is_client_error() {
            let reason = response.text().await.unwrap_or_default();
            let reason = if reason.trim().is_empty() {
                status.to_string()
            } else {
                reason
            };
            return Err(PaymentError::Declined(reason));
        }
        Err(PaymentError::Status(status.as_u16()))
    }
}
