//! Keyed distance-matrix HTTP client (Google-style `rows[].elements[]` JSON).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;

use super::error::RoutingError;
use super::{RouteProvider, RouteResult};
use crate::geo::Point;

/// Single origin/destination lookups against a distance-matrix API.
#[derive(Debug, Clone)]
pub struct DistanceMatrixRouteProvider {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl DistanceMatrixRouteProvider {
    pub fn new(endpoint: &str, api_key: &str, timeout: Duration) -> Result<Self, RoutingError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn matrix_url(&self, from: Point, to: Point) -> Result<Url, RoutingError> {
        let mut url = Url::parse(&self.endpoint)
            .map_err(|err| RoutingError::Api(format!("invalid distance matrix URL: {err}")))?;
        url.query_pairs_mut()
            .append_pair("origins", &format!("{:.6},{:.6}", from.lat, from.lng))
            .append_pair("destinations", &format!("{:.6},{:.6}", to.lat, to.lng))
            .append_pair("mode", "driving")
            .append_pair("key", &self.api_key);
        Ok(url)
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct MatrixResponse {
    status: String,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    rows: Vec<MatrixRow>,
}

#[derive(Debug, Deserialize)]
struct MatrixRow {
    #[serde(default)]
    elements: Vec<MatrixElement>,
}

#[derive(Debug, Deserialize)]
struct MatrixElement {
    status: String,
    distance: Option<MatrixValue>,
    duration: Option<MatrixValue>,
}

#[derive(Debug, Deserialize)]
struct MatrixValue {
    value: f64,
}

pub(crate) fn parse_matrix_response(resp: MatrixResponse) -> Result<RouteResult, RoutingError> {
    if resp.status != "OK" {
        let detail = match resp.error_message {
            Some(msg) => format!("{}: {}", resp.status, msg),
            None => resp.status,
        };
        return Err(RoutingError::Api(detail));
    }

    let element = resp
        .rows
        .into_iter()
        .next()
        .and_then(|row| row.elements.into_iter().next())
        .ok_or(RoutingError::NoRoute)?;

    if element.status != "OK" {
        return Err(RoutingError::NoRoute);
    }

    match (element.distance, element.duration) {
        (Some(distance), Some(duration)) => Ok(RouteResult {
            distance_m: distance.value,
            duration_secs: duration.value,
        }),
        _ => Err(RoutingError::NoRoute),
    }
}

#[async_trait]
impl RouteProvider for DistanceMatrixRouteProvider {
    async fn route(&self, from: Point, to: Point) -> Result<RouteResult, RoutingError> {
        if !from.is_valid() || !to.is_valid() {
            return Err(RoutingError::InvalidCoordinates);
        }

        let response = self.client.get(self.matrix_url(from, to)?).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(RoutingError::Status(status.as_u16()));
        }
        let parsed: MatrixResponse = response.json().await?;
        parse_matrix_response(parsed)
    }
}
