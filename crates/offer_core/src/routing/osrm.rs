//! OSRM `/route` client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::error::RoutingError;
use super::{RouteProvider, RouteResult};
use crate::geo::Point;

/// Routes via an OSRM HTTP endpoint (e.g. `http://localhost:5000`).
#[derive(Debug, Clone)]
pub struct OsrmRouteProvider {
    client: Client,
    endpoint: String,
}

impl OsrmRouteProvider {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, RoutingError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }

    fn route_url(&self, from: Point, to: Point) -> String {
        // OSRM takes lng,lat pairs.
        format!(
            "{}/route/v1/driving/{:.6},{:.6};{:.6},{:.6}?overview=false",
            self.endpoint, from.lng, from.lat, to.lng, to.lat,
        )
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct OsrmRouteResponse {
    code: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[derive(Debug, Deserialize)]
struct OsrmRoute {
    distance: f64, // metres
    duration: f64, // seconds
}

pub(crate) fn parse_route_response(resp: OsrmRouteResponse) -> Result<RouteResult, RoutingError> {
    match resp.code.as_str() {
        "Ok" => {}
        "NoRoute" | "NoSegment" => return Err(RoutingError::NoRoute),
        other => {
            let detail = resp
                .message
                .map(|msg| format!("{other}: {msg}"))
                .unwrap_or_else(|| other.to_string());
            return Err(RoutingError::Api(detail));
        }
    }

    let route = resp.routes.into_iter().next().ok_or(RoutingError::NoRoute)?;
    if !route.distance.is_finite() || route.distance < 0.0 {
        return Err(RoutingError::NoRoute);
    }

    Ok(RouteResult {
        distance_m: route.distance,
        duration_secs: route.duration,
    })
}

#[async_trait]
impl RouteProvider for OsrmRouteProvider {
    async fn route(&self, from: Point, to: Point) -> Result<RouteResult, RoutingError> {
        if !from.is_valid() || !to.is_valid() {
            return Err(RoutingError::InvalidCoordinates);
        }

        let response = self.client.get(self.route_url(from, to)).send().await?;
        let status = response.status();
        // OSRM reports NoRoute with a 400 and a JSON body, so try the body first.
        match response.json::<OsrmRouteResponse>().await {
            Ok(parsed) => parse_route_response(parsed),
            Err(_) if !status.is_success() => Err(RoutingError::Status(status.as_u16())),
            Err(err) => Err(RoutingError::Http(err)),
        }
    }
}
