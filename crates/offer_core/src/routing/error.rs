use thiserror::Error;

/// Errors from a single routing query. The enricher absorbs all of them.
#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("routing request failed: {0}")]
    Http(#[source] reqwest::Error),
    #[error("routing service returned HTTP {0}")]
    Status(u16),
    #[error("routing service rejected the query: {0}")]
    Api(String),
    #[error("no route between the requested points")]
    NoRoute,
    #[error("routing request timed out")]
    Timeout,
    #[error("invalid coordinates")]
    InvalidCoordinates,
}

impl From<reqwest::Error> for RoutingError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Http(err)
        }
    }
}
