//! Correlation id extractor.

use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use metahub_domain::id::RequestId;

/// Header carrying the id that ties a request to the events it causes.
pub const CORRELATION_HEADER: &str = "X-Correlation-ID";

/// The caller's correlation id, or a fresh one when the header is absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationId(pub String);

impl CorrelationId {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<S: Send + Sync> FromRequestParts<S> for CorrelationId {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = parts
            .headers
            .get(CORRELATION_HEADER)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
            .map_or_else(|| RequestId::new().to_string(), str::to_string);
        Ok(Self(id))
    }
}
