//! HTTP error response mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use metahub_domain::error::{ErrorKind, MetaError};

use crate::dto::BaseResponse;

/// Maps [`MetaError`] to an HTTP response with appropriate status code.
#[derive(Debug)]
pub struct ApiError(MetaError);

impl From<MetaError> for ApiError {
    fn from(err: MetaError) -> Self {
        Self(err)
    }
}

/// Status code reported for `err`.
pub(crate) fn status_of(err: &MetaError) -> StatusCode {
    StatusCode::from_u16(err.kind().status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

/// Message reported for `err`. Server errors keep their details in the log.
pub(crate) fn message_of(err: &MetaError) -> String {
    if err.kind() == ErrorKind::ServerError {
        tracing::error!(error = ?err, "request failed");
    }
    err.to_string()
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_of(&self.0);
        let body = BaseResponse::failure(String::new(), status, message_of(&self.0));
        (status, Json(body)).into_response()
    }
}
