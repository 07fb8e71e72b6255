//! Callback adapter error types.

use metahub_domain::error::MetaError;

/// Errors specific to the HTTP callback adapter.
#[derive(Debug, thiserror::Error)]
pub enum CallbackError {
    /// The request could not be built or sent, or timed out.
    #[error("callback request failed")]
    Http(#[from] reqwest::Error),

    /// The device service answered with a non-success status.
    #[error("callback to {url} answered {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
}

impl From<CallbackError> for MetaError {
    fn from(err: CallbackError) -> Self {
        Self::Storage(Box::new(err))
    }
}
