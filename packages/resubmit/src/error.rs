//! Error types for the guard.
//!
//! Every failure here is scoped to a single request: none of them leave a
//! submission record behind, since records are only created after a
//! fingerprint has been computed from a fully captured body.

use std::time::Duration;

use axum::response::{IntoResponse, Response};
use derive_more::{Display, Error};
use http::{HeaderValue, StatusCode, header::RETRY_AFTER};
use tracing::error;

use crate::{fingerprint::Fingerprint, tracker::Rejection};

/// Errors while capturing a request body into a [`crate::ReplayableBody`].
#[derive(Debug, Display, Error)]
pub enum CaptureError {
    /// The body stream failed before it was fully read.
    #[display("read request body")]
    BodyRead(axum::Error),

    /// The body is larger than the configured cap.
    #[display("request body exceeds {limit} bytes")]
    PayloadTooLarge {
        #[error(not(source))]
        limit: usize,
    },
}

/// The request was not buffered, so it has no fingerprint.
///
/// This is a signal rather than a failure: the guard forwards such requests
/// without making any duplicate guarantee.
#[derive(Clone, Debug, Display, Error, PartialEq, Eq)]
#[display("content type {content_type:?} is not eligible for fingerprinting")]
pub struct UnsupportedContentType {
    #[error(not(source))]
    pub content_type: Option<String>,
}

/// Reasons the guard refuses to forward a request.
#[derive(Debug, Display, Error)]
pub enum GuardError {
    /// Capturing the body failed.
    #[display("{_0}")]
    Capture(CaptureError),

    /// An identical request is in flight or was completed recently.
    #[display("duplicate submission {fingerprint}, retry after {:?}", rejection.retry_after)]
    DuplicateSubmission {
        #[error(not(source))]
        fingerprint: Fingerprint,
        #[error(not(source))]
        rejection: Rejection,
    },
}

impl From<CaptureError> for GuardError {
    fn from(err: CaptureError) -> Self {
        Self::Capture(err)
    }
}

impl GuardError {
    /// The status code the pipeline should answer with.
    pub fn status(&self) -> StatusCode {
        match self {
            GuardError::Capture(CaptureError::BodyRead(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            GuardError::Capture(CaptureError::PayloadTooLarge { .. }) => {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            GuardError::DuplicateSubmission { .. } => StatusCode::CONFLICT,
        }
    }
}

impl IntoResponse for GuardError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            GuardError::Capture(CaptureError::BodyRead(err)) => {
                error!(?err, "guard.body_read");
                (status, "Failed to read request body").into_response()
            }
            GuardError::Capture(CaptureError::PayloadTooLarge { limit }) => (
                status,
                format!("Request body exceeds the {limit} byte limit"),
            )
                .into_response(),
            GuardError::DuplicateSubmission { rejection, .. } => {
                let retry_after = HeaderValue::from(retry_after_secs(rejection.retry_after));
                (
                    status,
                    [(RETRY_AFTER, retry_after)],
                    "Duplicate submission; an identical request was already accepted",
                )
                    .into_response()
            }
        }
    }
}

/// Whole seconds for the `Retry-After` header, rounded up and never zero.
fn retry_after_secs(remaining: Duration) -> u64 {
    let secs = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
    secs.max(1)
}
