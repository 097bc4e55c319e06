//! Echo endpoint used to observe what handlers receive behind the guard.

use axum::{
    Json, Router,
    http::StatusCode,
    response::IntoResponse,
    routing::post,
};
use resubmit::ReplayableBody;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::api::State;

pub fn router() -> Router<State> {
    Router::new().route("/", post(echo))
}

#[derive(Debug, Serialize)]
pub struct EchoBody {
    /// Size of the buffered body.
    pub bytes: usize,

    /// The body parsed a second time from the stream the guard rebuilt.
    pub received: Value,
}

/// Echo a JSON body back to the caller.
///
/// The handler reads the body twice: once from the buffered copy and once
/// from the request stream. Both must agree.
///
/// ## Endpoint
/// ```text
/// POST /api/v1/echo
/// Content-Type: application/json
///
/// { "anything": true }
/// ```
///
/// ## Responses
/// - 200: The body, parsed
/// - 400: Body is not JSON
/// - 500: Buffered body and request stream disagree
/// - 409: Identical body echoed within the retention window
/// - 415: Body was not buffered by the guard
#[tracing::instrument(skip_all)]
pub async fn echo(raw: ReplayableBody, Json(received): Json<Value>) -> EchoResponse {
    match serde_json::from_slice::<Value>(raw.as_slice()) {
        Ok(buffered) if buffered == received => {
            info!(bytes = raw.len(), "echo.success");
            EchoResponse::Success(EchoBody {
                bytes: raw.len(),
                received,
            })
        }
        buffered => {
            warn!(?buffered, "echo.mismatch");
            EchoResponse::Error(String::from("buffered body differs from request stream"))
        }
    }
}

#[derive(Debug)]
pub enum EchoResponse {
    Success(EchoBody),
    Error(String),
}

impl IntoResponse for EchoResponse {
    fn into_response(self) -> axum::response::Response {
        match self {
            EchoResponse::Success(body) => (StatusCode::OK, Json(body)).into_response(),
            EchoResponse::Error(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg).into_response(),
        }
    }
}
