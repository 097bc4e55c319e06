use std::sync::Arc;

use aerosol::axum::Dep;
use axum::{Json, http::StatusCode, response::IntoResponse};
use resubmit::SubmissionTracker;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Health check endpoint.
///
/// Reports how many submissions the guard is currently tracking, including
/// expired records the sweeper has not yet removed.
#[tracing::instrument(skip(tracker))]
pub async fn handle(Dep(tracker): Dep<Arc<SubmissionTracker>>) -> PingResponse {
    let tracked = tracker.len();
    info!(tracked, "health.ping");
    PingResponse::Success(Json(Health { tracked }))
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Health {
    pub tracked: usize,
}

#[derive(Debug)]
pub enum PingResponse {
    Success(Json<Health>),
}

impl IntoResponse for PingResponse {
    fn into_response(self) -> axum::response::Response {
        match self {
            PingResponse::Success(body) => (StatusCode::OK, body).into_response(),
        }
    }
}
