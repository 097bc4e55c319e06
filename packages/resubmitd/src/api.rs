//! API endpoint handlers for the service.
//!
//! ## Dependency injection
//!
//! We use [`aerosol`][^1] to manage dependencies and inject them into handlers.
//! Reference [`State`] for the list of dependencies; note that when providing
//! dependencies that are in this required list you need to provide them in
//! reverse order of the list.
//!
//! Items that are in the list can be extracted in handlers using the
//! [`Dep`](aerosol::axum::Dep) extractor.
//!
//! [^1]: https://docs.rs/aerosol
//!
//! ## Duplicate submissions
//!
//! Routes that accept submissions are wrapped in a guard from
//! [`Guards`](crate::guards::Guards). A repeated submission is answered with
//! `409 Conflict` before its handler runs, so handlers can assume every
//! request they see is the first of its kind within the retention window.
//!
//! ## Response types
//!
//! Most handlers return a response type that implements [`IntoResponse`](axum::response::IntoResponse)[^2].
//! Returning a dedicated type per handler documents every status a route can
//! produce in one place.
//!
//! [^2]: https://docs.rs/axum/latest/axum/response/trait.IntoResponse.html

use std::{sync::Arc, time::Duration};

use aerosol::Aero;
use axum::{Router, http::StatusCode, routing::get};
use resubmit::SubmissionTracker;
use tower::ServiceBuilder;
use tower_http::{limit::RequestBodyLimitLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::guards::Guards;

pub mod v1;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const MAX_BODY_SIZE: usize = 100 * 1024 * 1024;

pub type State = Aero![crate::ledger::Ledger, Arc<SubmissionTracker>];

/// Build the service router.
///
/// The timeout sits outside the guards: a request that times out drops its
/// submission permit, which completes the submission.
pub fn router(state: State, guards: &Guards) -> Router {
    let middleware = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
        .layer(timeout(REQUEST_TIMEOUT));

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .nest("/api/v1", v1::router(guards))
        .layer(middleware)
        .with_state(state)
}

/// Requests still running after `after` are answered with `408 Request Timeout`.
fn timeout(after: Duration) -> TimeoutLayer {
    TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, after)
}
