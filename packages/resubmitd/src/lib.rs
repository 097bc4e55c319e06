//! Demonstration service for the `resubmit` duplicate submission guard.

use std::sync::Arc;

use aerosol::Aero;
use axum::Router;
use resubmit::{GuardConfig, SubmissionTracker};

pub mod api;
pub mod guards;
pub mod ledger;
pub mod telemetry;

/// Assemble the service around a shared tracker and ledger.
pub fn app(config: GuardConfig, tracker: Arc<SubmissionTracker>, ledger: ledger::Ledger) -> Router {
    let state: api::State = Aero::new().with(tracker.clone()).with(ledger);
    let guards = guards::Guards::new(config, tracker);
    api::router(state, &guards)
}
