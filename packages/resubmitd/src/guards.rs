//! Duplicate submission guards for the API.
//!
//! Every guard shares one [`SubmissionTracker`], so a submission is tracked
//! once no matter which route accepted it. Routes differ only in how long a
//! submission is remembered and which bodies are eligible.

use std::{sync::Arc, time::Duration};

use resubmit::{GuardConfig, GuardLayer, SubmissionTracker};

/// Retention cap for the echo route, which has no side effects worth
/// protecting for long.
pub const ECHO_TTL: Duration = Duration::from_secs(1);

/// Factory for the guard layers used by the API routes.
#[derive(Clone, Debug)]
pub struct Guards {
    base: GuardConfig,
    tracker: Arc<SubmissionTracker>,
}

impl Guards {
    pub fn new(base: GuardConfig, tracker: Arc<SubmissionTracker>) -> Self {
        Self { base, tracker }
    }

    pub fn tracker(&self) -> &Arc<SubmissionTracker> {
        &self.tracker
    }

    /// Guard for routes that create resources.
    ///
    /// Uses the configured settings unchanged.
    ///
    /// ## Usage
    ///
    /// ```ignore
    /// Router::new()
    ///     .route("/", post(create))
    ///     .route_layer(guards.standard())
    /// ```
    pub fn standard(&self) -> GuardLayer {
        GuardLayer::new(self.base.clone(), self.tracker.clone())
    }

    /// Guard for routes without side effects.
    ///
    /// Retention is capped at [`ECHO_TTL`].
    pub fn brief(&self) -> GuardLayer {
        let config = GuardConfig {
            ttl: self.base.ttl.min(ECHO_TTL),
            ..self.base.clone()
        };
        GuardLayer::new(config, self.tracker.clone())
    }
}
