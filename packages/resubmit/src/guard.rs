//! The guard middleware.
//!
//! For every request the guard:
//! 1. captures the body if its content type is eligible;
//! 2. fingerprints the captured request;
//! 3. asks the [`SubmissionTracker`] to admit the fingerprint;
//! 4. forwards the request with a replayable body, or short-circuits with a
//!    `409 Conflict` if an identical submission is in flight or retained.
//!
//! The [`Permit`] for an admitted request is held by the request future and
//! dropped when it finishes, which completes the submission whether the
//! handler returned, panicked, or was cancelled.

use std::{
    sync::Arc,
    task::{Context, Poll},
};

use axum::{
    body::Body,
    extract::OriginalUri,
    response::{IntoResponse, Response},
};
use derive_more::Debug;
use futures::future::BoxFuture;
use http::Request;
use tower::{Layer, Service};
use tracing::{debug, info, instrument, trace, warn};

use crate::{
    body::{self, BodyPolicy},
    config::GuardConfig,
    error::GuardError,
    fingerprint::Fingerprinter,
    tracker::{Permit, SubmissionTracker},
};

/// What to do with a request that the guard did not reject.
#[derive(Debug)]
pub enum Decision {
    /// The request was fingerprinted and admitted. Hold the permit until the
    /// handler is done with the request.
    Admitted {
        request: Request<Body>,
        permit: Permit,
    },

    /// Deduplication does not apply (exempt method or ineligible content
    /// type); the request is forwarded without any duplicate guarantee.
    Unchecked { request: Request<Body> },
}

/// Tower layer installing the duplicate submission guard.
///
/// Layers are cheap to clone. Several layers, e.g. with different TTLs for
/// different routes, may share one tracker.
#[derive(Clone, Debug)]
#[debug("GuardLayer(ttl = {:?})", self.shared.config.ttl)]
pub struct GuardLayer {
    shared: Arc<Shared>,
}

struct Shared {
    config: GuardConfig,
    policy: BodyPolicy,
    fingerprinter: Fingerprinter,
    tracker: Arc<SubmissionTracker>,
}

impl GuardLayer {
    pub fn new(config: GuardConfig, tracker: Arc<SubmissionTracker>) -> Self {
        let policy = config.body_policy();
        let fingerprinter = config.fingerprinter();
        Self {
            shared: Arc::new(Shared {
                config,
                policy,
                fingerprinter,
                tracker,
            }),
        }
    }

    pub fn config(&self) -> &GuardConfig {
        &self.shared.config
    }

    pub fn tracker(&self) -> &Arc<SubmissionTracker> {
        &self.shared.tracker
    }

    /// Decide whether the request may proceed.
    ///
    /// Errors are per-request: a failed capture never creates a record.
    #[instrument(name = "GuardLayer::check", skip_all, fields(method = %request.method(), path = %original_path(&request)))]
    pub async fn check(&self, request: Request<Body>) -> Result<Decision, GuardError> {
        let shared = &self.shared;
        if shared.config.is_exempt(request.method()) {
            trace!("guard.exempt");
            return Ok(Decision::Unchecked { request });
        }

        let captured = body::capture(request, &shared.policy).await?;
        let fingerprint = match shared.fingerprinter.fingerprint(&captured) {
            Ok(fingerprint) => fingerprint,
            Err(unsupported) => {
                debug!(content_type = ?unsupported.content_type, "guard.bypass");
                return Ok(Decision::Unchecked {
                    request: captured.into_request(),
                });
            }
        };

        match shared.tracker.admit(fingerprint, shared.config.ttl) {
            Ok(permit) => {
                debug!(%fingerprint, "guard.admit");
                let mut request = captured.into_request();
                request.extensions_mut().insert(fingerprint);
                Ok(Decision::Admitted { request, permit })
            }
            Err(rejection) => {
                info!(%fingerprint, state = %rejection.state, retry_after = ?rejection.retry_after, "guard.duplicate");
                Err(GuardError::DuplicateSubmission {
                    fingerprint,
                    rejection,
                })
            }
        }
    }
}

/// The path the client requested, before any nested router stripped its prefix.
fn original_path(request: &Request<Body>) -> &str {
    request
        .extensions()
        .get::<OriginalUri>()
        .map(|original| original.0.path())
        .unwrap_or_else(|| request.uri().path())
}

impl<S> Layer<S> for GuardLayer {
    type Service = Guard<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Guard {
            inner,
            layer: self.clone(),
        }
    }
}

/// Service produced by [`GuardLayer`].
#[derive(Clone, Debug)]
pub struct Guard<S> {
    inner: S,
    layer: GuardLayer,
}

impl<S> Service<Request<Body>> for Guard<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        // The readied service is the one that must handle this request.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let layer = self.layer.clone();

        Box::pin(async move {
            match layer.check(request).await {
                Ok(Decision::Admitted { request, permit }) => {
                    let response = inner.call(request).await;
                    drop(permit);
                    response
                }
                Ok(Decision::Unchecked { request }) => inner.call(request).await,
                Err(err @ GuardError::Capture(_)) => {
                    warn!(%err, "guard.capture_failed");
                    Ok(err.into_response())
                }
                Err(err) => Ok(err.into_response()),
            }
        })
    }
}
