//! Duplicate submission guard for axum/tower request pipelines.
//!
//! The guard rejects a request when an identical one (same method, path and
//! body, optionally the same caller) was accepted within a retention window.
//! It is assembled from four pieces, leaves first:
//!
//! - [`body`]: captures a single-read request body once and exposes it as a
//!   [`ReplayableBody`] that can be read any number of times.
//! - [`fingerprint`]: derives a deterministic [`Fingerprint`] from the
//!   captured request.
//! - [`tracker`]: the in-memory [`SubmissionTracker`] that admits exactly one
//!   request per fingerprint until its record expires.
//! - [`guard`]: the tower [`GuardLayer`] that runs the above on every request
//!   and forwards or rejects it.
//!
//! ## Wiring
//!
//! ```ignore
//! use std::sync::Arc;
//! use resubmit::{GuardConfig, GuardLayer, SubmissionTracker};
//!
//! let tracker = Arc::new(SubmissionTracker::new());
//! let config = GuardConfig::builder().build();
//! Router::new()
//!     .route("/orders", post(create_order))
//!     .route_layer(GuardLayer::new(config, tracker));
//! ```
//!
//! A single tracker should be shared by every guard layer in the process;
//! layers with different TTLs can share it safely since the TTL is carried by
//! each record.

pub mod body;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod guard;
pub mod tracker;

pub use body::{BodyPolicy, Captured, ReplayableBody, Snapshot};
pub use config::GuardConfig;
pub use error::{CaptureError, GuardError, UnsupportedContentType};
pub use fingerprint::{BodyEncoding, Fingerprint, Fingerprinter, Identity};
pub use guard::{Decision, Guard, GuardLayer};
pub use tracker::{Admission, Generation, Permit, Rejection, SubmissionState, SubmissionTracker};
