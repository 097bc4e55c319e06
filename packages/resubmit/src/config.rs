//! Guard configuration.

use std::time::Duration;

use bon::Builder;
use derive_more::Debug;
use http::Method;

use crate::{
    body::BodyPolicy,
    fingerprint::{BodyEncoding, Fingerprinter, Identity},
};

/// Settings for a [`crate::GuardLayer`].
///
/// ```
/// # use std::time::Duration;
/// # use resubmit::{GuardConfig, Identity};
/// let config = GuardConfig::builder()
///     .ttl(Duration::from_secs(2))
///     .identity(Identity::Header(http::HeaderName::from_static("x-session-id")))
///     .build();
/// assert_eq!(config.max_body_bytes, GuardConfig::DEFAULT_MAX_BODY_BYTES);
/// ```
#[derive(Clone, Debug, Builder)]
pub struct GuardConfig {
    /// Content type prefixes whose bodies are buffered and fingerprinted,
    /// compared case-insensitively. Other requests are never deduplicated.
    #[builder(default = vec![String::from("application/json")])]
    pub eligible_content_types: Vec<String>,

    /// Largest body the guard will buffer.
    #[builder(default = GuardConfig::DEFAULT_MAX_BODY_BYTES)]
    pub max_body_bytes: usize,

    /// Retention window for a submission, measured from completion (or from
    /// admission for submissions that never complete).
    #[builder(default = GuardConfig::DEFAULT_TTL)]
    pub ttl: Duration,

    /// Whether duplicates are detected globally or per caller.
    #[builder(default)]
    pub identity: Identity,

    /// How bodies are hashed.
    #[builder(default)]
    pub body_encoding: BodyEncoding,

    /// Methods that skip deduplication entirely.
    #[builder(default = vec![Method::GET, Method::HEAD, Method::OPTIONS])]
    pub exempt_methods: Vec<Method>,
}

impl GuardConfig {
    pub const DEFAULT_TTL: Duration = Duration::from_secs(5);
    pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

    pub fn body_policy(&self) -> BodyPolicy {
        BodyPolicy {
            eligible_content_types: self.eligible_content_types.clone(),
            max_body_bytes: self.max_body_bytes,
        }
    }

    pub fn fingerprinter(&self) -> Fingerprinter {
        Fingerprinter::new(self.identity.clone(), self.body_encoding)
    }

    pub fn is_exempt(&self, method: &Method) -> bool {
        self.exempt_methods.contains(method)
    }
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}
