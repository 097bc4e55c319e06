//! Replayable request bodies.
//!
//! An HTTP body is a stream that can be read exactly once. The guard has to
//! read it to compute a fingerprint, and the handler has to read it again to
//! do its work, so eligible bodies are captured once into a [`ReplayableBody`]
//! (reference counted bytes) and every later read is served from that buffer.
//!
//! Only bodies whose `Content-Type` matches one of the configured prefixes are
//! captured; everything else (file uploads, multipart forms, requests without
//! a content type) passes through untouched as [`Captured::Bypassed`].

use std::io::Cursor;

use axum::{
    body::{Body, Bytes},
    extract::{FromRequestParts, OriginalUri},
};
use derive_more::Debug;
use futures::TryStreamExt;
use http::{
    HeaderMap, Method, Request, StatusCode, Uri,
    header::{CONTENT_LENGTH, CONTENT_TYPE},
    request::Parts,
};
use tracing::{debug, instrument, trace};

use crate::error::CaptureError;

/// A request body that has been read into memory and can be read again any
/// number of times. Cloning is cheap: clones share the same buffer.
#[derive(Clone, Default, PartialEq, Eq, Debug)]
#[debug("ReplayableBody({} bytes)", self.0.len())]
pub struct ReplayableBody(Bytes);

impl ReplayableBody {
    /// Wrap an already buffered body.
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    /// The buffered bytes; each call hands out a new handle to the same buffer.
    pub fn bytes(&self) -> Bytes {
        self.0.clone()
    }

    /// View the buffered bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    /// An independent reader positioned at the start of the body.
    ///
    /// The cursor implements both [`std::io::Read`] and
    /// [`tokio::io::AsyncRead`]; readers never affect each other.
    pub fn reader(&self) -> Cursor<Bytes> {
        Cursor::new(self.0.clone())
    }

    /// A fresh [`Body`] streaming the buffered bytes.
    pub fn to_body(&self) -> Body {
        Body::from(self.0.clone())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for ReplayableBody {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Handlers behind the guard can extract the buffered body directly, as many
/// times as they like and alongside the regular body extractors.
impl<S: Send + Sync> FromRequestParts<S> for ReplayableBody {
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<ReplayableBody>()
            .cloned()
            .ok_or((
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                "Request body was not buffered for this content type",
            ))
    }
}

/// Which bodies get captured, and how large they may be.
#[derive(Clone, Debug)]
pub struct BodyPolicy {
    /// Content type prefixes, compared case-insensitively.
    pub eligible_content_types: Vec<String>,

    /// Bodies larger than this are refused rather than buffered.
    pub max_body_bytes: usize,
}

impl BodyPolicy {
    /// Whether the request declares a content type eligible for capture.
    pub fn is_eligible(&self, headers: &HeaderMap) -> bool {
        let Some(content_type) = content_type(headers) else {
            return false;
        };
        self.eligible_content_types.iter().any(|prefix| {
            content_type
                .as_bytes()
                .get(..prefix.len())
                .is_some_and(|head| head.eq_ignore_ascii_case(prefix.as_bytes()))
        })
    }
}

/// Immutable capture of a request: its head plus the buffered body.
#[derive(Debug)]
pub struct Snapshot {
    parts: Parts,
    body: ReplayableBody,
}

impl Snapshot {
    /// Assemble a snapshot from a request head and an already buffered body.
    pub fn from_parts(parts: Parts, body: ReplayableBody) -> Self {
        Self { parts, body }
    }

    pub fn method(&self) -> &Method {
        &self.parts.method
    }

    /// The request target as the client sent it.
    ///
    /// Nested axum routers strip their prefix from the URI; the original URI
    /// is preferred so that every route sees the same path namespace.
    pub fn uri(&self) -> &Uri {
        self.parts
            .extensions
            .get::<OriginalUri>()
            .map(|original| &original.0)
            .unwrap_or(&self.parts.uri)
    }

    pub fn path(&self) -> &str {
        self.uri().path()
    }

    pub fn query(&self) -> Option<&str> {
        self.uri().query()
    }

    pub fn content_type(&self) -> Option<&str> {
        content_type(&self.parts.headers)
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.parts.headers
    }

    pub fn body(&self) -> &ReplayableBody {
        &self.body
    }

    /// Rebuild the request with a body served from the buffer.
    ///
    /// The [`ReplayableBody`] is also stored in the request extensions so
    /// downstream code can read it again after consuming the body stream.
    pub fn into_request(self) -> Request<Body> {
        let Self { mut parts, body } = self;
        let stream = body.to_body();
        parts.extensions.insert(body);
        Request::from_parts(parts, stream)
    }
}

/// Outcome of [`capture`].
#[derive(Debug)]
pub enum Captured {
    /// The body was read into memory.
    Buffered(Snapshot),

    /// The content type is not eligible; the request is untouched.
    Bypassed(Request<Body>),
}

impl Captured {
    /// The request to hand downstream.
    pub fn into_request(self) -> Request<Body> {
        match self {
            Captured::Buffered(snapshot) => snapshot.into_request(),
            Captured::Bypassed(request) => request,
        }
    }
}

/// Read an eligible request body into memory.
///
/// A declared `Content-Length` above the cap is refused before reading
/// anything; bodies without one are refused as soon as the cap is crossed.
#[instrument(skip_all, fields(method = %request.method(), path = %request.uri().path()))]
pub async fn capture(request: Request<Body>, policy: &BodyPolicy) -> Result<Captured, CaptureError> {
    if !policy.is_eligible(request.headers()) {
        trace!(content_type = ?content_type(request.headers()), "body.bypass");
        return Ok(Captured::Bypassed(request));
    }

    let limit = policy.max_body_bytes;
    if declared_length(request.headers()).is_some_and(|len| len > limit) {
        debug!(limit, "body.too_large.declared");
        return Err(CaptureError::PayloadTooLarge { limit });
    }

    let (parts, body) = request.into_parts();
    let mut stream = body.into_data_stream();
    let mut buffer = Vec::new();
    while let Some(chunk) = stream.try_next().await.map_err(CaptureError::BodyRead)? {
        if buffer.len() + chunk.len() > limit {
            debug!(limit, "body.too_large.streamed");
            return Err(CaptureError::PayloadTooLarge { limit });
        }
        buffer.extend_from_slice(&chunk);
    }

    debug!(bytes = buffer.len(), "body.captured");
    Ok(Captured::Buffered(Snapshot::from_parts(
        parts,
        ReplayableBody::new(buffer),
    )))
}

fn content_type(headers: &HeaderMap) -> Option<&str> {
    headers.get(CONTENT_TYPE).and_then(|value| value.to_str().ok())
}

fn declared_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
}
