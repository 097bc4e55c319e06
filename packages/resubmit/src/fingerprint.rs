//! Request fingerprints.
//!
//! A [`Fingerprint`] is the blake3 hash of a framed serialization of the
//! request's method, normalized target, optional caller identity and body.
//! Each field is written as `tag || length (u64 le) || bytes` in a fixed
//! order, so distinct field tuples never share a hash input.
//!
//! Bodies are hashed byte-exact by default: JSON bodies that differ only in
//! whitespace or key order are distinct submissions. [`BodyEncoding::CanonicalJson`]
//! hashes a key-sorted compact re-serialization instead. Whichever is chosen
//! applies to every request the [`Fingerprinter`] sees.

use derive_more::{Debug, Display};
use http::HeaderName;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use tracing::{instrument, trace};

use crate::{
    body::{Captured, Snapshot},
    error::UnsupportedContentType,
};

const SCHEME: &[u8] = b"resubmit/v1";

const TAG_SCHEME: u8 = 0;
const TAG_METHOD: u8 = 1;
const TAG_TARGET: u8 = 2;
const TAG_IDENTITY: u8 = 3;
const TAG_BODY: u8 = 4;

/// Deterministic key identifying semantically identical submissions.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Display)]
#[display("{}", self.to_hex())]
#[debug("Fingerprint({})", self.to_hex())]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Create a fingerprint from a blake3 hash.
    pub fn from_blake3(hash: blake3::Hash) -> Self {
        Self(*hash.as_bytes())
    }

    /// View the fingerprint as a hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a fingerprint from a hex string.
    pub fn from_hex(hex: impl AsRef<str>) -> Result<Self, hex::FromHexError> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(hex.as_ref(), &mut bytes)?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl Serialize for Fingerprint {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let hex = String::deserialize(deserializer)?;
        Self::from_hex(&hex).map_err(serde::de::Error::custom)
    }
}

/// How request bodies are fed into the fingerprint.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub enum BodyEncoding {
    /// Hash the body bytes exactly as received.
    #[default]
    Exact,

    /// Hash the compact, key-sorted JSON re-serialization of the body.
    /// Bodies that are not valid JSON are hashed exactly.
    CanonicalJson,
}

/// Whose submissions are deduplicated against each other.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub enum Identity {
    /// Identical requests from any caller are duplicates.
    #[default]
    Global,

    /// Only identical requests carrying the same value in this header are
    /// duplicates. A missing header counts as the empty identity.
    Header(HeaderName),
}

/// Computes fingerprints for captured requests.
#[derive(Clone, Debug, Default)]
pub struct Fingerprinter {
    identity: Identity,
    encoding: BodyEncoding,
}

impl Fingerprinter {
    pub fn new(identity: Identity, encoding: BodyEncoding) -> Self {
        Self { identity, encoding }
    }

    /// Fingerprint a captured request.
    ///
    /// Bypassed requests were never buffered and cannot be fingerprinted
    /// without consuming their body; they report [`UnsupportedContentType`].
    pub fn fingerprint(&self, captured: &Captured) -> Result<Fingerprint, UnsupportedContentType> {
        match captured {
            Captured::Buffered(snapshot) => Ok(self.fingerprint_snapshot(snapshot)),
            Captured::Bypassed(request) => Err(UnsupportedContentType {
                content_type: request
                    .headers()
                    .get(http::header::CONTENT_TYPE)
                    .and_then(|value| value.to_str().ok())
                    .map(String::from),
            }),
        }
    }

    /// Fingerprint a buffered request snapshot.
    #[instrument(skip_all, fields(method = %snapshot.method(), path = snapshot.path()))]
    pub fn fingerprint_snapshot(&self, snapshot: &Snapshot) -> Fingerprint {
        let mut target = normalize_path(snapshot.path());
        if let Some(query) = snapshot.query() {
            target.push('?');
            target.push_str(query);
        }

        let identity = match &self.identity {
            Identity::Global => &[][..],
            Identity::Header(name) => snapshot
                .headers()
                .get(name)
                .map(|value| value.as_bytes())
                .unwrap_or_default(),
        };

        let body = snapshot.body().as_slice();
        let canonical = match self.encoding {
            BodyEncoding::Exact => None,
            BodyEncoding::CanonicalJson => canonical_json(body),
        };

        let mut hasher = blake3::Hasher::new();
        write_field(&mut hasher, TAG_SCHEME, SCHEME);
        write_field(&mut hasher, TAG_METHOD, snapshot.method().as_str().as_bytes());
        write_field(&mut hasher, TAG_TARGET, target.as_bytes());
        write_field(&mut hasher, TAG_IDENTITY, identity);
        write_field(&mut hasher, TAG_BODY, canonical.as_deref().unwrap_or(body));
        let fingerprint = Fingerprint::from_blake3(hasher.finalize());

        trace!(%fingerprint, %target, body_bytes = body.len(), "fingerprint.computed");
        fingerprint
    }
}

fn write_field(hasher: &mut blake3::Hasher, tag: u8, bytes: &[u8]) {
    hasher.update(&[tag]);
    hasher.update(&(bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

/// Collapse repeated slashes and drop any trailing slash; the root stays `/`.
fn normalize_path(path: &str) -> String {
    let mut normalized = String::with_capacity(path.len());
    for segment in path.split('/').filter(|segment| !segment.is_empty()) {
        normalized.push('/');
        normalized.push_str(segment);
    }
    if normalized.is_empty() {
        normalized.push('/');
    }
    normalized
}

fn canonical_json(body: &[u8]) -> Option<Vec<u8>> {
    let value = serde_json::from_slice::<Value>(body).ok()?;
    serde_json::to_vec(&sort_keys(value)).ok()
}

// Rebuilt explicitly so the ordering holds even if `preserve_order` is enabled
// on serde_json somewhere in the dependency graph.
fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries = map.into_iter().collect::<Vec<_>>();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));
            entries
                .into_iter()
                .map(|(key, value)| (key, sort_keys(value)))
                .collect::<Map<_, _>>()
                .into()
        }
        Value::Array(items) => items.into_iter().map(sort_keys).collect(),
        other => other,
    }
}
