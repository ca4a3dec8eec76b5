//! Upstream wire codecs.
//!
//! Backends speak one of two encodings, chosen globally by configuration: a
//! schema-checked binary format ([`pb::PbCodec`]) or the unchecked
//! object-graph format ([`pickle::PickleCodec`]). The mergers are
//! codec-agnostic; structural validation of the unchecked format lives in
//! its decoder, not in the merge logic. Clients always receive the
//! object-graph format regardless of which codec is active upstream.

pub mod pb;
pub mod pickle;

use http::Uri;
use thiserror::Error;

/// One entry of a decoded glob response.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobMatch {
    pub path: String,
    pub is_leaf: bool,
}

/// One backend's copy of a point series.
///
/// Invariant: `values.len() == is_absent.len()`; the decoders enforce it.
/// The sample at index `i` is present iff `is_absent[i]` is false.
#[derive(Debug, Clone, PartialEq)]
pub struct PointSeries {
    pub name: String,
    pub start_time: i64,
    pub step_time: i64,
    pub values: Vec<f64>,
    pub is_absent: Vec<bool>,
}

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("pickle decode failed: {0}")]
    Pickle(#[from] serde_pickle::Error),

    #[error("protobuf decode failed: {0}")]
    Protobuf(#[from] prost::DecodeError),

    #[error("malformed response: {0}")]
    Structure(String),

    #[error("series carries {values} values but {flags} absence flags")]
    LengthMismatch { values: usize, flags: usize },
}

pub trait Codec: Send + Sync {
    fn decode_find(&self, body: &[u8]) -> Result<Vec<GlobMatch>, CodecError>;

    /// Decode one render response. `Ok(None)` means the backend answered with
    /// an empty result set, which is skipped without being an error.
    fn decode_render(&self, body: &[u8]) -> Result<Option<PointSeries>, CodecError>;

    /// Path-and-query to send upstream for the given client request.
    fn upstream_uri(&self, uri: &Uri) -> String {
        match uri.path_and_query() {
            Some(pq) => pq.as_str().to_string(),
            None => uri.path().to_string(),
        }
    }
}
