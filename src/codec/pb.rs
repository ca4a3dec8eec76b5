//! The binary codec: length-delimited protobuf structs matching the
//! backend's glob/fetch schema.

use http::Uri;
use prost::Message;
use url::form_urlencoded;

use super::{Codec, CodecError, GlobMatch, PointSeries};

#[derive(Clone, PartialEq, Message)]
pub struct GlobResponse {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, repeated, tag = "2")]
    pub paths: Vec<String>,
}

#[derive(Clone, PartialEq, Message)]
pub struct FetchResponse {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(int32, tag = "2")]
    pub start_time: i32,
    #[prost(int32, tag = "3")]
    pub stop_time: i32,
    #[prost(int32, tag = "4")]
    pub step_time: i32,
    #[prost(double, repeated, tag = "5")]
    pub values: Vec<f64>,
    #[prost(bool, repeated, tag = "6")]
    pub is_absent: Vec<bool>,
}

pub struct PbCodec;

impl Codec for PbCodec {
    fn decode_find(&self, body: &[u8]) -> Result<Vec<GlobMatch>, CodecError> {
        let glob = GlobResponse::decode(body)?;
        Ok(glob
            .paths
            .into_iter()
            // the schema carries no leaf flag
            .map(|path| GlobMatch {
                path,
                is_leaf: true,
            })
            .collect())
    }

    fn decode_render(&self, body: &[u8]) -> Result<Option<PointSeries>, CodecError> {
        let fetch = FetchResponse::decode(body)?;
        if fetch.values.len() != fetch.is_absent.len() {
            return Err(CodecError::LengthMismatch {
                values: fetch.values.len(),
                flags: fetch.is_absent.len(),
            });
        }
        Ok(Some(PointSeries {
            name: fetch.name,
            start_time: fetch.start_time as i64,
            step_time: fetch.step_time as i64,
            values: fetch.values,
            is_absent: fetch.is_absent,
        }))
    }

    fn upstream_uri(&self, uri: &Uri) -> String {
        let mut query = form_urlencoded::Serializer::new(String::new());
        if let Some(raw) = uri.query() {
            for (k, v) in form_urlencoded::parse(raw.as_bytes()) {
                if k != "format" {
                    query.append_pair(&k, &v);
                }
            }
        }
        query.append_pair("format", "protobuf");
        format!("{}?{}", uri.path(), query.finish())
    }
}
