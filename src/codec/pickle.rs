//! The object-graph codec, plus the reply encoders used for every client
//! response.
//!
//! Upstream payloads are decoded at the value level and validated
//! structurally here, since nothing about the format is schema-checked: a
//! glob response must be a list of dicts keyed by `metric_path`, a render
//! response a list whose first element is a dict with `name`, `start`,
//! `step` and `values`. Absent samples travel as pickled `None`.

use std::collections::BTreeMap;

use serde_pickle::value::{HashableValue, Value};
use serde_pickle::{DeOptions, SerOptions};

use super::{Codec, CodecError, GlobMatch, PointSeries};

pub struct PickleCodec;

impl Codec for PickleCodec {
    fn decode_find(&self, body: &[u8]) -> Result<Vec<GlobMatch>, CodecError> {
        let value = serde_pickle::value_from_slice(body, DeOptions::new())?;
        let Value::List(items) = value else {
            return Err(structure("glob response is not a list"));
        };
        items.iter().map(glob_match).collect()
    }

    fn decode_render(&self, body: &[u8]) -> Result<Option<PointSeries>, CodecError> {
        let value = serde_pickle::value_from_slice(body, DeOptions::new())?;
        let Value::List(items) = value else {
            return Err(structure("render response is not a list"));
        };
        let Some(first) = items.first() else {
            return Ok(None);
        };
        let series = dict(first, "series")?;

        let name = match field(series, "name") {
            Some(Value::String(name)) => name.clone(),
            _ => return Err(structure("series name is missing or not a string")),
        };
        let start_time = int_field(series, "start")?;
        let step_time = int_field(series, "step")?;

        let raw_values = match field(series, "values") {
            Some(Value::List(values)) => values,
            _ => return Err(structure("series values are missing or not a list")),
        };
        let mut values = Vec::with_capacity(raw_values.len());
        let mut is_absent = Vec::with_capacity(raw_values.len());
        for sample in raw_values {
            match sample {
                Value::None => {
                    values.push(0.0);
                    is_absent.push(true);
                }
                Value::F64(v) => {
                    values.push(*v);
                    is_absent.push(false);
                }
                Value::I64(v) => {
                    values.push(*v as f64);
                    is_absent.push(false);
                }
                _ => return Err(structure("sample is neither a number nor None")),
            }
        }

        Ok(Some(PointSeries {
            name,
            start_time,
            step_time,
            values,
            is_absent,
        }))
    }
}

fn glob_match(item: &Value) -> Result<GlobMatch, CodecError> {
    let entry = dict(item, "glob entry")?;
    let path = match field(entry, "metric_path") {
        Some(Value::String(path)) => path.clone(),
        _ => return Err(structure("metric_path is missing or not a string")),
    };
    // a missing leaf flag reads as leaf, same as the binary schema
    let is_leaf = match field(entry, "isLeaf") {
        None => true,
        Some(Value::Bool(leaf)) => *leaf,
        Some(_) => return Err(structure("isLeaf is not a bool")),
    };
    Ok(GlobMatch { path, is_leaf })
}

fn dict<'a>(value: &'a Value, what: &str) -> Result<&'a BTreeMap<HashableValue, Value>, CodecError> {
    match value {
        Value::Dict(entries) => Ok(entries),
        _ => Err(structure(format!("{what} is not a dict"))),
    }
}

fn field<'a>(entries: &'a BTreeMap<HashableValue, Value>, key: &str) -> Option<&'a Value> {
    entries.get(&HashableValue::String(key.to_string()))
}

fn int_field(entries: &BTreeMap<HashableValue, Value>, key: &str) -> Result<i64, CodecError> {
    match field(entries, key) {
        Some(Value::I64(v)) => Ok(*v),
        _ => Err(structure(format!("{key} is missing or not an integer"))),
    }
}

fn structure(message: impl Into<String>) -> CodecError {
    CodecError::Structure(message.into())
}

/// Encode a merged find result for the client: a pickled list of
/// `{metric_path, isLeaf}` dicts.
pub fn encode_find_reply(metrics: &[GlobMatch]) -> Result<Vec<u8>, serde_pickle::Error> {
    let items = metrics
        .iter()
        .map(|m| {
            let mut entry = BTreeMap::new();
            entry.insert(key("metric_path"), Value::String(m.path.clone()));
            entry.insert(key("isLeaf"), Value::Bool(m.is_leaf));
            Value::Dict(entry)
        })
        .collect();
    serde_pickle::value_to_vec(&Value::List(items), SerOptions::new())
}

/// Encode a merged series for the client: a pickled
/// `{name, start, step, end, values}` dict with `None` absent markers.
pub fn encode_render_reply(
    name: &str,
    start_time: i64,
    step_time: i64,
    values: &[Option<f64>],
) -> Result<Vec<u8>, serde_pickle::Error> {
    let samples = values
        .iter()
        .map(|sample| match sample {
            Some(v) => Value::F64(*v),
            None => Value::None,
        })
        .collect();

    let mut reply = BTreeMap::new();
    reply.insert(key("name"), Value::String(name.to_string()));
    reply.insert(key("start"), Value::I64(start_time));
    reply.insert(key("step"), Value::I64(step_time));
    // legacy wire shape: end mirrors start
    reply.insert(key("end"), Value::I64(start_time));
    reply.insert(key("values"), Value::List(samples));
    serde_pickle::value_to_vec(&Value::Dict(reply), SerOptions::new())
}

fn key(name: &str) -> HashableValue {
    HashableValue::String(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::{pickle_glob_body, pickle_series_body};

    #[test]
    fn decodes_a_glob_response() {
        let body = pickle_glob_body(&[("servers.web1.cpu", true), ("servers.web1", false)]);
        let matches = PickleCodec.decode_find(&body).unwrap();
        assert_eq!(
            matches,
            vec![
                GlobMatch {
                    path: "servers.web1.cpu".to_string(),
                    is_leaf: true,
                },
                GlobMatch {
                    path: "servers.web1".to_string(),
                    is_leaf: false,
                },
            ]
        );
    }

    #[test]
    fn glob_without_leaf_flag_reads_as_leaf() {
        let mut entry = BTreeMap::new();
        entry.insert(key("metric_path"), Value::String("a.b".to_string()));
        let body =
            serde_pickle::value_to_vec(&Value::List(vec![Value::Dict(entry)]), SerOptions::new())
                .unwrap();
        let matches = PickleCodec.decode_find(&body).unwrap();
        assert!(matches[0].is_leaf);
    }

    #[test]
    fn glob_structural_mismatches_are_errors() {
        // top level not a list
        let not_a_list =
            serde_pickle::value_to_vec(&Value::I64(3), SerOptions::new()).unwrap();
        assert!(matches!(
            PickleCodec.decode_find(&not_a_list),
            Err(CodecError::Structure(_))
        ));

        // element not a dict
        let bad_element =
            serde_pickle::value_to_vec(&Value::List(vec![Value::I64(3)]), SerOptions::new())
                .unwrap();
        assert!(matches!(
            PickleCodec.decode_find(&bad_element),
            Err(CodecError::Structure(_))
        ));

        // metric_path not a string
        let mut entry = BTreeMap::new();
        entry.insert(key("metric_path"), Value::I64(7));
        let bad_path =
            serde_pickle::value_to_vec(&Value::List(vec![Value::Dict(entry)]), SerOptions::new())
                .unwrap();
        assert!(matches!(
            PickleCodec.decode_find(&bad_path),
            Err(CodecError::Structure(_))
        ));
    }

    #[test]
    fn garbage_bytes_are_a_decode_error() {
        assert!(PickleCodec.decode_find(b"not a pickle").is_err());
        assert!(PickleCodec.decode_render(b"not a pickle").is_err());
    }

    #[test]
    fn decodes_a_series_with_absent_samples() {
        let body = pickle_series_body("a.b", 100, 60, &[Some(1.0), None, Some(3.0)]);
        let series = PickleCodec.decode_render(&body).unwrap().unwrap();
        assert_eq!(series.name, "a.b");
        assert_eq!(series.start_time, 100);
        assert_eq!(series.step_time, 60);
        assert_eq!(series.values, vec![1.0, 0.0, 3.0]);
        assert_eq!(series.is_absent, vec![false, true, false]);
    }

    #[test]
    fn empty_render_response_is_skippable() {
        let body =
            serde_pickle::value_to_vec(&Value::List(vec![]), SerOptions::new()).unwrap();
        assert!(PickleCodec.decode_render(&body).unwrap().is_none());
    }

    #[test]
    fn integer_samples_are_accepted() {
        let mut series = BTreeMap::new();
        series.insert(key("name"), Value::String("a.b".to_string()));
        series.insert(key("start"), Value::I64(0));
        series.insert(key("step"), Value::I64(60));
        series.insert(key("values"), Value::List(vec![Value::I64(4)]));
        let body = serde_pickle::value_to_vec(
            &Value::List(vec![Value::Dict(series)]),
            SerOptions::new(),
        )
        .unwrap();
        let decoded = PickleCodec.decode_render(&body).unwrap().unwrap();
        assert_eq!(decoded.values, vec![4.0]);
        assert_eq!(decoded.is_absent, vec![false]);
    }

    #[test]
    fn render_reply_carries_start_as_end() {
        let body = encode_render_reply("a.b", 100, 60, &[Some(1.0), None]).unwrap();
        let value = serde_pickle::value_from_slice(&body, DeOptions::new()).unwrap();
        let Value::Dict(reply) = value else {
            panic!("reply is not a dict");
        };
        assert_eq!(field(&reply, "end"), Some(&Value::I64(100)));
        assert_eq!(
            field(&reply, "values"),
            Some(&Value::List(vec![Value::F64(1.0), Value::None]))
        );
    }

    #[test]
    fn find_reply_is_decodable_by_the_same_codec() {
        let metrics = vec![GlobMatch {
            path: "x.y".to_string(),
            is_leaf: true,
        }];
        let body = encode_find_reply(&metrics).unwrap();
        assert_eq!(PickleCodec.decode_find(&body).unwrap(), metrics);
    }
}
