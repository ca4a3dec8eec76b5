//! Test-only helpers: disposable backend servers and wire-format fixtures.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use serde_pickle::value::{HashableValue, Value};
use serde_pickle::{DeOptions, SerOptions};
use tokio::net::TcpListener;

/// Maps a request's path-and-query to a canned reply.
pub type MockReply = Arc<dyn Fn(&str) -> (StatusCode, Bytes) + Send + Sync>;

pub fn fixed_reply(status: StatusCode, body: Vec<u8>) -> MockReply {
    let body = Bytes::from(body);
    Arc::new(move |_| (status, body.clone()))
}

/// A fake storage backend listening on an ephemeral port.
pub struct MockBackend {
    pub url: String,
    hits: Arc<AtomicUsize>,
}

impl MockBackend {
    pub fn hit_count(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

pub async fn spawn_backend(reply: MockReply, delay: Option<Duration>) -> MockBackend {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let hits = Arc::new(AtomicUsize::new(0));

    let hits_inner = hits.clone();
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            let io = TokioIo::new(stream);
            let reply = reply.clone();
            let hits = hits_inner.clone();

            tokio::spawn(async move {
                let service = service_fn(move |request: Request<Incoming>| {
                    let reply = reply.clone();
                    let hits = hits.clone();
                    async move {
                        hits.fetch_add(1, Ordering::SeqCst);
                        if let Some(delay) = delay {
                            tokio::time::sleep(delay).await;
                        }
                        let path = request
                            .uri()
                            .path_and_query()
                            .map(|pq| pq.as_str().to_string())
                            .unwrap_or_default();
                        let (status, body) = reply(&path);
                        let mut response = Response::new(Full::new(body));
                        *response.status_mut() = status;
                        Ok::<_, std::convert::Infallible>(response)
                    }
                });
                let _ = hyper_util::server::conn::auto::Builder::new(TokioExecutor::new())
                    .serve_connection(io, service)
                    .await;
            });
        }
    });

    MockBackend {
        url: format!("http://127.0.0.1:{port}"),
        hits,
    }
}

/// An object-graph glob response: a pickled list of
/// `{metric_path, isLeaf}` dicts.
pub fn pickle_glob_body(paths: &[(&str, bool)]) -> Vec<u8> {
    let items = paths
        .iter()
        .map(|(path, leaf)| {
            let mut entry = BTreeMap::new();
            entry.insert(
                HashableValue::String("metric_path".to_string()),
                Value::String((*path).to_string()),
            );
            entry.insert(
                HashableValue::String("isLeaf".to_string()),
                Value::Bool(*leaf),
            );
            Value::Dict(entry)
        })
        .collect();
    serde_pickle::value_to_vec(&Value::List(items), SerOptions::new()).unwrap()
}

/// An object-graph render response: a pickled list holding one
/// `{name, start, step, end, values}` dict, `None` for absent samples.
pub fn pickle_series_body(name: &str, start: i64, step: i64, values: &[Option<f64>]) -> Vec<u8> {
    let samples = values
        .iter()
        .map(|sample| match sample {
            Some(v) => Value::F64(*v),
            None => Value::None,
        })
        .collect();

    let mut series = BTreeMap::new();
    series.insert(
        HashableValue::String("name".to_string()),
        Value::String(name.to_string()),
    );
    series.insert(HashableValue::String("start".to_string()), Value::I64(start));
    series.insert(HashableValue::String("step".to_string()), Value::I64(step));
    series.insert(
        HashableValue::String("end".to_string()),
        Value::I64(start + step * values.len() as i64),
    );
    series.insert(HashableValue::String("values".to_string()), Value::List(samples));

    serde_pickle::value_to_vec(&Value::List(vec![Value::Dict(series)]), SerOptions::new()).unwrap()
}

/// Decode a pickled reply body for assertions.
pub fn pickle_value(body: &[u8]) -> Value {
    serde_pickle::value_from_slice(body, DeOptions::new()).unwrap()
}
