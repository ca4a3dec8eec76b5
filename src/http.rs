//! HTTP plumbing: the shared backend client, the single-backend GET used by
//! the fan-out executor, and the reply constructors.

use http_body_util::{BodyExt, Empty};
use hyper::body::Bytes;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Request, Response, StatusCode};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::time::Duration;
use tokio::time::timeout;

pub type BackendClient = Client<HttpConnector, Empty<Bytes>>;

/// One client instance is shared by every request; hyper's pool handles the
/// concurrency.
pub fn new_backend_client() -> BackendClient {
    Client::builder(TokioExecutor::new()).build(HttpConnector::new())
}

/// GET `backend + path_and_query` and return the body, or `None` when the
/// backend had nothing usable to say.
///
/// `timeout` covers the round trip up to the response headers; reading the
/// body afterwards is bounded only by the backend. A 404 means the backend
/// does not hold the queried metric and is absorbed silently; every other
/// failure is logged at warning level. Nothing here is ever an error for the
/// request as a whole.
pub async fn get_backend(
    client: &BackendClient,
    backend: &str,
    path_and_query: &str,
    header_timeout: Duration,
) -> Option<Bytes> {
    let raw = format!("{backend}{path_and_query}");
    if let Err(error) = url::Url::parse(&raw) {
        tracing::warn!(url = %raw, %error, "error parsing backend url");
        return None;
    }
    let uri: hyper::Uri = match raw.parse() {
        Ok(uri) => uri,
        Err(error) => {
            tracing::warn!(url = %raw, %error, "error parsing backend url");
            return None;
        }
    };

    let request = match Request::builder().uri(uri).body(Empty::<Bytes>::new()) {
        Ok(request) => request,
        Err(error) => {
            tracing::warn!(url = %raw, %error, "error building backend request");
            return None;
        }
    };

    let response = match timeout(header_timeout, client.request(request)).await {
        Err(_) => {
            tracing::warn!(backend, path = path_and_query, "backend response timed out");
            return None;
        }
        Ok(Err(error)) => {
            tracing::warn!(backend, path = path_and_query, %error, "error querying backend");
            return None;
        }
        Ok(Ok(response)) => response,
    };

    match response.status() {
        StatusCode::OK => {}
        // the backend's way of saying it doesn't have this metric
        StatusCode::NOT_FOUND => return None,
        status => {
            tracing::warn!(backend, path = path_and_query, %status, "bad response code");
            return None;
        }
    }

    match response.into_body().collect().await {
        Ok(collected) => Some(collected.to_bytes()),
        Err(error) => {
            tracing::warn!(backend, path = path_and_query, %error, "error reading body");
            None
        }
    }
}

/// Plain-text error reply, the message alone as the body.
pub fn error_response(status: StatusCode, message: &str) -> Response<Bytes> {
    let mut response = Response::new(Bytes::from(message.to_string()));
    *response.status_mut() = status;
    response
}

/// A 200 carrying an object-graph payload.
pub fn pickle_response(body: Vec<u8>) -> Response<Bytes> {
    let mut response = Response::new(Bytes::from(body));
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/pickle"));
    response
}
