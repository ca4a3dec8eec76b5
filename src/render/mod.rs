//! The render endpoint: fetch one metric's samples from the backends that
//! hold it (or all of them, when the hint table has nothing) and gap-fill a
//! single series out of the copies.

mod merger;

pub use merger::{merge, MergedSeries};

use http::request::Parts;
use hyper::body::Bytes;
use hyper::header::CONTENT_TYPE;
use hyper::{Method, Response, StatusCode};
use url::form_urlencoded;

use crate::codec::pickle;
use crate::http::{error_response, pickle_response};
use crate::App;

pub(crate) async fn handle(app: &App, parts: &Parts, body: &Bytes) -> Response<Bytes> {
    tracing::debug!(uri = %parts.uri, "render request");

    let Some(target) = target_value(parts, body) else {
        return error_response(StatusCode::BAD_REQUEST, "empty target");
    };

    // scope the fan-out to the backends known to hold this metric
    let backends = match app.routing.lookup(&target) {
        Some(hinted) => hinted,
        None => app.backends.clone(),
    };

    let upstream = app.codec.upstream_uri(&parts.uri);
    let responses = app.executor.multi_get(&backends, &upstream).await;

    if responses.is_empty() {
        tracing::warn!(path = %upstream, ?backends, "error querying backends");
        app.stats.incr_errors();
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, "error querying backends");
    }

    let Some(series) = merger::merge(&responses, app.codec.as_ref(), &app.stats) else {
        tracing::warn!(path = %upstream, "no decodable responses to merge");
        app.stats.incr_errors();
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "no decodable responses to merge",
        );
    };

    match pickle::encode_render_reply(
        &series.name,
        series.start_time,
        series.step_time,
        &series.values,
    ) {
        Ok(reply) => pickle_response(reply),
        Err(error) => {
            tracing::error!(%error, "error encoding render reply");
            app.stats.incr_errors();
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "error encoding response")
        }
    }
}

/// The `target` form field: the urlencoded POST body takes precedence, then
/// the query string. An empty value counts as missing.
fn target_value(parts: &Parts, body: &Bytes) -> Option<String> {
    if parts.method == Method::POST && has_form_body(parts) {
        if let Some(target) = pair_value(body, "target") {
            return Some(target);
        }
    }
    parts
        .uri
        .query()
        .and_then(|query| pair_value(query.as_bytes(), "target"))
}

fn has_form_body(parts: &Parts) -> bool {
    parts
        .headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.starts_with("application/x-www-form-urlencoded"))
        .unwrap_or(false)
}

fn pair_value(raw: &[u8], key: &str) -> Option<String> {
    form_urlencoded::parse(raw)
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
        .filter(|v| !v.is_empty())
}
