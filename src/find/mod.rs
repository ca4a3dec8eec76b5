//! The find endpoint: resolve a glob expression against every backend,
//! union the answers, and remember which backend holds what.

mod merger;

pub use merger::{merge, FindMerge};

use http::Uri;
use hyper::body::Bytes;
use hyper::{Response, StatusCode};

use crate::codec::pickle;
use crate::http::{error_response, pickle_response};
use crate::App;

pub(crate) async fn handle(app: &App, uri: &Uri) -> Response<Bytes> {
    tracing::debug!(%uri, "find request");

    let upstream = app.codec.upstream_uri(uri);
    let responses = app.executor.multi_get(&app.backends, &upstream).await;

    if responses.is_empty() {
        tracing::warn!(path = %upstream, "error querying backends");
        app.stats.incr_errors();
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, "error querying backends");
    }

    let merged = merger::merge(&responses, app.codec.as_ref(), &app.stats);
    app.routing.update(merged.paths);

    match pickle::encode_find_reply(&merged.metrics) {
        Ok(body) => pickle_response(body),
        Err(error) => {
            tracing::error!(%error, "error encoding find reply");
            app.stats.incr_errors();
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "error encoding response")
        }
    }
}
