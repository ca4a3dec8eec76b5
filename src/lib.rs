//! A fan-out proxy for metric queries.
//!
//! Sits in front of a cluster of storage backends, broadcasts each find or
//! render query to the backends that may hold the answer, merges whatever
//! comes back within the deadline, and replies in the object-graph wire
//! format. Glob responses feed a routing hint table so later render queries
//! only visit the backends that actually hold the metric.

pub mod codec;
pub mod config;
pub mod errors;
pub mod executor;
pub mod find;
pub mod graphite;
mod http;
pub mod metrics_defs;
pub mod render;
pub mod routing;
pub mod stats;

#[cfg(test)]
mod testutils;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use http_body_util::{BodyExt, Full};
use hyper::body::{Body, Bytes};
use hyper::service::Service;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use tokio::net::TcpListener;

use crate::codec::pb::PbCodec;
use crate::codec::pickle::PickleCodec;
use crate::codec::Codec;
use crate::config::Config;
use crate::errors::{Result, ZipperError};
use crate::executor::Executor;
use crate::graphite::GraphiteExporter;
use crate::http::error_response;
use crate::routing::RoutingTable;
use crate::stats::Stats;

/// Bring the proxy up and serve until the listener fails. Each accepted
/// connection gets its own task, so one slow client never blocks another.
pub async fn run(config: Config) -> Result<()> {
    let stats = Arc::new(Stats::new(config.buckets));

    if let Some(sink) = config.graphite_sink() {
        tokio::spawn(GraphiteExporter::new(sink).run(stats.clone()));
    }

    let port = config.port;
    let service = Arc::new(ZipperService::new(&config, stats));

    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(port, "listening");

    loop {
        let (stream, _) = listener.accept().await?;
        let _ = stream.set_nodelay(true);
        let service = service.clone();

        tokio::spawn(async move {
            let _ = auto::Builder::new(TokioExecutor::new())
                .serve_connection(TokioIo::new(stream), service)
                .await;
        });
    }
}

/// Everything the handlers share, wired up once at startup.
pub struct App {
    pub(crate) backends: Vec<String>,
    pub(crate) codec: Arc<dyn Codec>,
    pub(crate) executor: Executor,
    pub(crate) routing: RoutingTable,
    pub(crate) stats: Arc<Stats>,
}

pub struct ZipperService {
    app: Arc<App>,
}

impl ZipperService {
    pub fn new(config: &Config, stats: Arc<Stats>) -> Self {
        let codec: Arc<dyn Codec> = if config.use_pb {
            Arc::new(PbCodec)
        } else {
            Arc::new(PickleCodec)
        };
        ZipperService {
            app: Arc::new(App {
                backends: config.backends.clone(),
                codec,
                executor: Executor::new(stats.clone()),
                routing: RoutingTable::new(),
                stats,
            }),
        }
    }
}

impl<B> Service<Request<B>> for ZipperService
where
    B: Body + Send + 'static,
    B::Data: Send,
    B::Error: std::error::Error + Send + Sync + 'static,
{
    type Response = Response<Full<Bytes>>;
    type Error = ZipperError;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<B>) -> Self::Future {
        let app = self.app.clone();

        Box::pin(async move {
            let (parts, body) = req.into_parts();
            let path = parts.uri.path().to_owned();

            let response = if path.starts_with("/metrics/find/") {
                app.stats.incr_requests();
                let started = Instant::now();
                let response = find::handle(&app, &parts.uri).await;
                app.stats.observe(started.elapsed(), &parts.uri.to_string());
                response
            } else if path.starts_with("/render/") {
                app.stats.incr_requests();
                let started = Instant::now();
                let body = match body.collect().await {
                    Ok(collected) => collected.to_bytes(),
                    Err(_) => {
                        let response =
                            error_response(StatusCode::BAD_REQUEST, "error reading request body");
                        app.stats.observe(started.elapsed(), &parts.uri.to_string());
                        return Ok(response.map(Full::new));
                    }
                };
                let response = render::handle(&app, &parts, &body).await;
                app.stats.observe(started.elapsed(), &parts.uri.to_string());
                response
            } else if path == "/debug/vars" {
                debug_vars(&app.stats)
            } else {
                error_response(StatusCode::NOT_FOUND, "not found")
            };

            Ok(response.map(Full::new))
        })
    }
}

/// Counter snapshot as JSON, in the spirit of a process-vars endpoint.
fn debug_vars(stats: &Stats) -> Response<Bytes> {
    let vars = serde_json::json!({
        "requests": stats.requests(),
        "errors": stats.errors(),
        "timeouts": stats.timeouts(),
        "requestBuckets": stats.bucket_counts(),
    });
    let mut response = Response::new(Bytes::from(vars.to_string()));
    response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("application/json"),
    );
    response
}
