//! The fan-out executor.
//!
//! One GET per backend, all in parallel, gathered in arrival order. The
//! collection deadline is armed lazily: until the first usable payload
//! lands, only the per-request header timeout bounds the wait; from then on
//! stragglers get a short grace window before the collector walks away with
//! whatever it has. A single slow replica therefore cannot stretch a query
//! beyond the grace window once real data has been seen.

use std::sync::Arc;
use std::time::Duration;

use hyper::body::Bytes;
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::http::{self, BackendClient};
use crate::stats::Stats;

/// A usable payload from one backend.
#[derive(Debug, Clone)]
pub struct ServerResponse {
    pub backend: String,
    pub body: Bytes,
}

#[derive(Debug, Clone, Copy)]
pub struct FanoutTimeouts {
    /// Per-backend wait for response headers.
    pub response_header: Duration,
    /// How long to keep waiting for stragglers after the first usable
    /// payload.
    pub grace: Duration,
}

impl Default for FanoutTimeouts {
    fn default() -> Self {
        FanoutTimeouts {
            response_header: Duration::from_secs(60),
            grace: Duration::from_secs(5),
        }
    }
}

pub struct Executor {
    client: BackendClient,
    timeouts: FanoutTimeouts,
    stats: Arc<Stats>,
}

impl Executor {
    pub fn new(stats: Arc<Stats>) -> Self {
        Self::with_timeouts(stats, FanoutTimeouts::default())
    }

    pub fn with_timeouts(stats: Arc<Stats>, timeouts: FanoutTimeouts) -> Self {
        Executor {
            client: http::new_backend_client(),
            timeouts,
            stats,
        }
    }

    /// Fan `path_and_query` out to every backend and gather the usable
    /// payloads in the order they arrive. Backends that fail or answer 404
    /// simply don't appear in the result; an empty result means nobody had
    /// anything, and the caller decides what that is worth.
    pub async fn multi_get(&self, backends: &[String], path_and_query: &str) -> Vec<ServerResponse> {
        tracing::debug!(?backends, path = path_and_query, "querying backends");

        let mut in_flight = JoinSet::new();
        for backend in backends {
            let client = self.client.clone();
            let backend = backend.clone();
            let path = path_and_query.to_string();
            let header_timeout = self.timeouts.response_header;
            in_flight.spawn(async move {
                let body = http::get_backend(&client, &backend, &path, header_timeout).await;
                (backend, body)
            });
        }

        let mut collected = Vec::new();
        let grace = tokio::time::sleep(self.timeouts.grace);
        tokio::pin!(grace);
        let mut grace_armed = false;

        while !in_flight.is_empty() {
            tokio::select! {
                joined = in_flight.join_next() => match joined {
                    Some(Ok((backend, Some(body)))) => {
                        if !grace_armed {
                            grace.as_mut().reset(Instant::now() + self.timeouts.grace);
                            grace_armed = true;
                        }
                        collected.push(ServerResponse { backend, body });
                    }
                    Some(Ok((_, None))) => {}
                    Some(Err(error)) => {
                        tracing::error!(%error, "fan-out task failed");
                    }
                    None => break,
                },
                _ = &mut grace, if grace_armed => {
                    tracing::warn!(
                        path = path_and_query,
                        outstanding = in_flight.len(),
                        "timeout waiting for more responses"
                    );
                    self.stats.incr_timeouts();
                    in_flight.abort_all();
                    break;
                }
            }
        }

        collected
    }
}
