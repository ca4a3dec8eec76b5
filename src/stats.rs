//! Process-wide counters and the request latency histogram.
//!
//! One `Stats` handle is built at startup and shared by every component that
//! needs to record something: the service wrapper (requests, latency), the
//! fan-out executor (timeouts), and the mergers (errors). All counters are
//! plain atomics so readers (the debug endpoint and the telemetry publisher)
//! never contend with request processing.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

pub struct Stats {
    requests: AtomicU64,
    errors: AtomicU64,
    timeouts: AtomicU64,
    // `bucket_limit + 1` counters; the last one is the overflow bucket.
    buckets: Box<[AtomicU64]>,
}

impl Stats {
    /// `bucket_limit` is the number of per-decade buckets; requests slower
    /// than `10^bucket_limit` ms land in one extra overflow bucket.
    pub fn new(bucket_limit: usize) -> Self {
        let buckets = (0..=bucket_limit).map(|_| AtomicU64::new(0)).collect();
        Stats {
            requests: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
            buckets,
        }
    }

    pub fn incr_requests(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_errors(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_timeouts(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    pub fn timeouts(&self) -> u64 {
        self.timeouts.load(Ordering::Relaxed)
    }

    /// Record one whole-handler service time. Bucket `b` holds requests that
    /// took `[10^b, 10^(b+1))` milliseconds; sub-millisecond requests clamp
    /// to bucket 0 and anything past the last decade goes to the overflow
    /// bucket and gets logged.
    pub fn observe(&self, elapsed: Duration, uri: &str) {
        let ms = elapsed.as_millis();
        let bucket = if ms == 0 { 0 } else { ms.ilog10() as usize };

        let limit = self.bucket_limit();
        if bucket < limit {
            self.buckets[bucket].fetch_add(1, Ordering::Relaxed);
        } else {
            self.buckets[limit].fetch_add(1, Ordering::Relaxed);
            tracing::info!(?elapsed, uri, "slow request");
        }
    }

    /// Number of per-decade buckets (the overflow bucket is not counted).
    pub fn bucket_limit(&self) -> usize {
        self.buckets.len() - 1
    }

    pub fn bucket_counts(&self) -> Vec<u64> {
        self.buckets
            .iter()
            .map(|b| b.load(Ordering::Relaxed))
            .collect()
    }
}
