//! Plaintext telemetry publishing.
//!
//! Every minute the exporter connects to the configured sink and writes the
//! current counter values and one gauge per latency bucket, under
//! `carbon.zipper.<hostname>.*` with the hostname's dots flattened to
//! underscores. A failed publish is logged and retried on the next tick.

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::{interval, timeout, MissedTickBehavior};

use crate::metrics_defs;
use crate::stats::Stats;

const PUBLISH_INTERVAL: Duration = Duration::from_secs(60);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct GraphiteExporter {
    addr: String,
    prefix: String,
}

impl GraphiteExporter {
    pub fn new(addr: String) -> Self {
        let hostname = gethostname::gethostname().to_string_lossy().into_owned();
        Self::for_host(addr, &hostname)
    }

    fn for_host(addr: String, hostname: &str) -> Self {
        GraphiteExporter {
            addr,
            prefix: format!("carbon.zipper.{}", hostname.replace('.', "_")),
        }
    }

    pub async fn run(self, stats: Arc<Stats>) {
        tracing::info!(sink = %self.addr, "publishing telemetry");
        let mut tick = interval(PUBLISH_INTERVAL);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick completes immediately
        tick.tick().await;
        loop {
            tick.tick().await;
            if let Err(error) = self.publish(&stats).await {
                tracing::warn!(sink = %self.addr, %error, "failed to publish telemetry");
            }
        }
    }

    async fn publish(&self, stats: &Stats) -> std::io::Result<()> {
        let mut stream = timeout(CONNECT_TIMEOUT, TcpStream::connect(self.addr.as_str()))
            .await
            .map_err(|_| {
                std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out")
            })??;

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let payload = self.render_lines(stats, now);
        stream.write_all(payload.as_bytes()).await?;
        stream.shutdown().await
    }

    fn render_lines(&self, stats: &Stats, timestamp: u64) -> String {
        let mut out = String::new();
        for (def, value) in [
            (metrics_defs::REQUESTS, stats.requests()),
            (metrics_defs::ERRORS, stats.errors()),
            (metrics_defs::TIMEOUTS, stats.timeouts()),
        ] {
            let _ = writeln!(out, "{}.{} {} {}", self.prefix, def.name, value, timestamp);
        }
        for (decade, count) in stats.bucket_counts().iter().enumerate() {
            let _ = writeln!(
                out,
                "{}.requests_in_1e{}ms_to_1e{}ms {} {}",
                self.prefix,
                decade,
                decade + 1,
                count,
                timestamp
            );
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hostname_dots_become_underscores() {
        let exporter =
            GraphiteExporter::for_host("graphite:2003".to_string(), "web1.example.com");
        assert_eq!(exporter.prefix, "carbon.zipper.web1_example_com");
    }

    #[test]
    fn lines_cover_counters_and_every_bucket() {
        let exporter = GraphiteExporter::for_host("graphite:2003".to_string(), "host");
        let stats = Stats::new(2);
        stats.incr_requests();
        stats.incr_requests();
        stats.incr_timeouts();
        stats.observe(Duration::from_millis(5), "/render/?target=a.b");

        let lines = exporter.render_lines(&stats, 1700000000);

        assert!(lines.contains("carbon.zipper.host.requests 2 1700000000\n"));
        assert!(lines.contains("carbon.zipper.host.errors 0 1700000000\n"));
        assert!(lines.contains("carbon.zipper.host.timeouts 1 1700000000\n"));
        assert!(lines.contains("carbon.zipper.host.requests_in_1e0ms_to_1e1ms 1 1700000000\n"));
        assert!(lines.contains("carbon.zipper.host.requests_in_1e1ms_to_1e2ms 0 1700000000\n"));
        // the overflow bucket publishes too
        assert!(lines.contains("carbon.zipper.host.requests_in_1e2ms_to_1e3ms 0 1700000000\n"));
        assert_eq!(lines.lines().count(), 6);
    }
}
