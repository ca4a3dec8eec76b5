//! Union-of-paths merging for glob responses.

use std::collections::HashMap;

use crate::codec::{Codec, GlobMatch};
use crate::executor::ServerResponse;
use crate::stats::Stats;

/// The merged view over every backend's glob response.
pub struct FindMerge {
    /// Deduplicated descriptors in arrival order. The first backend to
    /// report a path supplies its descriptor.
    pub metrics: Vec<GlobMatch>,
    /// Reverse index: metric path -> backends that reported it.
    pub paths: HashMap<String, Vec<String>>,
}

/// Merge glob responses. A response that fails to decode is logged, counted
/// and dropped; one broken backend must not poison the union.
pub fn merge(responses: &[ServerResponse], codec: &dyn Codec, stats: &Stats) -> FindMerge {
    let mut metrics = Vec::new();
    let mut paths: HashMap<String, Vec<String>> = HashMap::new();

    for response in responses {
        let matches = match codec.decode_find(&response.body) {
            Ok(matches) => matches,
            Err(error) => {
                tracing::warn!(
                    backend = %response.backend,
                    %error,
                    "error decoding glob response"
                );
                stats.incr_errors();
                continue;
            }
        };

        for glob_match in matches {
            let holders = paths.entry(glob_match.path.clone()).or_default();
            if holders.is_empty() {
                // first sighting across the whole merge
                metrics.push(glob_match);
            }
            holders.push(response.backend.clone());
        }
    }

    FindMerge { metrics, paths }
}
