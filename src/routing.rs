//! Routing hints learned from glob responses.
//!
//! Once a backend has admitted to holding a metric path via find, render
//! queries for that path only need to visit the backends that reported it.
//! The table only ever grows; operators restart the proxy on topology
//! change, so there is no eviction and no TTL.

use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Default)]
pub struct RoutingTable {
    inner: RwLock<HashMap<String, Vec<String>>>,
}

impl RoutingTable {
    pub fn new() -> Self {
        RoutingTable {
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Replace the stored backend list for every path in `paths`. Each key is
    /// rewritten as a whole, so a concurrent reader sees either the previous
    /// list or the new one.
    pub fn update(&self, paths: HashMap<String, Vec<String>>) {
        let mut table = self.inner.write();
        for (path, backends) in paths {
            table.insert(path, backends);
        }
    }

    /// Backends known to hold `metric_path`. `None` means the path has never
    /// been seen in a glob response (or was reported with no holders) and the
    /// caller should fan out to every configured backend.
    pub fn lookup(&self, metric_path: &str) -> Option<Vec<String>> {
        self.inner
            .read()
            .get(metric_path)
            .filter(|backends| !backends.is_empty())
            .cloned()
    }
}
