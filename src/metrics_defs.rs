//! Names and descriptions for the process-wide counters.

#[derive(Debug, Clone, Copy)]
pub struct MetricDef {
    pub name: &'static str,
    pub description: &'static str,
}

pub const REQUESTS: MetricDef = MetricDef {
    name: "requests",
    description: "Queries accepted on the find and render endpoints",
};

pub const ERRORS: MetricDef = MetricDef {
    name: "errors",
    description: "Undecodable backend responses plus requests no backend could answer",
};

pub const TIMEOUTS: MetricDef = MetricDef {
    name: "timeouts",
    description: "Fan-outs that gave up on stragglers after the grace deadline",
};
