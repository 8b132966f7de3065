//! Metrics definitions for the upstream client.

use shared::metrics_defs::{MetricDef, MetricType};

pub const UPSTREAM_FETCH_DURATION: MetricDef = MetricDef {
    name: "upstream.fetch.duration",
    metric_type: MetricType::Histogram,
    description: "Time to fetch a record from the upstream API in seconds",
};

pub const UPSTREAM_FETCH_FAILED: MetricDef = MetricDef {
    name: "upstream.fetch.failed",
    metric_type: MetricType::Counter,
    description: "Number of record fetches that returned an error",
};

pub const ALL_METRICS: &[MetricDef] = &[UPSTREAM_FETCH_DURATION, UPSTREAM_FETCH_FAILED];
