//! Metrics definitions for the webhook receiver.

use shared::metrics_defs::{MetricDef, MetricType};

pub const WEBHOOK_RECEIVED: MetricDef = MetricDef {
    name: "webhook.received",
    metric_type: MetricType::Counter,
    description: "Number of deliveries that reached the webhook route",
};

pub const WEBHOOK_REJECTED: MetricDef = MetricDef {
    name: "webhook.rejected",
    metric_type: MetricType::Counter,
    description: "Number of deliveries rejected for a missing or wrong secret",
};

pub const WEBHOOK_FAILED: MetricDef = MetricDef {
    name: "webhook.failed",
    metric_type: MetricType::Counter,
    description: "Number of authenticated deliveries that failed, tagged by kind",
};

pub const WEBHOOK_PERSISTED: MetricDef = MetricDef {
    name: "webhook.persisted",
    metric_type: MetricType::Counter,
    description: "Number of deliveries whose event and record were both stored",
};

pub const WEBHOOK_DURATION: MetricDef = MetricDef {
    name: "webhook.duration",
    metric_type: MetricType::Histogram,
    description: "Time to handle a delivery in seconds, tagged by status",
};

pub const ALL_METRICS: &[MetricDef] = &[
    WEBHOOK_RECEIVED,
    WEBHOOK_REJECTED,
    WEBHOOK_FAILED,
    WEBHOOK_PERSISTED,
    WEBHOOK_DURATION,
];
