use shared::metrics_defs::{MetricDef, MetricType};

pub const REQUEST_DURATION: MetricDef = MetricDef {
    name: "request.duration",
    metric_type: MetricType::Histogram,
    description: "Relayed request duration in seconds. Tagged with status.",
};

pub const UPSTREAM_ATTEMPTS: MetricDef = MetricDef {
    name: "upstream.attempts",
    metric_type: MetricType::Counter,
    description: "Upstream calls made. Tagged with action and outcome (success, failure).",
};

pub const KEYS_EXHAUSTED: MetricDef = MetricDef {
    name: "upstream.keys_exhausted",
    metric_type: MetricType::Counter,
    description: "Requests that failed with every configured API key. Tagged with action.",
};

pub const ALL_METRICS: &[MetricDef] = &[REQUEST_DURATION, UPSTREAM_ATTEMPTS, KEYS_EXHAUSTED];
