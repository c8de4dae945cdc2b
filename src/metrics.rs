use lazy_static::lazy_static;
use prometheus::{
    Encoder, Gauge, HistogramVec, IntCounter, IntCounterVec, TextEncoder, register_gauge,
    register_histogram_vec, register_int_counter, register_int_counter_vec,
};

lazy_static! {
    pub static ref REQUEST_TOTAL: IntCounterVec = register_int_counter_vec!(
        "koby_requests_total",
        "Total number of API requests by route",
        &["route"]
    )
    .unwrap();
    pub static ref RATE_LIMITED_TOTAL: IntCounter = register_int_counter!(
        "koby_rate_limited_total",
        "Requests rejected by the rate limiter"
    )
    .unwrap();
    pub static ref UPSTREAM_ERRORS: IntCounterVec = register_int_counter_vec!(
        "koby_upstream_errors_total",
        "Failed upstream calls by provider and kind",
        &["provider", "kind"]
    )
    .unwrap();
    pub static ref UPSTREAM_LATENCY: HistogramVec = register_histogram_vec!(
        "koby_upstream_latency_seconds",
        "Upstream call latency in seconds",
        &["provider"]
    )
    .unwrap();
    pub static ref RATE_LIMIT_ENTRIES: Gauge = register_gauge!(
        "koby_rate_limit_entries",
        "Client keys currently tracked by the rate limiter"
    )
    .unwrap();
    pub static ref WEBHOOKS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "koby_webhooks_total",
        "Webhook deliveries by outcome",
        &["outcome"]
    )
    .unwrap();
}

/// Renders the default registry in the Prometheus text format.
pub fn render() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
