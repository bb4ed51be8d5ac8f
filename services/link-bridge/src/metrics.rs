//! Prometheus metrics exposition
//!
//! - `link_flows_total` (counter): label `outcome`
//! - `link_flows_started_total` (counter)
//! - `connections_api_requests_total` / `connections_api_request_duration_seconds`,
//!   recorded by the API client and rendered here

use anyhow::{Context, Result};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

const API_DURATION_METRIC: &str = "connections_api_request_duration_seconds";

/// Session API calls are short; the tail covers the client timeout.
const API_DURATION_BUCKETS: &[f64] = &[
    0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
];

fn builder() -> Result<PrometheusBuilder> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(API_DURATION_METRIC.to_string()),
            API_DURATION_BUCKETS,
        )
        .context("failed to set histogram buckets")
}

/// Install the Prometheus recorder and return a handle for rendering metrics.
pub fn install_recorder() -> Result<PrometheusHandle> {
    builder()?
        .install_recorder()
        .context("failed to install Prometheus recorder")
}

/// Record a flow started through the bridge.
pub fn record_flow_started() {
    metrics::counter!("link_flows_started_total").increment(1);
}

/// Record a delivered flow result by outcome label.
pub fn record_flow_result(outcome: &'static str) {
    metrics::counter!("link_flows_total", "outcome" => outcome).increment(1);
}
