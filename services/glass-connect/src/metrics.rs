//! Prometheus metrics exposition
//!
//! - `glass_challenges_total` (counter): consent pages served with a fresh state
//! - `glass_connect_total` (counter): label `outcome` (success outcome or rejection reason)
//! - `glass_connect_duration_seconds` (histogram): label `outcome`

use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

const DURATION_METRIC: &str = "glass_connect_duration_seconds";

/// Buckets from 50ms to 30s: a connect makes up to five sequential provider calls.
const DURATION_BUCKETS: &[f64] = &[0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0];

fn builder() -> PrometheusBuilder {
    PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Full(DURATION_METRIC.to_string()), DURATION_BUCKETS)
        .expect("histogram buckets are non-empty")
}

/// Install the Prometheus recorder and return a handle for rendering metrics.
pub fn install_recorder() -> anyhow::Result<PrometheusHandle> {
    Ok(builder().install_recorder()?)
}

/// Record a consent page served with a new challenge.
pub fn record_challenge() {
    metrics::counter!("glass_challenges_total").increment(1);
}

/// Record a finished connect attempt.
pub fn record_connect(outcome: &'static str, duration_secs: f64) {
    metrics::counter!("glass_connect_total", "outcome" => outcome).increment(1);
    metrics::histogram!(DURATION_METRIC, "outcome" => outcome).record(duration_secs);
}
