//! Ambient Prometheus metrics bridge. Installs the global recorder once and
//! exposes small helpers for the counters the rest of the workspace emits,
//! so call sites just say `metrics_bridge::record_shard_dispatch(...)`
//! instead of poking the `metrics` facade's string-typed macros directly.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Installs the global Prometheus recorder. Call once at process start;
/// returns a handle whose `render()` produces the exposition-format text
/// body for a `/metrics` endpoint (left to the host binary to wire up,
/// since serving it is outside this workspace's scope).
pub fn install_recorder() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install prometheus recorder")
}

pub fn record_shard_dispatch(shard: &str) {
    metrics::counter!("coord_shard_dispatch_total", "shard" => shard.to_owned()).increment(1);
}

pub fn record_shard_error(shard: &str) {
    metrics::counter!("coord_shard_error_total", "shard" => shard.to_owned()).increment(1);
}

pub fn record_shard_latency_ms(shard: &str, millis: f64) {
    metrics::histogram!("coord_shard_latency_ms", "shard" => shard.to_owned()).record(millis);
}

pub fn record_cursor_sweep(reaped: u64) {
    metrics::counter!("coord_cursor_sweep_reaped_total").increment(reaped);
}

pub fn record_active_cursors(count: u64) {
    metrics::gauge!("coord_active_cursors").set(count as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn helpers_do_not_panic_without_a_registered_recorder() {
        // The `metrics` facade no-ops when no recorder is installed, so this
        // only checks call sites compile and never panic on their own.
        record_shard_dispatch("shard-0");
        record_shard_error("shard-0");
        record_shard_latency_ms("shard-0", 12.5);
        record_cursor_sweep(3);
        record_active_cursors(4);
    }
}
