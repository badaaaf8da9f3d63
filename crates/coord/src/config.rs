//! Coordinator-wide tunables. Defaults match the literal values the rest
//! of this crate's documentation assumes; `from_env` lets a deployment
//! override them without a hard dependency on any particular config file
//! format.

use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct CoordConfig {
    /// How many applied operations between cursor-registry sweeps.
    pub cursor_sweep_interval_ops: u64,
    /// Minimum gap enforced between consecutive sweeps even under heavy
    /// write load.
    pub cursor_sweep_throttle: Duration,
    /// A cursor with no `READ` in this long is eligible for reaping.
    pub default_cursor_timeout: Duration,
    /// How long a concurrent-search worker may hold the host lock before
    /// it must cooperatively yield.
    pub concurrent_search_timeout: Duration,
    /// `HLL_BITS`: fixed at 8 by this crate, kept configurable only so
    /// tests can shrink it.
    pub hll_bits: u8,
    /// Bound on the per-shard channel `ShardIterator` reads into.
    pub iterator_channel_capacity: usize,
    /// Reserved for future backpressure tuning; currently informational.
    pub iterator_drain_threshold: usize,
}

impl Default for CoordConfig {
    fn default() -> Self {
        CoordConfig {
            cursor_sweep_interval_ops: 1000,
            cursor_sweep_throttle: Duration::from_millis(500),
            default_cursor_timeout: Duration::from_secs(60),
            concurrent_search_timeout: Duration::from_millis(5),
            hll_bits: 8,
            iterator_channel_capacity: 64,
            iterator_drain_threshold: 16,
        }
    }
}

impl CoordConfig {
    /// Overrides defaults from `COORD_*` environment variables. A variable
    /// that is set but fails to parse is logged and otherwise ignored —
    /// configuration is not a correctness boundary for this crate.
    pub fn from_env() -> Self {
        let mut config = CoordConfig::default();

        apply_u64(&mut config.cursor_sweep_interval_ops, "COORD_CURSOR_SWEEP_INTERVAL_OPS");
        apply_millis(&mut config.cursor_sweep_throttle, "COORD_CURSOR_SWEEP_THROTTLE_MS");
        apply_secs(&mut config.default_cursor_timeout, "COORD_DEFAULT_CURSOR_TIMEOUT_SECS");
        apply_millis(&mut config.concurrent_search_timeout, "COORD_CONCURRENT_SEARCH_TIMEOUT_MS");
        apply_u8(&mut config.hll_bits, "COORD_HLL_BITS");
        apply_usize(&mut config.iterator_channel_capacity, "COORD_ITERATOR_CHANNEL_CAPACITY");
        apply_usize(&mut config.iterator_drain_threshold, "COORD_ITERATOR_DRAIN_THRESHOLD");

        config
    }
}

fn read_var(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn apply_u64(field: &mut u64, key: &str) {
    if let Some(raw) = read_var(key) {
        match raw.parse() {
            Ok(v) => *field = v,
            Err(_) => tracing::warn!(key, raw, "ignoring unparseable config override"),
        }
    }
}

fn apply_u8(field: &mut u8, key: &str) {
    if let Some(raw) = read_var(key) {
        match raw.parse() {
            Ok(v) => *field = v,
            Err(_) => tracing::warn!(key, raw, "ignoring unparseable config override"),
        }
    }
}

fn apply_usize(field: &mut usize, key: &str) {
    if let Some(raw) = read_var(key) {
        match raw.parse() {
            Ok(v) => *field = v,
            Err(_) => tracing::warn!(key, raw, "ignoring unparseable config override"),
        }
    }
}

fn apply_millis(field: &mut Duration, key: &str) {
    if let Some(raw) = read_var(key) {
        match raw.parse() {
            Ok(v) => *field = Duration::from_millis(v),
            Err(_) => tracing::warn!(key, raw, "ignoring unparseable config override"),
        }
    }
}

fn apply_secs(field: &mut Duration, key: &str) {
    if let Some(raw) = read_var(key) {
        match raw.parse() {
            Ok(v) => *field = Duration::from_secs(v),
            Err(_) => tracing::warn!(key, raw, "ignoring unparseable config override"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = CoordConfig::default();
        assert_eq!(config.cursor_sweep_interval_ops, 1000);
        assert_eq!(config.cursor_sweep_throttle, Duration::from_millis(500));
        assert_eq!(config.default_cursor_timeout, Duration::from_secs(60));
        assert_eq!(config.concurrent_search_timeout, Duration::from_millis(5));
        assert_eq!(config.hll_bits, 8);
        assert_eq!(config.iterator_channel_capacity, 64);
        assert_eq!(config.iterator_drain_threshold, 16);
    }

    #[test]
    fn from_env_overrides_a_set_variable() {
        std::env::set_var("COORD_CURSOR_SWEEP_INTERVAL_OPS", "250");
        let config = CoordConfig::from_env();
        std::env::remove_var("COORD_CURSOR_SWEEP_INTERVAL_OPS");
        assert_eq!(config.cursor_sweep_interval_ops, 250);
    }

    #[test]
    fn from_env_falls_back_on_unparseable_value() {
        std::env::set_var("COORD_HLL_BITS", "not-a-number");
        let config = CoordConfig::from_env();
        std::env::remove_var("COORD_HLL_BITS");
        assert_eq!(config.hll_bits, 8);
    }
}
