//! Ambient structured-logging stack shared by every other crate: a
//! `LogRecord` shape analogous to the host's own log pipeline records, fed
//! by a `tracing_subscriber::Layer` that turns spans/events into records.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub mod layer;

pub use layer::Layer;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogRecord {
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: time::OffsetDateTime,
    pub level: LogLevel,
    pub message: String,
    pub fields: BTreeMap<String, serde_json::Value>,
    pub spans: Vec<LogRecord>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<&tracing::Level> for LogLevel {
    fn from(level: &tracing::Level) -> Self {
        match *level {
            tracing::Level::TRACE => LogLevel::Trace,
            tracing::Level::DEBUG => LogLevel::Debug,
            tracing::Level::INFO => LogLevel::Info,
            tracing::Level::WARN => LogLevel::Warn,
            tracing::Level::ERROR => LogLevel::Error,
        }
    }
}

/// A sink that writes each record as one line of JSON to stderr. Suitable
/// for production log pipelines that consume structured `LogRecord`s
/// directly, as an alternative to the human-readable `fmt` subscriber.
pub fn stderr_json_sink(record: LogRecord) {
    match serde_json::to_string(&record) {
        Ok(line) => eprintln!("{line}"),
        Err(err) => eprintln!("{{\"level\":\"error\",\"message\":\"failed to serialize log record: {err}\"}}"),
    }
}

/// Installs a human-readable `tracing_subscriber::fmt` layer filtered by
/// `RUST_LOG` (or `info` if unset). Intended for binaries and tests that
/// just want readable output; use [`Layer`] directly for the structured
/// `LogRecord` pipeline.
pub fn init_fmt_subscriber() {
    use tracing_subscriber::prelude::*;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .with(env_filter)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_conversion() {
        assert_eq!(LogLevel::from(&tracing::Level::WARN), LogLevel::Warn);
    }
}
