//! Log subscriber for the CLI and embedding binaries
//!
//! `RUST_LOG` picks the filter (default `info`). Output goes to stderr so the
//! CLI's JSON on stdout stays machine readable.

use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Compact,
    Json,
}

impl LogFormat {
    pub fn from_str(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pretty" => Some(LogFormat::Pretty),
            "compact" => Some(LogFormat::Compact),
            "json" => Some(LogFormat::Json),
            _ => None,
        }
    }

    /// `CARDANO_WC_LOG_JSON=1` wins, then `CARDANO_WC_LOG_FORMAT`, else pretty.
    pub fn from_env() -> Self {
        if std::env::var("CARDANO_WC_LOG_JSON").map(|v| v == "1").unwrap_or(false) {
            return LogFormat::Json;
        }
        std::env::var("CARDANO_WC_LOG_FORMAT")
            .ok()
            .and_then(|v| LogFormat::from_str(&v))
            .unwrap_or(LogFormat::Pretty)
    }
}

pub fn init_logging() { init_logging_as(LogFormat::from_env()) }

/// Safe to call more than once; later calls are no-ops.
pub fn init_logging_as(format: LogFormat) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt::Subscriber::builder().with_env_filter(env_filter).with_writer(std::io::stderr);
    let _ = match format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_parse() {
        assert_eq!(LogFormat::from_str("JSON"), Some(LogFormat::Json));
        assert_eq!(LogFormat::from_str(" compact "), Some(LogFormat::Compact));
        assert_eq!(LogFormat::from_str("xml"), None);
    }
}
