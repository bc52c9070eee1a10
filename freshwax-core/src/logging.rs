//! Tracing bootstrap for the broadcast core.
//!
//! Two output shapes: `pretty` for an operator terminal, `json` for log
//! shippers. The filter starts from the configured level but turns the
//! HTTP and store plumbing down to `warn` so slot transitions and webhook
//! decisions stay readable; a `RUST_LOG` variable overrides the whole
//! filter when set.

use std::str::FromStr;
use std::sync::Arc;

use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

/// Output shape for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogFormat {
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(anyhow::anyhow!("unknown log format: {other}")),
        }
    }
}

/// Per-crate overrides appended under the configured level. Request-level
/// noise from these layers drowns out the scheduler unless asked for via
/// `RUST_LOG`.
const QUIET_CRATES: [&str; 4] = ["hyper=warn", "tower_http=info", "sqlx=warn", "reqwest=warn"];

fn build_filter(level: &str) -> anyhow::Result<EnvFilter> {
    let mut spec = level.to_ascii_lowercase();
    for directive in QUIET_CRATES {
        spec.push(',');
        spec.push_str(directive);
    }
    EnvFilter::try_new(&spec)
        .map_err(|err| anyhow::anyhow!("bad log level {level:?}: {err}"))
}

/// Install the process-wide subscriber from configuration. Call once,
/// before any service is constructed.
pub fn init(config: &LoggingConfig) -> anyhow::Result<()> {
    let format: LogFormat = config.format.parse()?;
    let filter = match std::env::var("RUST_LOG") {
        Ok(spec) => EnvFilter::try_new(&spec)
            .map_err(|err| anyhow::anyhow!("bad RUST_LOG {spec:?}: {err}"))?,
        Err(_) => build_filter(&config.level)?,
    };

    let writer = match &config.file_path {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            BoxMakeWriter::new(Arc::new(file))
        }
        None => BoxMakeWriter::new(std::io::stdout),
    };

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_target(true)
                    .with_writer(writer),
            )
            .init(),
        LogFormat::Pretty => registry
            .with(fmt::layer().with_target(true).with_writer(writer))
            .init(),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_parse_case_insensitively() {
        assert_eq!("pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("text".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert!("yaml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn filter_keeps_the_level_and_quiets_plumbing() {
        let filter = build_filter("debug").unwrap();
        let spec = filter.to_string();
        assert!(spec.contains("debug"));
        assert!(spec.contains("sqlx=warn"));
        assert!(spec.contains("hyper=warn"));

        assert!(build_filter("not a level").is_err());
    }
}
