//! Logging setup built on `tracing` and `tracing-subscriber`.
//!
//! All output goes to stderr so exports written to stdout stay parseable.
//! `RUST_LOG` takes precedence over the verbosity flag when it is set.

use clap::ValueEnum;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: Level,
    pub format: LogFormat,
    pub with_ansi: bool,
}

impl LogConfig {
    /// 0 = info, 1 = debug, 2+ = trace.
    pub fn from_verbosity(verbosity: u8, format: LogFormat) -> Self {
        let level = match verbosity {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        };
        Self {
            level,
            format,
            with_ansi: format == LogFormat::Pretty,
        }
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "referral_moving_rates={}",
                self.level.as_str().to_ascii_lowercase()
            ))
        })
    }
}

pub fn init_logging(config: &LogConfig) -> anyhow::Result<()> {
    let registry = tracing_subscriber::registry().with(config.filter());
    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_ansi(config.with_ansi);

    match config.format {
        LogFormat::Pretty => registry.with(layer.pretty()).try_init()?,
        LogFormat::Compact => registry.with(layer.compact()).try_init()?,
        LogFormat::Json => registry.with(layer.json()).try_init()?,
    }
    Ok(())
}
