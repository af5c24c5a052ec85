//! Logging setup.
//!
//! Events go to the console and to a daily rolling file under the log
//! directory, optionally as JSON. `RUST_LOG` replaces the configured
//! directives entirely.

use crate::config::Config;
use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    registry::Registry,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Logging configuration for one binary
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub log_dir: PathBuf,
    /// Binary name; also the prefix of the rolling log files
    pub component: String,
    pub default_level: Level,
    pub console: bool,
    pub file: bool,
    /// Write file logs as JSON lines
    pub json_format: bool,
}

impl LogConfig {
    /// Logging settings from the `[logging]` section.
    ///
    /// `verbose` forces DEBUG regardless of the configured level.
    pub fn from_config(config: &Config, component: &str, verbose: bool) -> Self {
        let default_level = if verbose {
            Level::DEBUG
        } else {
            parse_level(&config.logging.default_level)
        };

        Self {
            log_dir: config.log_dir(),
            component: component.to_string(),
            default_level,
            console: config.logging.console,
            file: config.logging.file,
            json_format: config.logging.json_format,
        }
    }

    /// Filter directives used when `RUST_LOG` is unset
    fn directives(&self) -> String {
        let level = self.default_level;
        format!(
            "{}={level},shared={level},frame_sampler={level},tower_http=info,hyper=warn",
            self.component.replace('-', "_"),
        )
    }
}

/// Install the global subscriber
pub fn init(config: LogConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.directives()));

    let mut layers: Vec<BoxedLayer> = Vec::new();

    if config.console {
        layers.push(console_layer());
    }

    if config.file {
        std::fs::create_dir_all(&config.log_dir).with_context(|| {
            format!("Failed to create log directory: {}", config.log_dir.display())
        })?;
        layers.push(file_layer(&config));
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    tracing::info!(
        component = %config.component,
        level = %config.default_level,
        log_dir = %config.log_dir.display(),
        "Logging initialized"
    );

    Ok(())
}

fn console_layer() -> BoxedLayer {
    fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::NONE)
        .with_writer(std::io::stdout)
        .boxed()
}

fn file_layer(config: &LogConfig) -> BoxedLayer {
    let appender = tracing_appender::rolling::daily(&config.log_dir, &config.component);

    if config.json_format {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_writer(appender)
            .boxed()
    } else {
        fmt::layer()
            .with_ansi(false)
            .with_span_events(FmtSpan::CLOSE)
            .with_writer(appender)
            .boxed()
    }
}

/// Parse a configured level name, falling back to INFO
pub fn parse_level(level: &str) -> Level {
    level.parse().unwrap_or_else(|_| {
        eprintln!("Unknown log level '{}', using info", level);
        Level::INFO
    })
}
