//! Logging Configuration and Initialization
//!
//! Installs the global `tracing` subscriber used by the ecom-etl binary.
//! Lines go to stderr, to a daily-rotated file, or to both, as text or
//! JSON. Command output owns stdout, so the console sink never writes there.
//!
//! Log with fields rather than formatted strings:
//!
//! ```rust
//! use tracing::{info, warn};
//!
//! let target = "postgres";
//! info!(target_name = %target, rows = 42, "Loaded products");
//! warn!(target_name = %target, "Target unreachable, skipping");
//! ```
//!
//! # Example
//!
//! ```no_run
//! use ecom_common::logging::{init_logging, LogConfig};
//!
//! let config = LogConfig::for_cli(false).apply_env().unwrap_or_default();
//! // Hold the guard until exit or buffered file lines are lost
//! let _guard = init_logging(&config).ok();
//! ```

use anyhow::{anyhow, Context, Result};
use std::path::PathBuf;
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan, MakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Line format shared by every sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("json") {
            Ok(LogFormat::Json)
        } else if s.eq_ignore_ascii_case("text") || s.eq_ignore_ascii_case("pretty") {
            Ok(LogFormat::Text)
        } else {
            Err(anyhow!("Unknown log format '{}' (expected text or json)", s))
        }
    }
}

/// Rolling log file location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSink {
    pub dir: PathBuf,
    /// "ecom-etl" produces "ecom-etl.2024-01-18"
    pub prefix: String,
}

impl FileSink {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: LevelFilter,
    pub format: LogFormat,
    pub stderr: bool,
    pub file: Option<FileSink>,

    /// Extra `EnvFilter` directives, e.g. `sqlx=warn`
    pub directives: Vec<String>,

    /// Source file and line on every event
    pub with_location: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LevelFilter::INFO,
            format: LogFormat::Text,
            stderr: true,
            file: None,
            directives: vec!["sqlx=warn".to_string()],
            with_location: false,
        }
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl LogConfig {
    /// Warnings only, or debug output with `--verbose`
    pub fn for_cli(verbose: bool) -> Self {
        Self {
            level: if verbose { LevelFilter::DEBUG } else { LevelFilter::WARN },
            ..Self::default()
        }
    }

    /// Overlay environment variables
    ///
    /// - `LOG_LEVEL`: off, error, warn, info, debug, trace
    /// - `LOG_FORMAT`: text, json
    /// - `LOG_DIR`: also write to a daily file in this directory
    /// - `LOG_FILE_PREFIX`: file name prefix, default `ecom-etl`
    /// - `LOG_FILE_ONLY`: `true` turns stderr off when `LOG_DIR` is set
    /// - `LOG_FILTER`: comma separated directives, replaces the defaults
    /// - `LOG_INCLUDE_LOCATION`: `true` adds file and line
    pub fn apply_env(mut self) -> Result<Self> {
        if let Some(level) = env_var("LOG_LEVEL") {
            self.level = level
                .parse()
                .map_err(|_| anyhow!("Unknown log level '{}'", level))?;
        }
        if let Some(format) = env_var("LOG_FORMAT") {
            self.format = format.parse()?;
        }
        if let Some(dir) = env_var("LOG_DIR") {
            let prefix = env_var("LOG_FILE_PREFIX").unwrap_or_else(|| "ecom-etl".to_string());
            self.file = Some(FileSink::new(dir, prefix));
            self.stderr = !env_var("LOG_FILE_ONLY").is_some_and(|v| v == "true");
        }
        if let Some(filter) = env_var("LOG_FILTER") {
            self.directives = filter
                .split(',')
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(val) = env_var("LOG_INCLUDE_LOCATION") {
            self.with_location = val == "true";
        }
        Ok(self)
    }

    fn env_filter(&self) -> Result<EnvFilter> {
        self.directives.iter().try_fold(
            EnvFilter::from_default_env().add_directive(self.level.into()),
            |filter, directive| {
                let parsed = directive
                    .parse()
                    .with_context(|| format!("Bad filter directive '{}'", directive))?;
                Ok(filter.add_directive(parsed))
            },
        )
    }

    fn layer<W>(&self, writer: W, ansi: bool) -> BoxedLayer
    where
        W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
    {
        let layer = fmt::layer()
            .with_writer(writer)
            .with_ansi(ansi)
            .with_file(self.with_location)
            .with_line_number(self.with_location)
            .with_span_events(FmtSpan::CLOSE);

        match self.format {
            LogFormat::Text => layer.boxed(),
            LogFormat::Json => layer.json().boxed(),
        }
    }
}

/// Install the global subscriber
///
/// Call once at startup. With a file sink the returned guard must outlive
/// all logging.
pub fn init_logging(config: &LogConfig) -> Result<Option<WorkerGuard>> {
    let filter = config.env_filter()?;
    let mut layers: Vec<BoxedLayer> = Vec::with_capacity(2);

    if config.stderr {
        layers.push(config.layer(std::io::stderr, true));
    }

    let guard = match &config.file {
        Some(sink) => {
            std::fs::create_dir_all(&sink.dir)
                .with_context(|| format!("Cannot create log directory {}", sink.dir.display()))?;
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::daily(&sink.dir, &sink.prefix));
            layers.push(config.layer(writer, false));
            Some(guard)
        },
        None => None,
    };

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .context("A global tracing subscriber is already installed")?;

    Ok(guard)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_format_parsing() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("pretty".parse::<LogFormat>().unwrap(), LogFormat::Text);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_cli_levels() {
        assert_eq!(LogConfig::for_cli(true).level, LevelFilter::DEBUG);
        assert_eq!(LogConfig::for_cli(false).level, LevelFilter::WARN);
        assert!(LogConfig::for_cli(false).stderr);
        assert!(LogConfig::for_cli(false).file.is_none());
    }

    #[test]
    fn test_default_quiets_sqlx() {
        let config = LogConfig::default();
        assert_eq!(config.directives, vec!["sqlx=warn".to_string()]);
        assert!(config.env_filter().is_ok());
    }

    #[test]
    fn test_bad_directive_rejected() {
        let config = LogConfig {
            directives: vec!["sqlx=loud".to_string()],
            ..LogConfig::default()
        };
        assert!(config.env_filter().is_err());
    }

    #[test]
    fn test_file_sink() {
        let dir = tempfile::TempDir::new().unwrap();
        let sink = FileSink::new(dir.path(), "etl-test");
        assert_eq!(sink.dir, dir.path());
        assert_eq!(sink.prefix, "etl-test");
    }
}
