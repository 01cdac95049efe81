//! Logging and tracing setup for SQLTrace
//!
//! Builds a `tracing` subscriber from a [`LoggingConfig`]:
//! - pretty console output for interactive use
//! - optional JSON files with daily rotation, for attaching to bug reports
//! - `RUST_LOG` overrides the configured filter when set

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Directory for JSON log files; no file output when unset
    pub log_dir: Option<PathBuf>,

    /// Whether to write JSON logs into `log_dir`
    pub enable_json_logs: bool,

    /// Whether to enable pretty console output
    pub enable_console_logs: bool,

    /// Whether to include file/line information in logs
    pub include_location: bool,

    /// Whether to log span open/close events (timing of explain and benchmark calls)
    pub enable_spans: bool,

    /// Filter used when `RUST_LOG` is not set
    pub default_filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: Some(log_directory()),
            enable_json_logs: false,
            enable_console_logs: true,
            include_location: cfg!(debug_assertions),
            enable_spans: cfg!(debug_assertions),
            default_filter: "info,sqltrace_core=debug,sqltrace_analyzer=debug,sqltrace_bench=debug"
                .to_string(),
        }
    }
}

impl LoggingConfig {
    /// Quiet console, JSON files for later inspection
    pub fn production() -> Self {
        Self {
            log_dir: Some(log_directory()),
            enable_json_logs: true,
            enable_console_logs: false,
            include_location: false,
            enable_spans: false,
            default_filter: "warn,sqltrace_core=info,sqltrace_analyzer=info,sqltrace_bench=info"
                .to_string(),
        }
    }

    /// Verbose pretty console output
    pub fn development() -> Self {
        Self::default()
    }

    /// Console only, no files
    pub fn testing() -> Self {
        Self {
            log_dir: None,
            enable_json_logs: false,
            enable_console_logs: true,
            include_location: true,
            enable_spans: true,
            default_filter: "debug".to_string(),
        }
    }

    pub fn with_log_dir(mut self, log_dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(log_dir.into());
        self
    }

    pub fn with_default_filter(mut self, filter: impl Into<String>) -> Self {
        self.default_filter = filter.into();
        self
    }

    /// Directory JSON logs will be written to, if JSON output is active
    pub fn json_log_dir(&self) -> Option<&PathBuf> {
        self.log_dir.as_ref().filter(|_| self.enable_json_logs)
    }
}

/// Keeps the background log writer alive; drop it at shutdown to flush
#[must_use = "dropping the guard stops file logging"]
pub struct LoggingGuard {
    _file_writer: Option<WorkerGuard>,
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Install the global subscriber described by `config`.
///
/// Fails if a global subscriber is already installed or the log directory
/// cannot be created.
pub fn init(config: LoggingConfig) -> anyhow::Result<LoggingGuard> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_filter));

    let mut layers: Vec<BoxedLayer> = Vec::new();
    if config.enable_console_logs {
        layers.push(console_layer(&config, env_filter.clone()));
    }

    let file_writer = match config.json_log_dir() {
        Some(log_dir) => {
            let (layer, guard) = json_file_layer(&config, log_dir, env_filter)?;
            layers.push(layer);
            Some(guard)
        }
        None => None,
    };

    tracing_subscriber::registry().with(layers).try_init()?;

    tracing::info!(
        log_dir = ?config.json_log_dir(),
        json_enabled = config.enable_json_logs,
        console_enabled = config.enable_console_logs,
        "logging initialized"
    );

    Ok(LoggingGuard {
        _file_writer: file_writer,
    })
}

// NEW fires once per span; ENTER would repeat on every poll of an awaited future
fn span_events(config: &LoggingConfig) -> FmtSpan {
    if config.enable_spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    }
}

fn console_layer(config: &LoggingConfig, filter: EnvFilter) -> BoxedLayer {
    fmt::layer()
        .pretty()
        .with_ansi(true)
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_span_events(span_events(config))
        .with_filter(filter)
        .boxed()
}

/// Daily-rotated JSON file output; the guard flushes the writer on drop
fn json_file_layer(
    config: &LoggingConfig,
    log_dir: &Path,
    filter: EnvFilter,
) -> anyhow::Result<(BoxedLayer, WorkerGuard)> {
    std::fs::create_dir_all(log_dir)?;
    let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(log_dir, "sqltrace.log"));

    let layer = fmt::layer()
        .json()
        .with_ansi(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_current_span(true)
        .with_span_list(true)
        .with_span_events(span_events(config))
        .with_writer(writer)
        .with_filter(filter)
        .boxed();
    Ok((layer, guard))
}

/// Install a subscriber that writes through the test harness's capture.
///
/// Safe to call from every test; only the first call has an effect.
pub fn init_test_logging() {
    use std::sync::Once;
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&LoggingConfig::testing().default_filter));
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .finish();

        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}

/// Default directory for JSON log files
pub fn log_directory() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sqltrace")
        .join("logs")
}
