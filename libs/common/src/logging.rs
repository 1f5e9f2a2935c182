//! Logging bootstrap for the ircon bridge and its tools
//!
//! Console output always; an optional daily rolling file (plain or JSON).
//! The filter honors `RUST_LOG`.

use std::fs;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, format::Writer, FmtContext, FormatEvent, FormatFields},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Custom format for log level with brackets: `[INFO]`, `[WARN]`, etc.
fn format_level(level: &Level) -> &'static str {
    match *level {
        Level::TRACE => "[TRACE]",
        Level::DEBUG => "[DEBUG]",
        Level::INFO => "[INFO]",
        Level::WARN => "[WARN]",
        Level::ERROR => "[ERROR]",
    }
}

/// Event formatter that outputs: `timestamp [LEVEL] message`
///
/// Example output: `2026-10-16T00:50:44.809000Z [INFO] Connected to 10.0.0.7:7070`
struct BracketedLevelFormat;

impl<S, N> FormatEvent<S, N> for BracketedLevelFormat
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let now = chrono::Utc::now();
        write!(writer, "{} ", now.format("%Y-%m-%dT%H:%M:%S%.6fZ"))?;

        let level = *event.metadata().level();
        if writer.has_ansi_escapes() {
            let color = match level {
                Level::TRACE => "\x1b[35m",
                Level::DEBUG => "\x1b[34m",
                Level::INFO => "\x1b[32m",
                Level::WARN => "\x1b[33m",
                Level::ERROR => "\x1b[31m",
            };
            write!(writer, "{}{}\x1b[0m ", color, format_level(&level))?;
        } else {
            write!(writer, "{} ", format_level(&level))?;
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}

// Keeps the non-blocking file writer alive for the life of the process
static FILE_GUARD: OnceLock<Mutex<Option<WorkerGuard>>> = OnceLock::new();


/// Get log root directory
///
/// Priority: `IRCON_LOG_DIR` > `configured` > `logs`
pub fn get_log_root(configured: Option<&str>) -> PathBuf {
    std::env::var("IRCON_LOG_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            configured
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("logs"))
        })
}

/// Logger configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Service name, used as filter target and file prefix
    pub service_name: String,
    /// Directory for the rolling file (only used when `enable_file` is set)
    pub log_dir: PathBuf,
    /// Default level when `RUST_LOG` is unset
    pub level: Level,
    /// Write a daily rolling file next to console output
    pub enable_file: bool,
    /// JSON lines in the file instead of the bracketed format
    pub enable_json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "ircon".to_string(),
            log_dir: get_log_root(None),
            level: Level::INFO,
            enable_file: false,
            enable_json: false,
        }
    }
}

/// Build the filter directive used when `RUST_LOG` is not set
fn default_directive(config: &LogConfig) -> String {
    let service_target = config.service_name.replace('-', "_");
    let service_level = if config.level < Level::DEBUG {
        Level::DEBUG
    } else {
        config.level
    };
    format!(
        "{},{}={}",
        config.level.as_str().to_lowercase(),
        service_target,
        service_level.as_str().to_lowercase()
    )
}

/// Initialize logging system with configuration
pub fn init_with_config(config: LogConfig) -> Result<(), Box<dyn std::error::Error>> {
    let filter_str = std::env::var("RUST_LOG").unwrap_or_else(|_| default_directive(&config));
    let env_filter = EnvFilter::try_new(&filter_str)?;

    let registry = tracing_subscriber::registry().with(env_filter);

    let console_layer = fmt::layer()
        .with_ansi(true)
        .event_format(BracketedLevelFormat)
        .boxed();

    let file_layer = if config.enable_file {
        fs::create_dir_all(&config.log_dir)?;
        let appender = tracing_appender::rolling::daily(
            &config.log_dir,
            format!("{}.log", config.service_name),
        );
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);

        let slot = FILE_GUARD.get_or_init(|| Mutex::new(None));
        match slot.lock() {
            Ok(mut slot) => *slot = Some(guard),
            Err(poisoned) => *poisoned.into_inner() = Some(guard),
        }

        let layer = if config.enable_json {
            fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_level(true)
                .with_target(true)
                .boxed()
        } else {
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .event_format(BracketedLevelFormat)
                .boxed()
        };
        Some(layer)
    } else {
        None
    };

    registry.with(console_layer).with(file_layer).try_init()?;

    if config.enable_file {
        tracing::info!("Logging: {} @ {:?}", config.service_name, config.log_dir);
    }

    Ok(())
}
