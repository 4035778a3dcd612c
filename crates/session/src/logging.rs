//! File-based tracing setup for embedders
//!
//! Optional; library users with their own subscriber should skip this and
//! install whatever they like. Logs land in `~/.codedeck/logs/client.log`
//! via a non-blocking appender, JSON by default.

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,tungstenite=warn,tokio_tungstenite=warn";
const LOG_FILE: &str = "client.log";

/// Keeps the appender's worker thread alive. Drop it and buffered log
/// lines are flushed.
pub struct LoggingHandle {
    /// Distinguishes this process's lines when several clients share the
    /// log file.
    pub run_id: String,
    pub guard: WorkerGuard,
}

/// Install a global subscriber writing to the codedeck log directory.
///
/// `CODEDECK_LOG_FILTER` (or `RUST_LOG`) overrides the filter;
/// `CODEDECK_LOG_FORMAT=pretty` switches off JSON output.
pub fn init_logging() -> anyhow::Result<LoggingHandle> {
    let log_dir = log_directory();
    std::fs::create_dir_all(&log_dir)?;

    let filter = std::env::var("CODEDECK_LOG_FILTER")
        .ok()
        .and_then(|value| EnvFilter::try_new(value).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER));

    let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(&log_dir, LOG_FILE));
    let format = std::env::var("CODEDECK_LOG_FORMAT").unwrap_or_else(|_| "json".into());

    // try_init, not init: the embedder may already have a global
    // subscriber installed, and that is their call to make.
    let registry = tracing_subscriber::registry().with(filter);
    if format.eq_ignore_ascii_case("pretty") {
        registry
            .with(
                fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .pretty()
                    .with_file(true)
                    .with_line_number(true)
                    .with_target(true),
            )
            .try_init()?;
    } else {
        registry
            .with(
                fmt::layer()
                    .with_writer(writer)
                    .json()
                    .flatten_event(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_target(true)
                    .with_current_span(true),
            )
            .try_init()?;
    }

    let run_id = {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        format!("pid-{}-{}", std::process::id(), now)
    };

    tracing::info!(
        component = "logging",
        event = "logging.initialized",
        log_path = %log_dir.join(LOG_FILE).display(),
        format = %format,
        run_id = %run_id,
    );

    Ok(LoggingHandle { run_id, guard })
}

fn log_directory() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
    PathBuf::from(home).join(".codedeck").join("logs")
}
