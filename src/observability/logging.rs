use std::fs;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;

const DEFAULT_FILTER: &str = "care_feedback=debug,info";

/// Install the global subscriber: JSON lines into a daily-rolled file under
/// `config.directory`, readable text on stderr.
///
/// `RUST_LOG` wins over `config.filter`. Hold the returned guard until exit;
/// dropping it flushes and stops the file writer.
pub fn init_logging(config: &LoggingConfig) -> WorkerGuard {
    if let Err(e) = fs::create_dir_all(&config.directory) {
        eprintln!("cannot create log directory {}: {}", config.directory, e);
    }

    let appender = tracing_appender::rolling::daily(&config.directory, &config.file_name);
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    let file_layer = fmt::layer().json().with_writer(file_writer);
    let console_layer = fmt::layer().with_target(true).with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(env_filter(config.filter.as_deref()))
        .with(file_layer)
        .with(console_layer)
        .init();

    guard
}

fn env_filter(configured: Option<&str>) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(configured.unwrap_or(DEFAULT_FILTER)))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}
