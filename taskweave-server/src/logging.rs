//! Tracing subscriber setup
//!
//! Log output always goes to stderr because stdout carries the STDIO
//! protocol. `RUST_LOG` takes precedence over the configured level.

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingSettings;
use crate::Result;

const LOG_FILE_PREFIX: &str = "taskweave.log";

/// Install the global subscriber
///
/// The returned guard flushes the file writer and must live until shutdown.
pub fn init(settings: &LoggingSettings) -> Result<Option<WorkerGuard>> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.level));

    let (file_layer, guard) = match settings.directory.as_deref() {
        Some(directory) => {
            std::fs::create_dir_all(directory)?;
            let file_appender = tracing_appender::rolling::daily(directory, LOG_FILE_PREFIX);
            let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {}", e))?;

    if let Some(directory) = settings.directory.as_deref() {
        tracing::info!(
            "Logging to file: {}",
            Path::new(directory).join(LOG_FILE_PREFIX).display()
        );
    }

    Ok(guard)
}
