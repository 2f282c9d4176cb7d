use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use channel_relay::channels::{StdioTransport, Transport};
use channel_relay::config::RelayConfig;
use channel_relay::error::Error;
use channel_relay::relay::Relay;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<ExitCode> {
    let config = RelayConfig::from_env()?;

    // Human-readable log on stderr, JSON records in the log file.
    let (file_writer, log_guard) =
        tracing_appender::non_blocking(log_file_appender(&config.log_path));
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(file_writer)
                .with_ansi(false),
        )
        .init();

    eprintln!("📣 Channel Relay v{}", env!("CARGO_PKG_VERSION"));
    config.log_summary();

    let transport: Arc<dyn Transport> =
        Arc::new(StdioTransport::from_channels_file(&config.channels_path).await?);

    let relay = Relay::new(config, transport);
    match relay.run().await {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(e) => {
            eprintln!("Error: {e}");
            report_fatal(&e, log_guard);
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Log the error that stopped the relay and flush the file log.
fn report_fatal(error: &Error, log_guard: WorkerGuard) {
    tracing::error!(error = %error, fatal = error.is_fatal(), "Relay stopped");
    drop(log_guard);
}

/// Appender writing to a single, never-rotated file at `path`.
fn log_file_appender(path: &Path) -> tracing_appender::rolling::RollingFileAppender {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "wh_relay.log".into());
    std::fs::create_dir_all(dir).ok();
    tracing_appender::rolling::never(dir, file_name)
}
