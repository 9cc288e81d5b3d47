use std::fs;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const LOG_DIR: &str = "logs";
const DEFAULT_DIRECTIVE: &str = "usage_streamer=info";

/// Where human-readable console logs go. `Stderr` keeps stdout free for
/// machine-readable output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleWriter {
    Stdout,
    Stderr,
}

/// Initializes the logging system with both console and file output.
pub fn init_logging(console: ConsoleWriter) {
    // Ensure logs directory exists
    let _ = fs::create_dir_all(LOG_DIR);

    // Create a non-blocking file appender for daily log rotation
    let file_appender = tracing_appender::rolling::daily(LOG_DIR, "usage_streamer.log");
    let (non_blocking_writer, guard) = tracing_appender::non_blocking(file_appender);

    // JSON lines in the file, plain formatting on the console
    let file_layer = fmt::layer().json().with_writer(non_blocking_writer);
    let console_layer = match console {
        ConsoleWriter::Stdout => fmt::layer().with_writer(std::io::stdout).boxed(),
        ConsoleWriter::Stderr => fmt::layer().with_writer(std::io::stderr).boxed(),
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .init();

    // The guard flushes the file writer on drop; keep it for the life of the process
    std::mem::forget(guard);
}
