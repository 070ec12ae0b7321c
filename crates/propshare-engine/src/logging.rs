//! Logging initialization for engine hosts
//!
//! Handles LOG_DESTINATION=console|file, LOG_DIR, LOG_FILE_PREFIX env vars.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Workspace crates covered by the default filter
const ENGINE_CRATES: [&str; 2] = ["propshare_engine", "propshare_settlement"];

/// LOG_FILE_PREFIX fallback when LOG_DESTINATION=file
const DEFAULT_LOG_PREFIX: &str = "propshare";

/// Initialize the tracing subscriber.
///
/// `verbose` enables debug level for the engine crates; otherwise RUST_LOG
/// applies, falling back to info for the engine crates and warn elsewhere.
pub fn init_logging(verbose: bool) {
    let filter = if verbose {
        let debug_directives: Vec<String> = ENGINE_CRATES
            .iter()
            .map(|name| format!("{}=debug", name))
            .collect();
        EnvFilter::new(format!("{},info", debug_directives.join(",")))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            let info_directives: Vec<String> = ENGINE_CRATES
                .iter()
                .map(|name| format!("{}=info", name))
                .collect();
            EnvFilter::new(format!("{},warn", info_directives.join(",")))
        })
    };

    let log_dest = std::env::var("LOG_DESTINATION").unwrap_or_else(|_| "console".to_string());
    if log_dest.eq_ignore_ascii_case("file") {
        let log_dir = std::env::var("LOG_DIR").unwrap_or_else(|_| "./logs".to_string());
        let log_prefix =
            std::env::var("LOG_FILE_PREFIX").unwrap_or_else(|_| DEFAULT_LOG_PREFIX.to_string());
        let file_appender = tracing_appender::rolling::daily(&log_dir, &log_prefix);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        std::mem::forget(guard);
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(non_blocking).with_ansi(true))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }
}
