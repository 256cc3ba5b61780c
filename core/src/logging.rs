//! Structured logging initialization, verbatim in spirit with the
//! teacher's `utils::logger::init_logger`.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the global `tracing` subscriber.
///
/// `log_level` is used only when `RUST_LOG` is unset. `json` selects a
/// machine-parseable format for production log shipping; the human format
/// additionally tags the target module and thread id, matching the
/// teacher's development-facing layer.
pub fn init(log_level: &str, json: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .init();
    }
}
