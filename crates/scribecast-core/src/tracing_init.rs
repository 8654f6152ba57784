//! Tracing/logging initialization for the `scribecast` binary.
//!
//! Sets up `tracing_subscriber` with an env-filter and optional JSON output.
//! Logs are written to stderr; stdout stays free for the caller.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Build the default filter directive for a log level, covering every
/// `scribecast` crate (e.g. `"scribecast=info,scribecast_relay=info,..."`).
pub fn default_filter(level: &str) -> String {
    format!("scribecast={level},scribecast_relay={level},scribecast_core={level}")
}

/// Initialise the global tracing subscriber.
///
/// * `default_filter` -- default `RUST_LOG` value when the env-var is not set.
/// * `log_json` -- when `true`, emit structured JSON log lines instead of the
///   human-readable format.
pub fn init_tracing(default_filter: &str, log_json: bool) {
    let env_filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.into()),
    );
    if log_json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
