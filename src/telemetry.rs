//! Tracing subscriber initialisation for binaries and demos.

use tracing_subscriber::EnvFilter;

/// Installs a formatted tracing subscriber.
///
/// `RUST_LOG` takes precedence; otherwise `fallback_level` is used, and an
/// unparsable level falls back to `info`. Calling this more than once keeps
/// the first subscriber.
pub fn init_tracing(fallback_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    if tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_err()
    {
        tracing::debug!("tracing subscriber already installed");
    }
}
