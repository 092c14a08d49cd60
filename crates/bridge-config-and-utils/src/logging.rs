//! Logging initialization for the bridge.

use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the tracing subscriber.
///
/// The level comes from `RUST_LOG` when set, otherwise from the provided
/// default. Safe to call more than once; later calls are ignored.
///
/// # Example
///
/// ```ignore
/// init_logging("info");
/// tracing::info!("bridge started");
/// ```
pub fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_logging_is_idempotent() {
        init_logging("debug");
        init_logging("info");
    }
}
