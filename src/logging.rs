use std::sync::Once;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// Ensure initialization happens only once
static INIT: Once = Once::new();

/// Initialize the logging system with sensible defaults.
///
/// Log level can be set using the RUST_LOG environment variable.
/// Example: RUST_LOG=debug,window_limiter=trace
///
/// Set LOG_FORMAT=json to emit one JSON object per line instead of the
/// human readable format.
pub fn init() {
    INIT.call_once(|| {
        // Default to 'info' level if RUST_LOG is not set
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let json = std::env::var("LOG_FORMAT")
            .map(|format| format.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let registry = tracing_subscriber::registry().with(filter);

        if json {
            registry
                .with(
                    fmt::layer()
                        .json()
                        .with_current_span(false)
                        .with_thread_ids(true),
                )
                .init();
        } else {
            registry
                .with(
                    fmt::layer()
                        .with_target(true) // Include module path in logs
                        .with_thread_ids(true) // Useful for debugging concurrency issues
                        .with_line_number(true),
                )
                .init();
        }

        tracing::info!(json, "Logging initialized");
    });
}

/// Macro for logging one admission decision
#[macro_export]
macro_rules! rate_limit_event {
    ($key:expr, $verdict:expr, $window_ms:expr) => {
        tracing::debug!(
            key = $key,
            allowed = $verdict.allowed,
            limit = $verdict.limit,
            remaining = $verdict.remaining,
            current = $verdict.current,
            window_ms = $window_ms,
            "Rate limit check"
        )
    };
}

/// Macro for logging storage operations with timing
#[macro_export]
macro_rules! storage_op {
    ($operation:expr, $key:expr, $result:expr, $elapsed_ms:expr) => {
        tracing::debug!(
            operation = $operation,
            key = $key,
            success = $result.is_ok(),
            elapsed_ms = $elapsed_ms,
            "Storage operation"
        )
    };
}
