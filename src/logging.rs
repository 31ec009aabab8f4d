//! Logging and tracing setup for provider processes.
//!
//! All output goes to **stderr**; stdout belongs to the host process that
//! launched the plugin. Filtering follows `RUST_LOG`.
//!
//! # Quick Start
//!
//! ```ignore
//! use hemmer_plugin_protocol::{init_logging, Dispatcher};
//!
//! #[tokio::main]
//! async fn main() {
//!     init_logging();
//!
//!     tracing::info!("Starting provider");
//!     let dispatcher = Dispatcher::new(MyProvider);
//!     // hand the dispatcher to the transport
//! }
//! ```
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Controls log levels (e.g., `info`, `debug`, `hemmer_plugin_protocol=trace`)
//!
//! The dispatcher logs each operation at `info`/`debug` under spans named
//! `provider.<operation>`; envelope encode and decode steps log at `trace`.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Level used when `RUST_LOG` is unset or unparsable.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Initialize the default logging subscriber.
///
/// Writes compact lines to stderr, filtered by `RUST_LOG` and falling back to
/// [`DEFAULT_LOG_LEVEL`].
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging() {
    init_logging_with_default(DEFAULT_LOG_LEVEL);
}

/// Initialize logging with a custom default level.
///
/// Like [`init_logging`], but `default_level` applies when `RUST_LOG` is not set.
///
/// # Example
///
/// ```ignore
/// use hemmer_plugin_protocol::init_logging_with_default;
///
/// fn main() {
///     init_logging_with_default("debug");
/// }
/// ```
pub fn init_logging_with_default(default_level: &str) {
    tracing_subscriber::registry()
        .with(env_filter(default_level))
        .with(stderr_layer())
        .init();
}

/// Try to initialize logging, returning false if already initialized.
///
/// Unlike [`init_logging`], this does not panic when a subscriber is already
/// installed, which makes it safe to call from tests.
pub fn try_init_logging() -> bool {
    tracing_subscriber::registry()
        .with(env_filter(DEFAULT_LOG_LEVEL))
        .with(stderr_layer())
        .try_init()
        .is_ok()
}

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

fn stderr_layer<S>() -> impl tracing_subscriber::Layer<S>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
}

#[cfg(test)]
mod tests {
    // The global subscriber can only be set once per process, so only the
    // second call is checked.

    use super::*;

    #[test]
    fn test_env_filter_parsing() {
        assert!(EnvFilter::try_new("info").is_ok());
        assert!(EnvFilter::try_new("hemmer_plugin_protocol=trace").is_ok());
        assert!(EnvFilter::try_new("warn,hemmer_plugin_protocol::server=debug").is_ok());
    }

    #[test]
    fn test_try_init_logging_is_idempotent() {
        let _ = try_init_logging();
        assert!(!try_init_logging());
    }
}
