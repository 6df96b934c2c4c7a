/*!
 * sso-client - resilient client for the `auth.Auth` gRPC service
 *
 * - One typed call, `IsAdmin`, over a plaintext channel
 * - Retries on NotFound, Aborted and DeadlineExceeded with a per-attempt timeout
 * - One structured log event per attempt, written to an injected sink
 * - Cancellation and deadlines through `CallContext`
 */

pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod logging;
pub mod middleware;
pub mod sink;

// Re-export commonly used types
pub use client::{AuthServiceClient, IS_ADMIN};
pub use config::{AppConfig, ClientConfig, LoggingConfig};
pub use context::CallContext;
pub use error::{ClientError, ConfigError};
pub use middleware::{Backoff, LoggingOptions, RetryPolicy};
pub use sink::{LogEvent, LogLevel, LogSink, MemorySink, TracingSink};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
