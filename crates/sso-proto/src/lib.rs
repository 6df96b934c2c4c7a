/// Generated gRPC protocol definitions for the SSO `Auth` service.
///
/// The code is produced at build time from `proto/sso.proto`. The client
/// and the server halves are both generated; the server is used by tests
/// and fake services.
pub mod auth {
    tonic::include_proto!("auth");

    /// Fully qualified name of the `Auth` service.
    pub const SERVICE_NAME: &str = "auth.Auth";
}

// Re-export commonly used types for convenience
pub use auth::*;
