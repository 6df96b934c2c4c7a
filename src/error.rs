/*!
 * Error types for sso-client
 */

use std::io;
use std::path::PathBuf;

use thiserror::Error;
use tonic::{Code, Status};

use crate::middleware::retry::DEFAULT_RETRY_CODES;

/// Errors returned by [`crate::AuthServiceClient`]
///
/// Every variant names the operation that failed and keeps the underlying
/// cause reachable through `source()`.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("{op}: invalid target address {address:?}")]
    InvalidAddress {
        op: &'static str,
        address: String,
        #[source]
        source: tonic::transport::Error,
    },

    #[error("{op}: failed to connect to {address}")]
    Dial {
        op: &'static str,
        address: String,
        #[source]
        source: tonic::transport::Error,
    },

    #[error("{op}: {source}")]
    Rpc {
        op: &'static str,
        #[source]
        source: Status,
    },
}

impl ClientError {
    /// Name of the operation that produced the error
    pub fn op(&self) -> &'static str {
        match self {
            ClientError::InvalidAddress { op, .. }
            | ClientError::Dial { op, .. }
            | ClientError::Rpc { op, .. } => op,
        }
    }

    /// The remote status, if the error came from a call
    pub fn status(&self) -> Option<&Status> {
        match self {
            ClientError::Rpc { source, .. } => Some(source),
            _ => None,
        }
    }

    /// The remote status code, if the error came from a call
    pub fn code(&self) -> Option<Code> {
        self.status().map(Status::code)
    }

    /// True when the call was cancelled through its context
    pub fn is_cancelled(&self) -> bool {
        self.code() == Some(Code::Cancelled)
    }

    /// True when the code is one the default retry policy retries
    pub fn is_retryable_code(&self) -> bool {
        self.code()
            .is_some_and(|code| DEFAULT_RETRY_CODES.contains(&code))
    }
}

/// Errors raised while loading configuration or setting up logging
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Render an error and its chain of causes on one line
pub fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut rendered = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        rendered.push_str(": ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_rpc_error_keeps_status() {
        let err = ClientError::Rpc {
            op: "AuthServiceClient::is_admin",
            source: Status::not_found("user not found"),
        };

        assert_eq!(err.op(), "AuthServiceClient::is_admin");
        assert_eq!(err.code(), Some(Code::NotFound));
        assert!(err.is_retryable_code());
        assert!(!err.is_cancelled());
        assert!(err.to_string().starts_with("AuthServiceClient::is_admin: "));

        let source = err.source().unwrap();
        let status = source.downcast_ref::<Status>().unwrap();
        assert_eq!(status.message(), "user not found");
    }

    #[test]
    fn test_cancelled_error() {
        let err = ClientError::Rpc {
            op: "op",
            source: Status::cancelled("context canceled"),
        };

        assert!(err.is_cancelled());
        assert!(!err.is_retryable_code());
    }

    #[test]
    fn test_error_chain_renders_causes() {
        let err = ConfigError::Io {
            path: PathBuf::from("/etc/sso.toml"),
            source: io::Error::new(io::ErrorKind::NotFound, "no such file"),
        };

        assert_eq!(
            error_chain(&err),
            "failed to read /etc/sso.toml: no such file"
        );
    }
}
